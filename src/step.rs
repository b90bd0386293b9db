//! Step Registry
//!
//! Static table of generation steps: identifiers, human labels, content shapes and the
//! direct prerequisites of each step. The registry is immutable once built and is
//! validated at construction time (unknown prerequisites, duplicates, cycles).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

/// Identifier of a generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u8);

impl StepId {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for StepId {
    fn from(value: u8) -> Self {
        StepId(value)
    }
}

/// Shape of the content a step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentShape {
    /// Free-form prose
    Text,
    /// Ordered list of items
    List,
    /// Single keyed record
    Structured,
}

impl ContentShape {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentShape::Text => "text",
            ContentShape::List => "list",
            ContentShape::Structured => "structured",
        }
    }
}

/// A single step of the staged pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    /// Stable key used by configuration and the CLI
    pub key: String,
    pub label: String,
    pub shape: ContentShape,
    /// Direct prerequisites, in the order they must be generated
    pub prerequisites: Vec<StepId>,
}

impl StepDefinition {
    pub fn new(
        id: u8,
        key: &str,
        label: &str,
        shape: ContentShape,
        prerequisites: &[u8],
    ) -> Self {
        Self {
            id: StepId(id),
            key: key.to_string(),
            label: label.to_string(),
            shape,
            prerequisites: prerequisites.iter().copied().map(StepId).collect(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Step id 0 is reserved")]
    ReservedId,

    #[error("Duplicate step id: {0}")]
    DuplicateId(StepId),

    #[error("Duplicate step key: {0}")]
    DuplicateKey(String),

    #[error("Step {step} lists unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { step: StepId, prerequisite: StepId },

    #[error("Step {0} lists itself as a prerequisite")]
    SelfDependency(StepId),

    #[error("Step dependency graph contains a cycle through steps {0:?}")]
    CycleDetected(Vec<StepId>),
}

/// Registry of all steps known to the process.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: BTreeMap<StepId, StepDefinition>,
    keys: HashMap<String, StepId>,
    topo_order: Vec<StepId>,
}

impl StepRegistry {
    /// Build a registry, failing fast if the declared graph is not a DAG.
    pub fn new(definitions: Vec<StepDefinition>) -> Result<Self, RegistryError> {
        let mut steps = BTreeMap::new();
        let mut keys = HashMap::new();

        for def in definitions {
            if def.id.0 == 0 {
                return Err(RegistryError::ReservedId);
            }
            if keys.insert(def.key.clone(), def.id).is_some() {
                return Err(RegistryError::DuplicateKey(def.key));
            }
            let id = def.id;
            if steps.insert(id, def).is_some() {
                return Err(RegistryError::DuplicateId(id));
            }
        }

        for def in steps.values() {
            for prerequisite in &def.prerequisites {
                if *prerequisite == def.id {
                    return Err(RegistryError::SelfDependency(def.id));
                }
                if !steps.contains_key(prerequisite) {
                    return Err(RegistryError::UnknownPrerequisite {
                        step: def.id,
                        prerequisite: *prerequisite,
                    });
                }
            }
        }

        let topo_order = topological_order(&steps)?;
        Ok(Self {
            steps,
            keys,
            topo_order,
        })
    }

    /// The branding workflow: market research, competitors, SWOT, palettes, persona, ...
    pub fn branding() -> Result<Self, RegistryError> {
        use ContentShape::{List, Structured, Text};
        let definitions = vec![
            StepDefinition::new(1, "market-overview", "Market Research: Overview", Text, &[]),
            StepDefinition::new(2, "target-audience", "Market Research: Target Audience", Text, &[1]),
            StepDefinition::new(3, "market-trends", "Market Research: Trends", Text, &[1, 2]),
            StepDefinition::new(4, "value-proposition", "Market Research: Value Proposition", Text, &[1, 2, 3]),
            StepDefinition::new(5, "competitors", "Competitors", List, &[1, 2, 3, 4]),
            StepDefinition::new(6, "references", "References", List, &[1, 2, 3, 4, 5]),
            StepDefinition::new(7, "swot", "SWOT Analysis", Structured, &[5]),
            StepDefinition::new(8, "color-palettes", "Color Palettes", List, &[6, 7]),
            StepDefinition::new(9, "visual-elements", "Visual Elements", List, &[8]),
            StepDefinition::new(10, "persona", "Persona", Structured, &[2, 7]),
            StepDefinition::new(11, "moodboard", "Moodboard", Structured, &[8, 9]),
            StepDefinition::new(12, "mockup-directions", "Mockup Directions", List, &[10, 11]),
        ];
        Self::new(definitions)
    }

    pub fn get(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.get(&id)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.steps.contains_key(&id)
    }

    pub fn by_key(&self, key: &str) -> Option<&StepDefinition> {
        self.keys.get(key).and_then(|id| self.steps.get(id))
    }

    /// Resolve either a numeric id or a step key.
    pub fn resolve(&self, reference: &str) -> Option<&StepDefinition> {
        let reference = reference.trim();
        match reference.parse::<u8>() {
            Ok(raw) => self.get(StepId(raw)),
            Err(_) => self.by_key(reference),
        }
    }

    /// Direct prerequisites in declared order; empty for unknown ids.
    pub fn prerequisites_of(&self, id: StepId) -> &[StepId] {
        self.steps
            .get(&id)
            .map(|def| def.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    pub fn label(&self, id: StepId) -> &str {
        self.steps
            .get(&id)
            .map(|def| def.label.as_str())
            .unwrap_or("unknown step")
    }

    /// All step ids, ascending.
    pub fn ids(&self) -> Vec<StepId> {
        self.steps.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.values()
    }

    pub fn topological_order(&self) -> &[StepId] {
        &self.topo_order
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Kahn's algorithm; ties broken by ascending id so the order is deterministic.
fn topological_order(
    steps: &BTreeMap<StepId, StepDefinition>,
) -> Result<Vec<StepId>, RegistryError> {
    let mut indegree: BTreeMap<StepId, usize> = steps
        .values()
        .map(|def| (def.id, def.prerequisites.len()))
        .collect();
    let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::new();
    for def in steps.values() {
        for prerequisite in &def.prerequisites {
            dependents.entry(*prerequisite).or_default().push(def.id);
        }
    }

    let mut ready: VecDeque<StepId> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(steps.len());

    while let Some(id) = ready.pop_front() {
        order.push(id);
        if let Some(children) = dependents.get(&id) {
            let mut unlocked = Vec::new();
            for child in children {
                if let Some(degree) = indegree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        unlocked.push(*child);
                    }
                }
            }
            unlocked.sort();
            ready.extend(unlocked);
        }
    }

    if order.len() != steps.len() {
        let cyclic: Vec<StepId> = indegree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .collect();
        return Err(RegistryError::CycleDetected(cyclic));
    }

    Ok(order)
}
