//! Dependency Resolver
//!
//! Pure functions over a [`StepRegistry`] and a [`ContentStore`] snapshot that compute
//! which prerequisites of a step still lack content.

use crate::content::ContentStore;
use crate::step::{StepId, StepRegistry};
use std::collections::HashSet;

/// Computes missing prerequisites. Stateless; cheap to clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Direct prerequisites of `step` without usable content, in declared order.
    ///
    /// Unknown steps yield an empty list.
    pub fn missing_prerequisites(
        &self,
        registry: &StepRegistry,
        store: &ContentStore,
        step: StepId,
    ) -> Vec<StepId> {
        registry
            .prerequisites_of(step)
            .iter()
            .copied()
            .filter(|prerequisite| !store.has_content(*prerequisite))
            .collect()
    }

    /// Every missing step the target transitively needs, dependencies first.
    ///
    /// Post-order walk over declared prerequisite order, so each entry's own
    /// prerequisites appear before it. The target itself is not included.
    pub fn resolution_plan(
        &self,
        registry: &StepRegistry,
        store: &ContentStore,
        step: StepId,
    ) -> Vec<StepId> {
        let mut plan = Vec::new();
        let mut visited = HashSet::new();
        for prerequisite in self.missing_prerequisites(registry, store, step) {
            visit(registry, store, prerequisite, &mut visited, &mut plan);
        }
        plan
    }
}

fn visit(
    registry: &StepRegistry,
    store: &ContentStore,
    step: StepId,
    visited: &mut HashSet<StepId>,
    plan: &mut Vec<StepId>,
) {
    if !visited.insert(step) {
        return;
    }
    for prerequisite in registry.prerequisites_of(step) {
        if !store.has_content(*prerequisite) {
            visit(registry, store, *prerequisite, visited, plan);
        }
    }
    plan.push(step);
}
