//! Plan loading and dependency ordering.
//!
//! A `DeploymentPlan` is built once from the plan file's declarations and is
//! never mutated afterwards. Its component order is a stable topological
//! sort: among the components whose dependencies are already placed, the
//! one declared first goes next. Every validation failure is raised here,
//! before any external tool is invoked.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::{OrchestrateError, Result};

// ---------------------------------------------------------------------------
// PlanFile
// ---------------------------------------------------------------------------

/// On-disk shape of the plan file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    pub components: Vec<Component>,
}

impl PlanFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a plan file, anchoring relative build contexts at its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut file = Self::parse(&data)?;
        let base = path.parent().unwrap_or(Path::new("."));
        for component in &mut file.components {
            component.resolve_context(base);
        }
        Ok(file)
    }
}

// ---------------------------------------------------------------------------
// DeploymentPlan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    components: Vec<Component>,
    ranks: HashMap<String, usize>,
}

impl DeploymentPlan {
    /// Validate declarations and order them by dependency rank.
    pub fn new(declared: Vec<Component>) -> Result<Self> {
        if declared.is_empty() {
            return Err(OrchestrateError::EmptyPlan);
        }

        let mut seen = HashSet::new();
        for component in &declared {
            component.validate()?;
            if !seen.insert(component.name.as_str()) {
                return Err(OrchestrateError::DuplicateComponent(component.name.clone()));
            }
        }
        for component in &declared {
            if let Some(missing) = component
                .depends_on
                .iter()
                .find(|dep| !seen.contains(dep.as_str()))
            {
                return Err(OrchestrateError::UnknownDependency {
                    component: component.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let components = topo_sort(declared)?;
        let ranks = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Ok(Self { components, ranks })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::new(PlanFile::load(path)?.components)
    }

    /// Components in startup order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.rank(name).map(|i| &self.components[i])
    }

    /// Position of `name` in startup order.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.ranks.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn topo_sort(declared: Vec<Component>) -> Result<Vec<Component>> {
    let mut remaining = declared;
    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .position(|c| c.depends_on.iter().all(|d| placed.contains(d)));
        match next {
            Some(i) => {
                let component = remaining.remove(i);
                placed.insert(component.name.clone());
                ordered.push(component);
            }
            None => return Err(OrchestrateError::DependencyCycle(find_cycle(&remaining, &placed))),
        }
    }
    Ok(ordered)
}

/// Every component left over has at least one unplaced dependency, so
/// following the first one from any start must revisit a node.
fn find_cycle(remaining: &[Component], placed: &HashSet<String>) -> Vec<String> {
    let by_name: HashMap<&str, &Component> =
        remaining.iter().map(|c| (c.name.as_str(), c)).collect();
    let mut path: Vec<String> = Vec::new();
    let mut current = remaining[0].name.as_str();

    loop {
        if let Some(start) = path.iter().position(|n| n == current) {
            let mut cycle = path.split_off(start);
            cycle.push(current.to_string());
            return cycle;
        }
        path.push(current.to_string());
        let Some(next) = by_name[current]
            .depends_on
            .iter()
            .find(|d| !placed.contains(d.as_str()))
        else {
            return path;
        };
        current = next.as_str();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
