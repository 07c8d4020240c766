use serde::Serialize;

use crate::analyzer::{Dependency, ImportPath};
use crate::collector::Collection;
use crate::error::Warning;
use crate::ident::Identifier;
use crate::roster::Roster;

/// Result of loading and collecting, before any script text is rendered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub roster: Roster,
    pub collection: Collection,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub mons: Vec<MonPlan>,
    pub contracts: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonPlan {
    pub id: u32,
    pub name: String,
    pub function: String,
    pub moves: usize,
    pub abilities: usize,
    pub modules: Vec<ModulePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModulePlan {
    pub name: String,
    pub identifier: Identifier,
    /// `None` when this mon deploys the module; otherwise the mon that did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reused_from: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub imports: Vec<ImportPath>,
}

impl Plan {
    pub fn mon_count(&self) -> usize {
        self.roster.len()
    }

    pub fn contract_count(&self) -> usize {
        self.collection.registry.len()
    }

    /// Per-mon view of what gets deployed fresh and what is reused.
    pub fn report(&self) -> PlanReport {
        let mons = self
            .collection
            .mons
            .iter()
            .map(|mon| MonPlan {
                id: mon.mon_id,
                name: mon.mon_name.clone(),
                function: mon.function.clone(),
                moves: mon.moves.len(),
                abilities: mon.abilities.len(),
                modules: mon
                    .modules
                    .iter()
                    .filter_map(|id| self.collection.registry.get(id))
                    .map(|descriptor| ModulePlan {
                        name: descriptor.name.clone(),
                        identifier: descriptor.identifier.clone(),
                        reused_from: (descriptor.owner != mon.mon_name)
                            .then(|| descriptor.owner.clone()),
                        dependencies: descriptor.dependencies.clone(),
                        imports: descriptor.imports.clone(),
                    })
                    .collect(),
            })
            .collect();
        PlanReport {
            mons,
            contracts: self.contract_count(),
            warnings: self.warnings.clone(),
        }
    }
}
