use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analyzer::{analyze_module, Dependency, ImportPath, ImportResolver, SourceAnalyzer};
use crate::assembler::is_reserved_contract;
use crate::config::SourcesConfig;
use crate::error::{GenerateError, Warning};
use crate::ident::{directory_name, function_name, Identifier};
use crate::roster::{MonRecord, Roster};

/// Where module sources live on disk and how the script imports them.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    pub root: PathBuf,
    pub extension: String,
    pub import_root: String,
}

impl SourceLayout {
    pub fn from_config(project_root: &Path, sources: &SourcesConfig) -> Self {
        Self {
            root: crate::config::Config::resolve(project_root, &sources.root),
            extension: sources.extension.trim_start_matches('.').to_string(),
            import_root: sources.import_root.trim_end_matches('/').to_string(),
        }
    }
}

/// One module's source location: its name plus the directory of the mon that
/// references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef<'a> {
    pub name: &'a str,
    pub directory: String,
}

impl ModuleRef<'_> {
    pub fn source_path(&self, layout: &SourceLayout, identifier: &Identifier) -> PathBuf {
        layout
            .root
            .join(&self.directory)
            .join(format!("{}.{}", identifier, layout.extension))
    }

    /// Directory holding the source, as the generated script sees it.
    pub fn import_dir(&self, layout: &SourceLayout) -> String {
        format!("{}/{}", layout.import_root, self.directory)
    }

    pub fn import_path(&self, layout: &SourceLayout, identifier: &Identifier) -> String {
        format!(
            "{}/{}.{}",
            self.import_dir(layout),
            identifier,
            layout.extension
        )
    }
}

/// Everything the generator needs to deploy one module contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractDescriptor {
    pub name: String,
    pub identifier: Identifier,
    pub variable: String,
    pub source_path: PathBuf,
    /// Script-relative import path of the module itself.
    pub import_path: String,
    /// Mon whose directory the source was taken from.
    pub owner: String,
    pub dependencies: Vec<Dependency>,
    pub imports: Vec<ImportPath>,
}

/// Run-scoped map from identifier to descriptor. The first descriptor
/// inserted for an identifier is kept; iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    order: Vec<Identifier>,
    by_id: HashMap<Identifier, ContractDescriptor>,
}

impl ContractRegistry {
    pub fn get(&self, identifier: &Identifier) -> Option<&ContractDescriptor> {
        self.by_id.get(identifier)
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.by_id.contains_key(identifier)
    }

    /// Returns `false` (and drops `descriptor`) if the identifier is taken.
    pub fn insert(&mut self, descriptor: ContractDescriptor) -> bool {
        if self.by_id.contains_key(&descriptor.identifier) {
            return false;
        }
        self.order.push(descriptor.identifier.clone());
        self.by_id.insert(descriptor.identifier.clone(), descriptor);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractDescriptor> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Serialize for ContractRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Modules referenced by one mon, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonModules {
    pub mon_id: u32,
    pub mon_name: String,
    pub function: String,
    /// Distinct modules: moves first, then abilities, duplicates dropped.
    pub modules: Vec<Identifier>,
    /// One entry per move slot (duplicates kept).
    pub moves: Vec<Identifier>,
    /// One entry per ability slot (duplicates kept).
    pub abilities: Vec<Identifier>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Collection {
    pub registry: ContractRegistry,
    pub mons: Vec<MonModules>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

/// Resolve every mon's moves and abilities into deployable descriptors.
///
/// Mons are visited in ascending id order, moves before abilities, each in
/// list order. A module already in the registry is reused, never re-analyzed.
pub fn collect(
    roster: &Roster,
    layout: &SourceLayout,
    analyzer: &dyn SourceAnalyzer,
    resolver: &ImportResolver,
) -> Result<Collection, GenerateError> {
    let mut collection = Collection::default();
    let mut functions: HashMap<String, String> = HashMap::new();

    for mon in roster.iter() {
        let mon_ident = Identifier::derive(&mon.name).ok_or_else(|| GenerateError::EmptyIdentifier {
            kind: "name",
            name: mon.name.clone(),
            mon: mon.name.clone(),
        })?;
        let function = function_name(&mon_ident);
        if let Some(first) = functions.insert(function.clone(), mon.name.clone()) {
            return Err(GenerateError::IdentifierCollision {
                identifier: mon_ident.to_string(),
                first,
                second: mon.name.clone(),
            });
        }

        let modules = collect_mon(mon, function, layout, analyzer, resolver, &mut collection)?;
        collection.mons.push(modules);
    }

    info!(
        mons = collection.mons.len(),
        contracts = collection.registry.len(),
        "collected module contracts"
    );
    Ok(collection)
}

fn collect_mon(
    mon: &MonRecord,
    function: String,
    layout: &SourceLayout,
    analyzer: &dyn SourceAnalyzer,
    resolver: &ImportResolver,
    collection: &mut Collection,
) -> Result<MonModules, GenerateError> {
    let directory = directory_name(&mon.name);
    let mut seen = HashSet::new();
    let mut modules = Vec::new();
    let mut slots = |kind: &'static str, names: &[String]| -> Result<Vec<Identifier>, GenerateError> {
        let mut idents = Vec::with_capacity(names.len());
        for name in names {
            let identifier =
                Identifier::derive(name).ok_or_else(|| GenerateError::EmptyIdentifier {
                    kind,
                    name: name.clone(),
                    mon: mon.name.clone(),
                })?;
            if is_reserved_contract(identifier.as_str()) {
                return Err(GenerateError::ReservedIdentifier {
                    kind,
                    identifier: identifier.to_string(),
                    name: name.clone(),
                    mon: mon.name.clone(),
                });
            }
            let module = ModuleRef {
                name,
                directory: directory.clone(),
            };
            register(&module, &identifier, mon, layout, analyzer, resolver, collection)?;
            if seen.insert(identifier.clone()) {
                modules.push(identifier.clone());
            }
            idents.push(identifier);
        }
        Ok(idents)
    };
    let moves = slots("move", &mon.moves)?;
    let abilities = slots("ability", &mon.abilities)?;

    Ok(MonModules {
        mon_id: mon.id,
        mon_name: mon.name.clone(),
        function,
        modules,
        moves,
        abilities,
    })
}

fn register(
    module: &ModuleRef<'_>,
    identifier: &Identifier,
    mon: &MonRecord,
    layout: &SourceLayout,
    analyzer: &dyn SourceAnalyzer,
    resolver: &ImportResolver,
    collection: &mut Collection,
) -> Result<(), GenerateError> {
    if let Some(existing) = collection.registry.get(identifier) {
        if existing.name != module.name {
            return Err(GenerateError::IdentifierCollision {
                identifier: identifier.to_string(),
                first: existing.name.clone(),
                second: module.name.to_string(),
            });
        }
        return Ok(());
    }

    let source_path = module.source_path(layout, identifier);
    let analysis = analyze_module(
        analyzer,
        resolver,
        &source_path,
        &module.import_dir(layout),
    );
    collection.warnings.extend(analysis.warnings);
    collection.registry.insert(ContractDescriptor {
        name: module.name.to_string(),
        identifier: identifier.clone(),
        variable: identifier.variable_name(),
        source_path,
        import_path: module.import_path(layout, identifier),
        owner: mon.name.clone(),
        dependencies: analysis.dependencies,
        imports: analysis.imports,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::SolidityAnalyzer;
    use crate::roster::{parse_roster, Table};
    use std::fs;
    use tempfile::tempdir;

    const MONS: &str = "\
Id,Name,HP,Speed,Attack,Defense,SpecialAttack,SpecialDefense,Type1,Type2
2,Beta,200,20,21,22,23,24,Metal,NA
1,Alpha,100,10,11,12,13,14,Fire,NA
";

    fn roster(moves: &str, abilities: &str) -> Roster {
        parse_roster(
            Table {
                label: "mons.csv",
                text: MONS,
            },
            Table {
                label: "moves.csv",
                text: moves,
            },
            Table {
                label: "abilities.csv",
                text: abilities,
            },
            5,
            &mut Vec::new(),
        )
        .expect("roster")
    }

    fn layout(root: &Path) -> SourceLayout {
        SourceLayout {
            root: root.to_path_buf(),
            extension: "sol".into(),
            import_root: "../src/mons".into(),
        }
    }

    fn resolver() -> ImportResolver {
        ImportResolver::new("../../", "../src/", vec!["forge-std/".into()])
    }

    #[test]
    fn shared_modules_are_registered_once_by_first_mon() {
        let tmp = tempdir().unwrap();
        let roster = roster(
            "Name,Mon\nTackle,Beta\nGuard,Beta\nTackle,Alpha\n",
            "Name,Mon\n",
        );
        let collection = collect(&roster, &layout(tmp.path()), &SolidityAnalyzer, &resolver())
            .expect("collect");

        let order: Vec<_> = collection.registry.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, ["Tackle", "Guard"]);
        let tackle = collection
            .registry
            .get(&Identifier::derive("Tackle").unwrap())
            .unwrap();
        assert_eq!(tackle.owner, "Alpha");
        assert_eq!(tackle.import_path, "../src/mons/alpha/Tackle.sol");
        assert_eq!(tackle.source_path, tmp.path().join("alpha").join("Tackle.sol"));

        let functions: Vec<_> = collection.mons.iter().map(|m| m.function.as_str()).collect();
        assert_eq!(functions, ["deployAlpha", "deployBeta"]);
        // both sources are missing on disk
        assert_eq!(collection.warnings.len(), 2);
    }

    #[test]
    fn per_mon_modules_are_distinct_but_slots_are_kept() {
        let tmp = tempdir().unwrap();
        let roster = roster(
            "Name,Mon\nTackle,Alpha\nTackle,Alpha\nEmber,Alpha\n",
            "Name,Mon\nTackle,Alpha\n",
        );
        let collection = collect(&roster, &layout(tmp.path()), &SolidityAnalyzer, &resolver())
            .unwrap();
        let alpha = &collection.mons[0];
        fn names(ids: &[Identifier]) -> Vec<String> {
            ids.iter().map(|i| i.to_string()).collect()
        }
        assert_eq!(names(&alpha.modules), ["Tackle", "Ember"]);
        assert_eq!(names(&alpha.moves), ["Tackle", "Tackle", "Ember"]);
        assert_eq!(names(&alpha.abilities), ["Tackle"]);
        assert!(collection.mons[1].modules.is_empty());
    }

    #[test]
    fn distinct_names_with_the_same_identifier_fail_fast() {
        let tmp = tempdir().unwrap();
        let roster = roster("Name,Mon\nBull Rush,Alpha\nBull-Rush,Beta\n", "Name,Mon\n");
        let err = collect(&roster, &layout(tmp.path()), &SolidityAnalyzer, &resolver())
            .unwrap_err();
        match err {
            GenerateError::IdentifierCollision {
                identifier,
                first,
                second,
            } => {
                assert_eq!(identifier, "BullRush");
                assert_eq!(first, "Bull Rush");
                assert_eq!(second, "Bull-Rush");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn modules_named_like_script_types_are_rejected() {
        let tmp = tempdir().unwrap();
        let roster = roster("Name,Mon\nTackle,Alpha\n", "Name,Mon\nType,Beta\n");
        let err = collect(&roster, &layout(tmp.path()), &SolidityAnalyzer, &resolver())
            .unwrap_err();
        match err {
            GenerateError::ReservedIdentifier {
                kind,
                identifier,
                mon,
                ..
            } => {
                assert_eq!(kind, "ability");
                assert_eq!(identifier, "Type");
                assert_eq!(mon, "Beta");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn analyzed_sources_feed_descriptors() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("beta")).unwrap();
        fs::write(
            tmp.path().join("beta").join("Guard.sol"),
            "import {IEngine} from \"../../IEngine.sol\";\ncontract Guard { constructor(IEngine _ENGINE) {} }\n",
        )
        .unwrap();
        let roster = roster("Name,Mon\nGuard,Beta\n", "Name,Mon\n");
        let collection = collect(&roster, &layout(tmp.path()), &SolidityAnalyzer, &resolver())
            .unwrap();
        assert!(collection.warnings.is_empty());
        let guard = collection.registry.iter().next().unwrap();
        assert_eq!(guard.dependencies[0].env_name, "ENGINE");
        assert_eq!(guard.imports[0].path, "../src/IEngine.sol");
        assert_eq!(guard.variable, "guard");
    }

    #[test]
    fn registry_keeps_first_writer() {
        let mut registry = ContractRegistry::default();
        let descriptor = |owner: &str| ContractDescriptor {
            name: "Tackle".into(),
            identifier: Identifier::derive("Tackle").unwrap(),
            variable: "tackle".into(),
            source_path: PathBuf::from(format!("{owner}/Tackle.sol")),
            import_path: format!("../src/mons/{owner}/Tackle.sol"),
            owner: owner.into(),
            dependencies: vec![],
            imports: vec![],
        };
        assert!(registry.insert(descriptor("alpha")));
        assert!(!registry.insert(descriptor("beta")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().owner, "alpha");
    }
}
