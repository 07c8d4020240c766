//! Stitches the import block, the `run()` orchestrator and the per-mon deploy
//! functions into one Foundry script.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use crate::analyzer::local_name;
use crate::collector::ContractRegistry;
use crate::config::OutputConfig;
use crate::error::Warning;
use crate::generator::{DeployFunction, REGISTRY_VAR, RESULT_BUFFER, SLOTS_ARRAY};
use crate::ident::string_literal;
use crate::writer::SourceWriter;

const SPDX: &str = "// SPDX-License-Identifier: AGPL-3.0";
const PRAGMA: &str = "pragma solidity ^0.8.0;";
const DEPLOY_DATA: &str = "DeployData";

/// Imports every script carries, as `(symbol, path)`.
pub const PREAMBLE_IMPORTS: &[(&str, &str)] = &[
    ("Script", "forge-std/Script.sol"),
    ("DefaultMonRegistry", "../src/teams/DefaultMonRegistry.sol"),
    ("MonStats", "../src/Structs.sol"),
    ("Type", "../src/Enums.sol"),
    ("IMoveSet", "../src/moves/IMoveSet.sol"),
    ("IAbility", "../src/abilities/IAbility.sol"),
];

/// Whether a module contract named `identifier` would shadow a type the
/// script itself imports or declares.
pub fn is_reserved_contract(identifier: &str) -> bool {
    identifier == DEPLOY_DATA || PREAMBLE_IMPORTS.iter().any(|(symbol, _)| *symbol == identifier)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub contract_name: String,
    pub registry_env: String,
}

impl ScriptOptions {
    pub fn from_config(output: &OutputConfig) -> Self {
        Self {
            contract_name: output.contract_name.clone(),
            registry_env: output.registry_env.clone(),
        }
    }
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self::from_config(&OutputConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub source: String,
    pub warnings: Vec<Warning>,
}

/// Module and dependency imports, merged by path and sorted.
///
/// Module imports claim their names first. A dependency symbol the preamble
/// already provides is skipped; one whose local name is bound to another path
/// is dropped with a [`Warning::ImportConflict`].
pub fn module_imports(registry: &ContractRegistry) -> (Vec<String>, Vec<Warning>) {
    let mut claimed: HashMap<String, String> = PREAMBLE_IMPORTS
        .iter()
        .map(|(symbol, path)| (symbol.to_string(), path.to_string()))
        .collect();
    let mut by_path: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut warnings = Vec::new();

    let mut add = |symbol: &str, path: &str, warnings: &mut Vec<Warning>| {
        let local = local_name(symbol);
        match claimed.get(local) {
            Some(owner) if owner == path => {}
            Some(owner) => {
                if PREAMBLE_IMPORTS.iter().any(|(s, _)| *s == local) {
                    return;
                }
                let warning = Warning::ImportConflict {
                    symbol: local.to_string(),
                    kept: owner.clone(),
                    dropped: path.to_string(),
                };
                warn!("{warning}");
                warnings.push(warning);
                return;
            }
            None => {
                claimed.insert(local.to_string(), path.to_string());
            }
        }
        by_path
            .entry(path.to_string())
            .or_default()
            .insert(symbol.to_string());
    };

    for descriptor in registry.iter() {
        add(
            descriptor.identifier.as_str(),
            &descriptor.import_path,
            &mut warnings,
        );
    }
    for descriptor in registry.iter() {
        for import in &descriptor.imports {
            for symbol in &import.symbols {
                add(symbol, &import.path, &mut warnings);
            }
        }
    }
    // Paths the preamble imports only gain symbols it does not already list.
    for (symbol, path) in PREAMBLE_IMPORTS {
        if let Some(symbols) = by_path.get_mut(*path) {
            symbols.remove(*symbol);
            if symbols.is_empty() {
                by_path.remove(*path);
            }
        }
    }

    let mut lines: Vec<String> = by_path
        .into_iter()
        .map(|(path, symbols)| {
            let symbols: Vec<String> = symbols.into_iter().collect();
            format!("import {{{}}} from {};", symbols.join(", "), string_literal(&path))
        })
        .collect();
    lines.sort();
    (lines, warnings)
}

/// Render the full script. `functions` must be in roster order; the slot of
/// each function in `allDeployData` is its index.
pub fn assemble(
    registry: &ContractRegistry,
    functions: &[DeployFunction],
    options: &ScriptOptions,
) -> Script {
    let (imports, warnings) = module_imports(registry);
    let mut w = SourceWriter::default();

    w.line(0, SPDX);
    w.line(0, PRAGMA);
    w.blank();
    for (symbol, path) in PREAMBLE_IMPORTS {
        w.line(0, format!("import {{{symbol}}} from {};", string_literal(path)));
    }
    if !imports.is_empty() {
        w.blank();
        for line in &imports {
            w.line(0, line);
        }
    }
    w.blank();

    w.line(0, format!("contract {} is Script {{", options.contract_name));
    w.line(1, format!("struct {DEPLOY_DATA} {{"));
    w.line(2, "string name;");
    w.line(2, "address contractAddress;");
    w.line(1, "}");
    w.blank();

    w.line(1, "function run() external returns (DeployData[] memory) {");
    w.line(2, "vm.startBroadcast();");
    w.blank();
    w.line(2, "// Get the DefaultMonRegistry address");
    w.line(
        2,
        format!(
            "DefaultMonRegistry {REGISTRY_VAR} = DefaultMonRegistry(vm.envAddress({}));",
            string_literal(&options.registry_env)
        ),
    );
    w.blank();
    w.line(2, "// Deploy all mons");
    w.line(
        2,
        format!(
            "DeployData[][] memory {SLOTS_ARRAY} = new DeployData[][]({});",
            functions.len()
        ),
    );
    for (slot, function) in functions.iter().enumerate() {
        w.line(2, format!("{SLOTS_ARRAY}[{slot}] = {};", function.call()));
    }
    w.blank();
    w.line(2, "// Flatten the deployment manifest");
    w.line(2, "uint256 totalLength = 0;");
    w.line(2, format!("for (uint256 i = 0; i < {SLOTS_ARRAY}.length; i++) {{"));
    w.line(3, format!("totalLength += {SLOTS_ARRAY}[i].length;"));
    w.line(2, "}");
    w.line(
        2,
        format!("DeployData[] memory {RESULT_BUFFER} = new DeployData[](totalLength);"),
    );
    w.line(2, "uint256 currentIndex = 0;");
    w.line(2, format!("for (uint256 i = 0; i < {SLOTS_ARRAY}.length; i++) {{"));
    w.line(3, format!("for (uint256 j = 0; j < {SLOTS_ARRAY}[i].length; j++) {{"));
    w.line(4, format!("{RESULT_BUFFER}[currentIndex] = {SLOTS_ARRAY}[i][j];"));
    w.line(4, "currentIndex++;");
    w.line(3, "}");
    w.line(2, "}");
    w.blank();
    w.line(2, "vm.stopBroadcast();");
    w.line(2, format!("return {RESULT_BUFFER};"));
    w.line(1, "}");

    for function in functions {
        w.blank();
        w.raw(&function.body);
    }
    w.line(0, "}");

    Script {
        source: w.finish(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ImportPath;
    use crate::collector::ContractDescriptor;
    use crate::generator::{EntrySource, ManifestEntry, ManifestSlot, SharedInput};
    use crate::ident::Identifier;
    use std::path::PathBuf;

    fn descriptor(name: &str, owner: &str, imports: Vec<ImportPath>) -> ContractDescriptor {
        let identifier = Identifier::derive(name).unwrap();
        ContractDescriptor {
            name: name.into(),
            variable: identifier.variable_name(),
            source_path: PathBuf::from(format!("src/mons/{owner}/{identifier}.sol")),
            import_path: format!("../src/mons/{owner}/{identifier}.sol"),
            owner: owner.into(),
            identifier,
            dependencies: vec![],
            imports,
        }
    }

    fn import(symbols: &[&str], path: &str) -> ImportPath {
        ImportPath {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            path: path.into(),
        }
    }

    #[test]
    fn preamble_types_and_deploy_data_are_reserved() {
        assert!(is_reserved_contract("Type"));
        assert!(is_reserved_contract("IMoveSet"));
        assert!(is_reserved_contract("DeployData"));
        assert!(!is_reserved_contract("Tackle"));
    }

    #[test]
    fn imports_are_merged_sorted_and_skip_the_preamble() {
        let mut registry = ContractRegistry::default();
        registry.insert(descriptor(
            "Tackle",
            "beta",
            vec![
                import(&["IEngine"], "../src/IEngine.sol"),
                import(&["IMoveSet"], "../src/moves/IMoveSet.sol"),
            ],
        ));
        registry.insert(descriptor(
            "Guard",
            "alpha",
            vec![
                import(&["IEngine"], "../src/IEngine.sol"),
                import(&["ITypeCalculator"], "../src/IEngine.sol"),
            ],
        ));
        let (lines, warnings) = module_imports(&registry);
        assert!(warnings.is_empty());
        assert_eq!(
            lines,
            [
                "import {Guard} from \"../src/mons/alpha/Guard.sol\";",
                "import {IEngine, ITypeCalculator} from \"../src/IEngine.sol\";",
                "import {Tackle} from \"../src/mons/beta/Tackle.sol\";",
            ]
        );
    }

    #[test]
    fn conflicting_local_names_keep_the_first_path() {
        let mut registry = ContractRegistry::default();
        registry.insert(descriptor(
            "Tackle",
            "alpha",
            vec![import(&["Helper"], "../src/a/Helper.sol")],
        ));
        registry.insert(descriptor(
            "Guard",
            "beta",
            vec![import(&["Helper"], "../src/b/Helper.sol")],
        ));
        let (lines, warnings) = module_imports(&registry);
        assert!(lines.contains(&"import {Helper} from \"../src/a/Helper.sol\";".to_string()));
        assert!(!lines.iter().any(|l| l.contains("../src/b/Helper.sol")));
        assert_eq!(
            warnings,
            [Warning::ImportConflict {
                symbol: "Helper".into(),
                kept: "../src/a/Helper.sol".into(),
                dropped: "../src/b/Helper.sol".into(),
            }]
        );
    }

    #[test]
    fn run_fills_slots_and_flattens() {
        let registry = ContractRegistry::default();
        let tackle = Identifier::derive("Tackle").unwrap();
        let functions = vec![
            DeployFunction {
                name: "deployAlpha".into(),
                mon_id: 1,
                mon_name: "Alpha".into(),
                entries: vec![ManifestEntry {
                    name: "Tackle".into(),
                    identifier: tackle.clone(),
                    source: EntrySource::Deployed,
                }],
                shared_inputs: vec![],
                body: "    function deployAlpha() {}\n".into(),
            },
            DeployFunction {
                name: "deployBeta".into(),
                mon_id: 2,
                mon_name: "Beta".into(),
                entries: vec![],
                shared_inputs: vec![SharedInput {
                    identifier: tackle,
                    parameter: "tackleAddress".into(),
                    slot: ManifestSlot {
                        mon_index: 0,
                        entry_index: 0,
                    },
                    deployed_by: "deployAlpha".into(),
                }],
                body: "    function deployBeta() {}\n".into(),
            },
        ];
        let script = assemble(&registry, &functions, &ScriptOptions::default());
        let src = &script.source;
        assert!(src.starts_with("// SPDX-License-Identifier: AGPL-3.0\npragma solidity ^0.8.0;\n\nimport {Script} from \"forge-std/Script.sol\";\n"));
        assert!(src.contains("contract SetupMons is Script {\n    struct DeployData {\n        string name;\n        address contractAddress;\n    }\n"));
        assert!(src.contains("vm.envAddress(\"DEFAULT_MON_REGISTRY\")"));
        assert!(src.contains("DeployData[][] memory allDeployData = new DeployData[][](2);"));
        assert!(src.contains("        allDeployData[0] = deployAlpha(registry);\n"));
        assert!(src.contains(
            "        allDeployData[1] = deployBeta(registry, allDeployData[0][0].contractAddress);\n"
        ));
        assert!(src.contains("                deployedContracts[currentIndex] = allDeployData[i][j];\n"));
        let alpha = src.find("function deployAlpha").unwrap();
        let beta = src.find("function deployBeta").unwrap();
        assert!(src.find("vm.stopBroadcast();").unwrap() < alpha);
        assert!(alpha < beta);
        assert!(src.ends_with("    function deployBeta() {}\n}\n"));
    }

    #[test]
    fn options_rename_the_contract_and_registry_variable() {
        let options = ScriptOptions {
            contract_name: "DeployRoster".into(),
            registry_env: "REGISTRY".into(),
        };
        let script = assemble(&ContractRegistry::default(), &[], &options);
        assert!(script.source.contains("contract DeployRoster is Script {"));
        assert!(script.source.contains("vm.envAddress(\"REGISTRY\")"));
        assert!(script.source.contains("new DeployData[][](0);"));
    }
}
