use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::analyzer::Dependency;
use crate::collector::{Collection, ContractRegistry, MonModules};
use crate::ident::{string_literal, Identifier};
use crate::roster::{MonRecord, Roster};
use crate::writer::SourceWriter;

/// Name of the per-mon result buffer and of the flattened manifest in `run()`.
pub const RESULT_BUFFER: &str = "deployedContracts";
/// `run()` local holding every per-mon buffer.
pub const SLOTS_ARRAY: &str = "allDeployData";
pub const REGISTRY_VAR: &str = "registry";

/// Position of one manifest entry: `allDeployData[mon_index][entry_index]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestSlot {
    pub mon_index: usize,
    pub entry_index: usize,
}

/// An address a deploy function receives instead of deploying the module again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedInput {
    pub identifier: Identifier,
    pub parameter: String,
    pub slot: ManifestSlot,
    /// Function that deployed the module.
    pub deployed_by: String,
}

/// How one manifest entry of a deploy function is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntrySource {
    Deployed,
    Reused { deployed_by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub identifier: Identifier,
    pub source: EntrySource,
}

/// One rendered `deploy<Mon>` function plus the wiring `run()` needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployFunction {
    pub name: String,
    pub mon_id: u32,
    pub mon_name: String,
    pub entries: Vec<ManifestEntry>,
    pub shared_inputs: Vec<SharedInput>,
    #[serde(skip)]
    pub body: String,
}

impl DeployFunction {
    /// Call expression used inside `run()`.
    pub fn call(&self) -> String {
        let mut args = vec![REGISTRY_VAR.to_string()];
        args.extend(self.shared_inputs.iter().map(|input| {
            format!(
                "{SLOTS_ARRAY}[{}][{}].contractAddress",
                input.slot.mon_index, input.slot.entry_index
            )
        }));
        format!("{}({})", self.name, args.join(", "))
    }
}

#[derive(Debug, Clone)]
struct Binding {
    slot: ManifestSlot,
    function: String,
}

/// Emits deploy functions in roster order, remembering which function
/// deployed each module so later functions reuse it.
pub struct DeployGenerator<'a> {
    registry: &'a ContractRegistry,
    bindings: HashMap<Identifier, Binding>,
}

impl<'a> DeployGenerator<'a> {
    pub fn new(registry: &'a ContractRegistry) -> Self {
        Self {
            registry,
            bindings: HashMap::new(),
        }
    }

    /// Generate one function per mon, in the collection's (ascending id) order.
    pub fn generate_all(roster: &Roster, collection: &'a Collection) -> Vec<DeployFunction> {
        let mut generator = DeployGenerator::new(&collection.registry);
        roster
            .iter()
            .zip(&collection.mons)
            .enumerate()
            .map(|(index, (mon, modules))| {
                debug_assert_eq!(mon.name, modules.mon_name);
                generator.generate(index, mon, modules)
            })
            .collect()
    }

    /// Render the deploy function for the mon at `mon_index` in `run()`.
    pub fn generate(
        &mut self,
        mon_index: usize,
        mon: &MonRecord,
        modules: &MonModules,
    ) -> DeployFunction {
        let mut locals = Locals::default();
        let mut addresses: HashMap<&Identifier, String> = HashMap::new();
        let mut entries = Vec::with_capacity(modules.modules.len());
        let mut shared_inputs = Vec::new();
        let mut statements = SourceWriter::default();

        for (entry_index, identifier) in modules.modules.iter().enumerate() {
            let Some(descriptor) = self.registry.get(identifier) else {
                continue;
            };
            let name_literal = string_literal(&descriptor.name);
            match self.bindings.get(identifier) {
                Some(binding) => {
                    let parameter = locals.claim(&format!("{}Address", descriptor.variable));
                    statements.line(
                        2,
                        format!("// {} was deployed by {}", descriptor.name, binding.function),
                    );
                    statements.line(
                        2,
                        format!(
                            "{RESULT_BUFFER}[{entry_index}] = DeployData({{name: {name_literal}, contractAddress: {parameter}}});"
                        ),
                    );
                    entries.push(ManifestEntry {
                        name: descriptor.name.clone(),
                        identifier: identifier.clone(),
                        source: EntrySource::Reused {
                            deployed_by: binding.function.clone(),
                        },
                    });
                    shared_inputs.push(SharedInput {
                        identifier: identifier.clone(),
                        parameter: parameter.clone(),
                        slot: binding.slot,
                        deployed_by: binding.function.clone(),
                    });
                    addresses.insert(identifier, parameter);
                }
                None => {
                    let variable = locals.claim(&descriptor.variable);
                    let args: Vec<String> = descriptor.dependencies.iter().map(env_lookup).collect();
                    statements.line(
                        2,
                        format!(
                            "{ident} {variable} = new {ident}({args});",
                            ident = identifier,
                            args = args.join(", ")
                        ),
                    );
                    statements.line(
                        2,
                        format!(
                            "{RESULT_BUFFER}[{entry_index}] = DeployData({{name: {name_literal}, contractAddress: address({variable})}});"
                        ),
                    );
                    entries.push(ManifestEntry {
                        name: descriptor.name.clone(),
                        identifier: identifier.clone(),
                        source: EntrySource::Deployed,
                    });
                    self.bindings.insert(
                        identifier.clone(),
                        Binding {
                            slot: ManifestSlot {
                                mon_index,
                                entry_index,
                            },
                            function: modules.function.clone(),
                        },
                    );
                    addresses.insert(identifier, format!("address({variable})"));
                }
            }
        }

        let mut w = SourceWriter::default();
        let mut params = vec![format!("DefaultMonRegistry {REGISTRY_VAR}")];
        params.extend(
            shared_inputs
                .iter()
                .map(|input| format!("address {}", input.parameter)),
        );
        w.line(
            1,
            format!(
                "function {}({}) internal returns (DeployData[] memory) {{",
                modules.function,
                params.join(", ")
            ),
        );
        w.line(
            2,
            format!(
                "DeployData[] memory {RESULT_BUFFER} = new DeployData[]({});",
                entries.len()
            ),
        );
        w.blank();
        if !entries.is_empty() {
            w.line(2, format!("// Deploy contracts for {}", mon.name));
            w.raw(&statements.finish());
            w.blank();
        }

        w.line(2, format!("// Create {}", mon.name));
        w.line(2, "MonStats memory stats = MonStats({");
        let stats = &mon.stats;
        for (field, value) in [
            ("hp", stats.hp),
            ("stamina", stats.stamina),
            ("speed", stats.speed),
            ("attack", stats.attack),
            ("defense", stats.defense),
            ("specialAttack", stats.special_attack),
            ("specialDefense", stats.special_defense),
        ] {
            w.line(3, format!("{field}: {value},"));
        }
        w.line(3, format!("type1: {},", mon.type1.to_solidity()));
        w.line(3, format!("type2: {}", mon.type2.to_solidity()));
        w.line(2, "});");

        for (array, interface, slots) in [
            ("moves", "IMoveSet", &modules.moves),
            ("abilities", "IAbility", &modules.abilities),
        ] {
            w.line(
                2,
                format!(
                    "{interface}[] memory {array} = new {interface}[]({});",
                    slots.len()
                ),
            );
            for (i, identifier) in slots.iter().enumerate() {
                if let Some(address) = addresses.get(identifier) {
                    w.line(2, format!("{array}[{i}] = {interface}({address});"));
                }
            }
        }
        w.line(2, "bytes32[] memory keys = new bytes32[](0);");
        w.line(2, "string[] memory values = new string[](0);");
        w.line(
            2,
            format!(
                "{REGISTRY_VAR}.createMon({}, stats, moves, abilities, keys, values);",
                mon.id
            ),
        );
        w.blank();
        w.line(2, format!("return {RESULT_BUFFER};"));
        w.line(1, "}");

        DeployFunction {
            name: modules.function.clone(),
            mon_id: mon.id,
            mon_name: mon.name.clone(),
            entries,
            shared_inputs,
            body: w.finish(),
        }
    }
}

/// Local names already used inside one generated function.
struct Locals {
    taken: HashSet<String>,
}

impl Default for Locals {
    fn default() -> Self {
        let taken = [REGISTRY_VAR, RESULT_BUFFER, "stats", "moves", "abilities", "keys", "values"]
            .into_iter()
            .map(String::from)
            .collect();
        Self { taken }
    }
}

impl Locals {
    /// `base`, or `base2`, `base3`, ... when `base` is taken.
    fn claim(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Environment lookup expression for one constructor argument.
pub fn env_lookup(dep: &Dependency) -> String {
    let env = string_literal(&dep.env_name);
    let ty = dep.declared_type.as_str();
    let sized = |prefix: &str| {
        ty.strip_prefix(prefix)
            .is_some_and(|bits| !bits.is_empty() && bits.chars().all(|c| c.is_ascii_digit()))
    };
    match ty {
        "address" => format!("vm.envAddress({env})"),
        "address payable" => format!("payable(vm.envAddress({env}))"),
        "bool" => format!("vm.envBool({env})"),
        "string" => format!("vm.envString({env})"),
        "bytes" => format!("vm.envBytes({env})"),
        "bytes32" => format!("vm.envBytes32({env})"),
        "uint" | "uint256" => format!("vm.envUint({env})"),
        "int" | "int256" => format!("vm.envInt({env})"),
        _ if sized("uint") => format!("{ty}(vm.envUint({env}))"),
        _ if sized("int") => format!("{ty}(vm.envInt({env}))"),
        _ if sized("bytes") => format!("{ty}(vm.envBytes32({env}))"),
        _ => format!("{ty}(vm.envAddress({env}))"),
    }
}
