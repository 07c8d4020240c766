use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{LoadError, Warning};

/// Cell value marking an absent secondary type.
pub const NONE_SENTINEL: &str = "NA";

/// Mon type as written in the table, or the "none" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    None,
    Named(String),
}

impl TypeTag {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() || raw == NONE_SENTINEL {
            return Ok(TypeTag::None);
        }
        if raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(TypeTag::Named(raw.to_string()))
        } else {
            Err(format!("type `{raw}` is not a valid enum member name"))
        }
    }

    /// Member of the script's `Type` enum.
    pub fn to_solidity(&self) -> String {
        match self {
            TypeTag::None => "Type.None".to_string(),
            TypeTag::Named(name) => format!("Type.{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonStats {
    pub hp: u32,
    pub stamina: u32,
    pub speed: u32,
    pub attack: u32,
    pub defense: u32,
    pub special_attack: u32,
    pub special_defense: u32,
}

/// One roster entry. Never mutated once the roster is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonRecord {
    pub id: u32,
    pub name: String,
    pub stats: MonStats,
    pub type1: TypeTag,
    pub type2: TypeTag,
    pub moves: Vec<String>,
    pub abilities: Vec<String>,
}

/// Loaded mons in ascending id order, addressable by display name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Roster {
    mons: Vec<MonRecord>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl Roster {
    pub fn iter(&self) -> impl Iterator<Item = &MonRecord> {
        self.mons.iter()
    }

    pub fn get(&self, name: &str) -> Option<&MonRecord> {
        self.by_name.get(name).map(|&idx| &self.mons[idx])
    }

    pub fn len(&self) -> usize {
        self.mons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mons.is_empty()
    }
}

/// One CSV table plus the label used to name it in diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    pub label: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignmentKind {
    Move,
    Ability,
}

/// Read the three tables from disk and build the roster.
pub fn load_roster(
    mons: &Path,
    moves: &Path,
    abilities: &Path,
    default_stamina: u32,
    warnings: &mut Vec<Warning>,
) -> Result<Roster, LoadError> {
    let read = |path: &Path| {
        fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    };
    let mons_text = read(mons)?;
    let moves_text = read(moves)?;
    let abilities_text = read(abilities)?;
    let mons_label = mons.display().to_string();
    let moves_label = moves.display().to_string();
    let abilities_label = abilities.display().to_string();
    parse_roster(
        Table {
            label: &mons_label,
            text: &mons_text,
        },
        Table {
            label: &moves_label,
            text: &moves_text,
        },
        Table {
            label: &abilities_label,
            text: &abilities_text,
        },
        default_stamina,
        warnings,
    )
}

/// Build the roster from in-memory tables.
///
/// Assignment rows naming an unknown mon are dropped with an
/// [`Warning::OrphanReference`]; any malformed mon row fails the whole load.
pub fn parse_roster(
    mons: Table<'_>,
    moves: Table<'_>,
    abilities: Table<'_>,
    default_stamina: u32,
    warnings: &mut Vec<Warning>,
) -> Result<Roster, LoadError> {
    let mut records = parse_mons(mons, default_stamina)?;
    let index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(idx, mon)| (mon.name.clone(), idx))
        .collect();

    for (table, kind) in [
        (moves, AssignmentKind::Move),
        (abilities, AssignmentKind::Ability),
    ] {
        for (line, module, mon) in parse_assignments(table)? {
            match index.get(&mon) {
                Some(&idx) => match kind {
                    AssignmentKind::Move => records[idx].moves.push(module),
                    AssignmentKind::Ability => records[idx].abilities.push(module),
                },
                None => {
                    let warning = Warning::OrphanReference {
                        table: table.label.to_string(),
                        line,
                        module,
                        mon,
                    };
                    warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }
    }

    records.sort_by_key(|mon| mon.id);
    let by_name = records
        .iter()
        .enumerate()
        .map(|(idx, mon)| (mon.name.clone(), idx))
        .collect();
    debug!(mons = records.len(), "roster loaded");
    Ok(Roster {
        mons: records,
        by_name,
    })
}

struct Columns<'a> {
    label: &'a str,
    headers: StringRecord,
}

impl<'a> Columns<'a> {
    fn required(&self, name: &str) -> Result<usize, LoadError> {
        self.optional(name)
            .ok_or_else(|| LoadError::malformed(self.label, 1, format!("missing column `{name}`")))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn csv_error(label: &str, err: csv::Error) -> LoadError {
    let line = err.position().map(|pos| pos.line()).unwrap_or(0);
    LoadError::malformed(label, line, err.to_string())
}

fn line_of(record: &StringRecord, fallback: usize) -> u64 {
    record
        .position()
        .map(|pos| pos.line())
        .unwrap_or(fallback as u64 + 2)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

fn parse_mons(table: Table<'_>, default_stamina: u32) -> Result<Vec<MonRecord>, LoadError> {
    let mut rdr = reader(table.text);
    let columns = Columns {
        label: table.label,
        headers: rdr.headers().map_err(|err| csv_error(table.label, err))?.clone(),
    };
    let id_col = columns.required("Id")?;
    let name_col = columns.required("Name")?;
    let hp_col = columns.required("HP")?;
    let speed_col = columns.required("Speed")?;
    let attack_col = columns.required("Attack")?;
    let defense_col = columns.required("Defense")?;
    let sp_attack_col = columns.required("SpecialAttack")?;
    let sp_defense_col = columns.required("SpecialDefense")?;
    let type1_col = columns.required("Type1")?;
    let type2_col = columns.required("Type2")?;
    let stamina_col = columns.optional("Stamina");

    let mut mons = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|err| csv_error(table.label, err))?;
        if is_blank(&record) {
            continue;
        }
        let line = line_of(&record, idx);
        let cell = |col: usize| record.get(col).unwrap_or("");
        let number = |col: usize, column: &str| -> Result<u32, LoadError> {
            let raw = cell(col);
            if raw.is_empty() {
                return Err(LoadError::malformed(
                    table.label,
                    line,
                    format!("missing value for `{column}`"),
                ));
            }
            raw.parse::<u32>().map_err(|_| {
                LoadError::malformed(
                    table.label,
                    line,
                    format!("`{column}` must be a non-negative integer, got `{raw}`"),
                )
            })
        };

        let name = cell(name_col).to_string();
        if name.is_empty() {
            return Err(LoadError::malformed(table.label, line, "missing value for `Name`"));
        }
        let id = number(id_col, "Id")?;
        if !seen_ids.insert(id) {
            return Err(LoadError::malformed(table.label, line, format!("duplicate Id {id}")));
        }
        if !seen_names.insert(name.clone()) {
            return Err(LoadError::malformed(
                table.label,
                line,
                format!("duplicate Name `{name}`"),
            ));
        }
        let stamina = match stamina_col {
            Some(col) if !cell(col).is_empty() => number(col, "Stamina")?,
            _ => default_stamina,
        };
        let stats = MonStats {
            hp: number(hp_col, "HP")?,
            stamina,
            speed: number(speed_col, "Speed")?,
            attack: number(attack_col, "Attack")?,
            defense: number(defense_col, "Defense")?,
            special_attack: number(sp_attack_col, "SpecialAttack")?,
            special_defense: number(sp_defense_col, "SpecialDefense")?,
        };
        let type1 = TypeTag::parse(cell(type1_col))
            .map_err(|reason| LoadError::malformed(table.label, line, reason))?;
        let type2 = TypeTag::parse(cell(type2_col))
            .map_err(|reason| LoadError::malformed(table.label, line, reason))?;

        mons.push(MonRecord {
            id,
            name,
            stats,
            type1,
            type2,
            moves: Vec::new(),
            abilities: Vec::new(),
        });
    }
    Ok(mons)
}

/// `(line, module name, mon name)` for every non-blank assignment row.
fn parse_assignments(table: Table<'_>) -> Result<Vec<(u64, String, String)>, LoadError> {
    let mut rdr = reader(table.text);
    let columns = Columns {
        label: table.label,
        headers: rdr.headers().map_err(|err| csv_error(table.label, err))?.clone(),
    };
    let name_col = columns.required("Name")?;
    let mon_col = columns.required("Mon")?;

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|err| csv_error(table.label, err))?;
        let module = record.get(name_col).unwrap_or("");
        let mon = record.get(mon_col).unwrap_or("");
        if module.is_empty() || mon.is_empty() {
            continue;
        }
        rows.push((line_of(&record, idx), module.to_string(), mon.to_string()));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONS: &str = "\
Id,Name,HP,Speed,Attack,Defense,SpecialAttack,SpecialDefense,Type1,Type2
2,Beta,200,20,21,22,23,24,Metal,NA
1,Alpha,100,10,11,12,13,14,Fire,Yin
";

    fn table<'a>(label: &'a str, text: &'a str) -> Table<'a> {
        Table { label, text }
    }

    fn load(mons: &str, moves: &str, abilities: &str) -> (Result<Roster, LoadError>, Vec<Warning>) {
        let mut warnings = Vec::new();
        let roster = parse_roster(
            table("mons.csv", mons),
            table("moves.csv", moves),
            table("abilities.csv", abilities),
            5,
            &mut warnings,
        );
        (roster, warnings)
    }

    #[test]
    fn mons_are_ordered_by_id_with_assignments_attached() {
        let (roster, warnings) = load(
            MONS,
            "Name,Mon\nTackle,Alpha\nTackle,Beta\nGuard,Beta\n",
            "Name,Mon\nThick Skin,Beta\n",
        );
        let roster = roster.expect("roster");
        assert!(warnings.is_empty());
        let names: Vec<_> = roster.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);
        let beta = roster.get("Beta").expect("beta");
        assert_eq!(beta.moves, ["Tackle", "Guard"]);
        assert_eq!(beta.abilities, ["Thick Skin"]);
        assert_eq!(beta.type2, TypeTag::None);
        assert_eq!(beta.stats.stamina, 5);
        assert_eq!(roster.get("Alpha").unwrap().type2.to_solidity(), "Type.Yin");
    }

    #[test]
    fn orphan_assignments_are_skipped_with_warning() {
        let (roster, warnings) = load(MONS, "Name,Mon\nTackle,Gamma\nTackle,Alpha\n", "Name,Mon\n");
        let roster = roster.expect("roster");
        assert_eq!(roster.get("Alpha").unwrap().moves, ["Tackle"]);
        assert_eq!(
            warnings,
            vec![Warning::OrphanReference {
                table: "moves.csv".into(),
                line: 2,
                module: "Tackle".into(),
                mon: "Gamma".into(),
            }]
        );
    }

    #[test]
    fn blank_assignment_cells_are_ignored_silently() {
        let (roster, warnings) = load(MONS, "Name,Mon\n,Alpha\nTackle,\n,\n", "Name,Mon\n");
        assert!(roster.unwrap().get("Alpha").unwrap().moves.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn non_numeric_stat_names_the_row() {
        let mons = "\
Id,Name,HP,Speed,Attack,Defense,SpecialAttack,SpecialDefense,Type1,Type2
1,Alpha,100,10,11,12,13,14,Fire,NA
2,Beta,lots,20,21,22,23,24,Metal,NA
";
        let (roster, _) = load(mons, "Name,Mon\n", "Name,Mon\n");
        match roster.unwrap_err() {
            LoadError::MalformedInput { file, line, reason } => {
                assert_eq!(file, "mons.csv");
                assert_eq!(line, 3);
                assert!(reason.contains("HP"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_column_is_malformed() {
        let (roster, _) = load("Id,Name,HP\n1,Alpha,100\n", "Name,Mon\n", "Name,Mon\n");
        let err = roster.unwrap_err();
        assert!(err.to_string().contains("missing column `Speed`"), "{err}");

        let (roster, _) = load(MONS, "Move,Mon\n", "Name,Mon\n");
        assert!(matches!(roster.unwrap_err(), LoadError::MalformedInput { .. }));
    }

    #[test]
    fn duplicate_ids_and_names_are_rejected() {
        let dup_id = format!("{MONS}1,Gamma,1,1,1,1,1,1,Fire,NA\n");
        let (roster, _) = load(&dup_id, "Name,Mon\n", "Name,Mon\n");
        assert!(roster.unwrap_err().to_string().contains("duplicate Id 1"));

        let dup_name = format!("{MONS}3,Alpha,1,1,1,1,1,1,Fire,NA\n");
        let (roster, _) = load(&dup_name, "Name,Mon\n", "Name,Mon\n");
        assert!(roster.unwrap_err().to_string().contains("duplicate Name"));
    }

    #[test]
    fn stamina_column_overrides_default() {
        let mons = "\
Id,Name,HP,Stamina,Speed,Attack,Defense,SpecialAttack,SpecialDefense,Type1,Type2
1,Alpha,100,3,10,11,12,13,14,Fire,
2,Beta,100,,10,11,12,13,14,Fire,
";
        let (roster, _) = load(mons, "Name,Mon\n", "Name,Mon\n");
        let roster = roster.unwrap();
        assert_eq!(roster.get("Alpha").unwrap().stats.stamina, 3);
        assert_eq!(roster.get("Beta").unwrap().stats.stamina, 5);
        assert_eq!(roster.get("Beta").unwrap().type2, TypeTag::None);
    }

    #[test]
    fn type_tags_must_be_enum_members() {
        assert_eq!(TypeTag::parse("NA").unwrap(), TypeTag::None);
        assert_eq!(TypeTag::parse(" ").unwrap(), TypeTag::None);
        assert_eq!(TypeTag::parse("Fire").unwrap().to_solidity(), "Type.Fire");
        assert!(TypeTag::parse("Fire Water").is_err());
    }
}
