use serde::Serialize;
use std::fmt;

/// Names the generated functions already use for their own locals and
/// parameters, plus Solidity keywords a lower-cased contract name can hit.
const RESERVED_NAMES: &[&str] = &[
    "abilities",
    "address",
    "allDeployData",
    "bool",
    "contract",
    "currentIndex",
    "delete",
    "deployedContracts",
    "emit",
    "error",
    "event",
    "function",
    "keys",
    "mapping",
    "moves",
    "new",
    "registry",
    "return",
    "stats",
    "string",
    "struct",
    "super",
    "this",
    "totalLength",
    "type",
    "values",
    "vm",
];

/// Generated contract identifier: the ASCII alphanumeric characters of a
/// display name, in order.
///
/// Two display names that differ only in punctuation or spacing derive the
/// same identifier. The collector treats that as a hard error unless the
/// display names are identical (a shared module).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Derive the identifier for `name`; `None` when nothing alphanumeric remains.
    pub fn derive(name: &str) -> Option<Self> {
        let ident: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if ident.is_empty() {
            None
        } else {
            Some(Self(ident))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Camel-case local variable name for an instance of this contract.
    pub fn variable_name(&self) -> String {
        let mut chars = self.0.chars();
        let mut out = String::with_capacity(self.0.len() + 8);
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_lowercase());
        }
        out.extend(chars);
        if out.starts_with(|c: char| c.is_ascii_digit()) {
            out.insert(0, '_');
        }
        if RESERVED_NAMES.contains(&out.as_str()) {
            out.push_str("Contract");
        }
        out
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the per-mon deploy function.
pub fn function_name(mon: &Identifier) -> String {
    format!("deploy{}", mon)
}

/// Source directory holding a mon's module contracts.
pub fn directory_name(mon_name: &str) -> String {
    mon_name.to_lowercase()
}

/// Render `value` as a double-quoted Solidity string literal. Values with
/// non-ASCII characters use the `unicode"..."` form.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 9);
    if !value.is_ascii() {
        out.push_str("unicode");
    }
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
