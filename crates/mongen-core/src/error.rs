use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while reading the roster tables.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A required cell is missing or not a number; names the offending row.
    #[error("{file}: line {line}: {reason}")]
    MalformedInput {
        file: String,
        line: u64,
        reason: String,
    },
}

impl LoadError {
    pub(crate) fn malformed(file: &str, line: u64, reason: impl Into<String>) -> Self {
        LoadError::MalformedInput {
            file: file.to_string(),
            line,
            reason: reason.into(),
        }
    }
}

/// Fatal errors raised while turning the roster into deployable units.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{kind} `{name}` of mon `{mon}` has no alphanumeric characters to derive an identifier from")]
    EmptyIdentifier {
        kind: &'static str,
        name: String,
        mon: String,
    },
    #[error("{kind} `{name}` of mon `{mon}` derives `{identifier}`, which the generated script already declares")]
    ReservedIdentifier {
        kind: &'static str,
        identifier: String,
        name: String,
        mon: String,
    },
    #[error("`{second}` and `{first}` both derive the identifier `{identifier}`; rename one of them")]
    IdentifierCollision {
        identifier: String,
        first: String,
        second: String,
    },
}

/// Errors from [`crate::load_config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config {} does not match the schema: {}", path.display(), issues.join(", "))]
    Invalid { path: PathBuf, issues: Vec<String> },
}

/// Any failure that stops a pipeline run before output is produced.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Non-fatal diagnostics. The run continues; each one is also logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// An assignment row names a mon that is not in the mon table.
    OrphanReference {
        table: String,
        line: u64,
        module: String,
        mon: String,
    },
    /// A module source is missing or only partly understood.
    ModuleAnalysis { path: String, reason: String },
    /// Two import paths bind the same local name; the later one is dropped.
    ImportConflict {
        symbol: String,
        kept: String,
        dropped: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::OrphanReference {
                table,
                line,
                module,
                mon,
            } => write!(
                f,
                "{table}: line {line}: `{module}` references unknown mon `{mon}`; row skipped"
            ),
            Warning::ModuleAnalysis { path, reason } => write!(f, "{path}: {reason}"),
            Warning::ImportConflict {
                symbol,
                kept,
                dropped,
            } => write!(
                f,
                "`{symbol}` is imported from both `{kept}` and `{dropped}`; keeping `{kept}`"
            ),
        }
    }
}
