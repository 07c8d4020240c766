//! Regex-level static analysis of module contract sources.
//!
//! Only two things are extracted from a source file: the parameters of its
//! first constructor and the named imports that provide the parameter types.
//! Everything else in the file is ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{SourceLanguage, SourcesConfig};
use crate::error::Warning;

/// A constructor argument the script must supply from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub env_name: String,
    pub declared_type: String,
}

/// A named import declaration as written in a source file, narrowed to the
/// symbols the constructor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportDecl {
    pub symbols: Vec<String>,
    pub path: String,
}

/// An import the generated script must carry, with a script-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportPath {
    pub symbols: Vec<String>,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceAnalysis {
    pub dependencies: Vec<Dependency>,
    pub imports: Vec<ImportDecl>,
    /// Constructor parameters that did not match `<type> <name>`.
    pub unmatched_params: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("constructor parameter list opened at byte {0} is never closed")]
    UnterminatedConstructor(usize),
}

/// Extracts constructor dependencies and imports from one contract language.
pub trait SourceAnalyzer {
    fn language(&self) -> SourceLanguage;

    fn analyze(&self, source: &str) -> Result<SourceAnalysis, AnalysisError>;
}

/// Pick the analyzer for a configured language.
pub fn analyzer_for(language: SourceLanguage) -> Box<dyn SourceAnalyzer> {
    match language {
        SourceLanguage::Solidity => Box::new(SolidityAnalyzer),
    }
}

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("comment regex"));
static CONSTRUCTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bconstructor\s*\(").expect("constructor regex"));
static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*(?:\s+payable)?)(?:\s+(?:memory|calldata|storage))*\s+([A-Za-z_$][\w$]*)$",
    )
    .expect("parameter regex")
});
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s*\{([^}]*)\}\s*from\s*["']([^"']+)["']\s*;"#).expect("import regex")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct SolidityAnalyzer;

impl SourceAnalyzer for SolidityAnalyzer {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Solidity
    }

    fn analyze(&self, source: &str) -> Result<SourceAnalysis, AnalysisError> {
        let source = COMMENT_RE.replace_all(source, "");
        let Some(params) = constructor_params(&source)? else {
            return Ok(SourceAnalysis::default());
        };

        let mut analysis = SourceAnalysis::default();
        let mut types = BTreeSet::new();
        for param in split_top_level(params) {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let Some(caps) = PARAM_RE.captures(param) else {
                analysis.unmatched_params.push(param.to_string());
                continue;
            };
            let declared_type = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
            let name = &caps[2];
            let bare = name.strip_prefix('_').unwrap_or(name);
            types.insert(type_root(&declared_type).to_string());
            analysis.dependencies.push(Dependency {
                env_name: bare.to_uppercase(),
                declared_type,
            });
        }

        for caps in IMPORT_RE.captures_iter(&source) {
            let symbols: Vec<String> = caps[1]
                .split(',')
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|s| !s.is_empty())
                .filter(|s| types.contains(local_name(s)))
                .collect();
            if !symbols.is_empty() {
                analysis.imports.push(ImportDecl {
                    symbols,
                    path: caps[2].to_string(),
                });
            }
        }
        Ok(analysis)
    }
}

/// Text between the parentheses of the first constructor, if any.
fn constructor_params(source: &str) -> Result<Option<&str>, AnalysisError> {
    let Some(m) = CONSTRUCTOR_RE.find(source) else {
        return Ok(None);
    };
    let open = m.end() - 1;
    let mut depth = 0usize;
    for (offset, c) in source[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(&source[open + 1..open + offset]));
                }
            }
            _ => {}
        }
    }
    Err(AnalysisError::UnterminatedConstructor(open))
}

/// Split on commas that are not nested inside brackets.
fn split_top_level(params: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in params.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&params[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push(&params[start..]);
    out
}

/// `Lib.Type` is imported as `Lib`; `address payable` needs no import.
fn type_root(declared: &str) -> &str {
    declared.split(['.', ' ']).next().unwrap_or(declared)
}

/// Name an import symbol binds locally (`A as B` binds `B`).
pub(crate) fn local_name(symbol: &str) -> &str {
    symbol.rsplit(" as ").next().unwrap_or(symbol).trim()
}

/// Rewrites import paths found in module sources so the generated script can
/// use them.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    parent_prefix: String,
    canonical_root: String,
    ignored_prefixes: Vec<String>,
}

impl ImportResolver {
    pub fn new(
        parent_prefix: impl Into<String>,
        canonical_root: impl Into<String>,
        ignored_prefixes: Vec<String>,
    ) -> Self {
        Self {
            parent_prefix: parent_prefix.into(),
            canonical_root: canonical_root.into(),
            ignored_prefixes,
        }
    }

    pub fn from_config(sources: &SourcesConfig) -> Self {
        Self::new(
            sources.parent_prefix.clone(),
            sources.canonical_root.clone(),
            sources.ignored_prefixes.clone(),
        )
    }

    /// Script-relative form of `raw`, an import written in a file that the
    /// script sees at `source_dir`. `None` for ignored namespaces.
    pub fn resolve(&self, raw: &str, source_dir: &str) -> Option<String> {
        if self
            .ignored_prefixes
            .iter()
            .any(|prefix| raw.starts_with(prefix.as_str()))
        {
            return None;
        }
        if !self.parent_prefix.is_empty() {
            if let Some(rest) = raw.strip_prefix(self.parent_prefix.as_str()) {
                return Some(normalize(&format!("{}/{}", self.canonical_root, rest)));
            }
        }
        Some(normalize(&format!("{}/{}", source_dir, raw)))
    }
}

/// Lexically collapse `.` and `..` segments of a `/`-separated path.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Outcome of analyzing one module file; never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAnalysis {
    pub dependencies: Vec<Dependency>,
    pub imports: Vec<ImportPath>,
    pub warnings: Vec<Warning>,
}

/// Read and analyze `path`. `import_dir` is the directory containing the file
/// as seen from the generated script.
///
/// Missing or unparsable sources degrade to empty results plus a
/// [`Warning::ModuleAnalysis`], so one bad module never blocks the roster.
pub fn analyze_module(
    analyzer: &dyn SourceAnalyzer,
    resolver: &ImportResolver,
    path: &Path,
    import_dir: &str,
) -> ModuleAnalysis {
    let mut out = ModuleAnalysis::default();
    let shown = path.display().to_string();
    let degrade = |reason: String, out: &mut ModuleAnalysis| {
        let warning = Warning::ModuleAnalysis {
            path: shown.clone(),
            reason,
        };
        warn!("{warning}");
        out.warnings.push(warning);
    };

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            degrade(format!("contract source unreadable: {err}"), &mut out);
            return out;
        }
    };
    let analysis = match analyzer.analyze(&source) {
        Ok(analysis) => analysis,
        Err(err) => {
            degrade(err.to_string(), &mut out);
            return out;
        }
    };
    for param in &analysis.unmatched_params {
        degrade(
            format!("constructor parameter `{param}` not understood; argument omitted"),
            &mut out,
        );
    }

    out.dependencies = analysis.dependencies;
    out.imports = analysis
        .imports
        .into_iter()
        .filter_map(|decl| {
            resolver.resolve(&decl.path, import_dir).map(|path| ImportPath {
                symbols: decl.symbols,
                path,
            })
        })
        .collect();
    debug!(
        path = %shown,
        dependencies = out.dependencies.len(),
        imports = out.imports.len(),
        "analyzed module"
    );
    out
}
