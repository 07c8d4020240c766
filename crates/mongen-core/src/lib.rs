//! Turns a mon roster (CSV tables plus per-mon contract sources) into a
//! Foundry deployment script.
//!
//! The pipeline is loader → collector (driving the analyzer) → generator →
//! assembler. Every stage is synchronous and deterministic: the same inputs
//! always produce a byte-identical script.

use std::mem;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod analyzer;
pub mod assembler;
pub mod collector;
mod config;
pub mod error;
pub mod generator;
pub mod ident;
mod plan;
pub mod roster;
mod writer;

pub use config::{
    config_schema_json, discover_config, load_config, Config, DataConfig, OutputConfig,
    SourceLanguage, SourcesConfig, CONFIG_FILE_NAME,
};
pub use error::{ConfigError, Error, GenerateError, LoadError, Warning};
pub use plan::{ModulePlan, MonPlan, Plan, PlanReport};

use analyzer::{analyzer_for, ImportResolver};
use assembler::{assemble, ScriptOptions};
use collector::{collect, SourceLayout};
use generator::{DeployFunction, DeployGenerator};
use roster::load_roster;

/// A project root plus the configuration that locates its inputs.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
}

/// Everything produced by a full run.
#[derive(Debug, Clone)]
pub struct Generation {
    pub plan: Plan,
    pub functions: Vec<DeployFunction>,
    pub script: String,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load `<root>/mongen.toml` (or `config` when given) and bind it to `root`.
    pub fn open(root: impl Into<PathBuf>, config: Option<&Path>) -> Result<Self, ConfigError> {
        let root = root.into();
        let config = discover_config(&root, config)?;
        Ok(Self::new(root, config))
    }

    fn path(&self, relative: &str) -> PathBuf {
        Config::resolve(&self.root, relative)
    }

    /// Where `generate` output goes unless the caller overrides it.
    pub fn output_path(&self) -> PathBuf {
        self.path(&self.config.output.path)
    }

    /// Load the roster and collect module contracts without rendering.
    pub fn plan(&self) -> Result<Plan, Error> {
        let data = &self.config.data;
        let mut warnings = Vec::new();
        let roster = load_roster(
            &self.path(&data.mons),
            &self.path(&data.moves),
            &self.path(&data.abilities),
            self.config.output.default_stamina,
            &mut warnings,
        )?;
        info!(mons = roster.len(), "loaded roster");

        let sources = &self.config.sources;
        let layout = SourceLayout::from_config(&self.root, sources);
        let resolver = ImportResolver::from_config(sources);
        let analyzer = analyzer_for(sources.language);
        let mut collection = collect(&roster, &layout, analyzer.as_ref(), &resolver)?;
        warnings.append(&mut mem::take(&mut collection.warnings));

        Ok(Plan {
            roster,
            collection,
            warnings,
        })
    }

    /// Full run: plan, render every deploy function, assemble the script.
    pub fn generate(&self) -> Result<Generation, Error> {
        let mut plan = self.plan()?;
        let functions = DeployGenerator::generate_all(&plan.roster, &plan.collection);
        let script = assemble(
            &plan.collection.registry,
            &functions,
            &ScriptOptions::from_config(&self.config.output),
        );
        plan.warnings.extend(script.warnings);
        info!(
            functions = functions.len(),
            bytes = script.source.len(),
            "assembled deployment script"
        );
        Ok(Generation {
            plan,
            functions,
            script: script.source,
        })
    }
}
