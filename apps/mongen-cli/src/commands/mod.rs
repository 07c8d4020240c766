use anyhow::{Context, Result};
use clap::Args;
use mongen_core::Project;
use std::path::PathBuf;

pub mod config;
pub mod generate;
pub mod plan;

pub use config::ConfigCmd;
pub use generate::GenerateArgs;
pub use plan::PlanArgs;

/// Options shared by every command that reads a project.
#[derive(Args, Clone)]
pub struct ProjectArgs {
    /// Project root; data and source paths resolve against it
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// Config file (default: <root>/mongen.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ProjectArgs {
    pub fn open(&self) -> Result<Project> {
        Project::open(self.root.clone(), self.config.as_deref())
            .with_context(|| format!("loading configuration for {}", self.root.display()))
    }
}
