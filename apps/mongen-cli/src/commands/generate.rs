use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use super::ProjectArgs;

#[derive(Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
    /// Write the script here instead of the configured output path
    #[arg(long, conflicts_with = "stdout")]
    pub output: Option<PathBuf>,
    /// Print the script to stdout; the summary goes to stderr
    #[arg(long)]
    pub stdout: bool,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let project = args.project.open()?;
    let generation = project.generate().context("generating deployment script")?;
    let plan = &generation.plan;

    let mut summary = vec![
        format!("Loaded {} mons", plan.mon_count()),
        format!("Found {} unique contracts to deploy", plan.contract_count()),
    ];

    if args.stdout {
        print!("{}", generation.script);
    } else {
        let out = args.output.unwrap_or_else(|| project.output_path());
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        debug!(path = %out.display(), bytes = generation.script.len(), "writing script");
        fs::write(&out, &generation.script)
            .with_context(|| format!("writing {}", out.display()))?;
        summary.push(format!("Generated deployment script: {}", out.display()));
    }

    summary.push(String::new());
    summary.push("Summary:".to_string());
    for mon in plan.roster.iter() {
        summary.push(format!(
            "  {}: {} moves, {} abilities",
            mon.name,
            mon.moves.len(),
            mon.abilities.len()
        ));
    }
    if !plan.warnings.is_empty() {
        summary.push(String::new());
        summary.push(format!("Warnings ({}):", plan.warnings.len()));
        summary.extend(plan.warnings.iter().map(|w| format!("  {w}")));
    }

    let text = summary.join("\n");
    if args.stdout {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}
