use anyhow::{Context, Result};
use clap::Args;
use mongen_core::PlanReport;

use super::ProjectArgs;

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,
    /// Pretty-print JSON (with --json)
    #[arg(long, requires = "json")]
    pub pretty: bool,
}

pub fn run(args: PlanArgs) -> Result<()> {
    let project = args.project.open()?;
    let plan = project.plan().context("building deployment plan")?;
    let report = plan.report();
    if args.json {
        let text = if args.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{text}");
    } else {
        print_text(&report);
    }
    Ok(())
}

fn print_text(report: &PlanReport) {
    println!(
        "{} mons, {} unique contracts",
        report.mons.len(),
        report.contracts
    );
    for mon in &report.mons {
        println!();
        println!(
            "{} (#{}) -> {}: {} moves, {} abilities",
            mon.name, mon.id, mon.function, mon.moves, mon.abilities
        );
        for module in &mon.modules {
            match &module.reused_from {
                Some(owner) => println!("  reuse  {} (deployed for {owner})", module.identifier),
                None => println!("  deploy {}", module.identifier),
            }
            for dep in &module.dependencies {
                println!("         {} <- env {}", dep.declared_type, dep.env_name);
            }
            for import in &module.imports {
                println!(
                    "         import {{{}}} from {}",
                    import.symbols.join(", "),
                    import.path
                );
            }
        }
    }
    if !report.warnings.is_empty() {
        println!();
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  {warning}");
        }
    }
}
