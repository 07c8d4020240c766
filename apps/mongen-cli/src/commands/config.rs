use anyhow::Result;
use clap::{Args, Subcommand};
use mongen_core::config_schema_json;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the JSON schema for mongen.toml
    Schema(SchemaArgs),
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

pub fn run(cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Schema(args) => {
            let schema = config_schema_json();
            if args.pretty {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                println!("{schema}");
            }
        }
    }
    Ok(())
}
