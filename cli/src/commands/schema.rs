//! Schema command implementation

use anyhow::{Context, Result};
use clap::Args;
use sluice_exporter::schema::{infer_schema, SchemaOptions};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Line-delimited JSON file ("-" for stdin)
    pub input: PathBuf,

    /// Type quoted scalars as STRING instead of inferring from their content
    #[arg(long)]
    pub quoted_values_are_strings: bool,

    /// Omit columns that were only ever null
    #[arg(long)]
    pub drop_nulls: bool,
}

pub fn run(args: SchemaArgs) -> Result<()> {
    let options = SchemaOptions {
        keep_nulls: !args.drop_nulls,
        quoted_values_are_strings: args.quoted_values_are_strings,
    };

    let schema = if args.input.as_os_str() == "-" {
        infer_schema(io::stdin().lock(), options)?
    } else {
        let file = File::open(&args.input)
            .with_context(|| format!("Failed to open {}", args.input.display()))?;
        infer_schema(BufReader::new(file), options)?
    };

    println!("{}", schema.to_json_pretty()?);
    Ok(())
}
