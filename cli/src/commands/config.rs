//! Config command implementation

use anyhow::Result;
use clap::Args;
use sluice_exporter::config::{AuthConfig, ExporterConfig};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long, env = "SLUICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print static tokens instead of masking them
    #[arg(long)]
    pub show_secrets: bool,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let mut config = ExporterConfig::load(args.config.as_deref())?;
    if !args.show_secrets {
        if let AuthConfig::Static { token } = &mut config.auth {
            *token = "<redacted>".to_string();
        }
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
