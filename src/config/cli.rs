use crate::config::SyncConfig;
use crate::utils::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "claims-sync")]
#[command(about = "Sync CollaborateMD claims into Salesforce")]
pub struct CliArgs {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the sync state files (overrides the config)
    #[arg(long)]
    pub state_dir: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one sync
    Run {
        /// Ignore the stored watermark and sync every claim in the report
        #[arg(long)]
        full_sync: bool,
    },
    /// Show the stored sync state
    Status,
}

impl CliArgs {
    pub fn load_config(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_file(path)?,
            None => SyncConfig::from_env()?,
        };

        if let Some(dir) = &self.state_dir {
            config.state.local_dir = dir.clone();
        }
        Ok(config)
    }
}

/// 0 for complete success, 2 for partial success, 1 otherwise.
pub fn exit_code(status_code: u16) -> i32 {
    match status_code {
        200 => 0,
        207 => 2,
        _ => 1,
    }
}
