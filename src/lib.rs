pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{CollaborateMdClient, SalesforceClient};
pub use config::SyncConfig;
pub use core::{SyncEngine, SyncRequest, SyncResponse, SyncStateManager};
pub use utils::error::{Result, SyncError};

#[cfg(feature = "cli")]
pub use adapters::state::LocalStateStore;
#[cfg(feature = "cli")]
pub use config::cli::{CliArgs, Command};

#[cfg(feature = "lambda")]
pub use adapters::state::DynamoStateStore;
