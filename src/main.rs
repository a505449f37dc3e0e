use claims_sync::config::cli::exit_code;
use claims_sync::utils::logger;
use claims_sync::{
    CliArgs, CollaborateMdClient, Command, LocalStateStore, SalesforceClient, SyncEngine,
    SyncRequest, SyncStateManager,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(args.verbose, "info");
            tracing::error!("❌ Configuration failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    logger::init_cli_logger(args.verbose, &config.log_level);
    tracing::debug!("Loaded config: {:?}", config);

    let state = SyncStateManager::new(
        LocalStateStore::new(&config.state.local_dir),
        &config.state.sync_id,
    );

    match args.command {
        Command::Run { full_sync } => {
            let source = CollaborateMdClient::new(&config)?;
            let target = SalesforceClient::new(&config)?;
            let engine =
                SyncEngine::new(source, target, state, &config.salesforce.external_id_field);

            let response = engine.run(SyncRequest { full_sync }).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            let code = exit_code(response.status_code);
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::Status => match state.get_sync_stats().await {
            Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
            None => println!("No sync recorded for '{}'", state.sync_id()),
        },
    }

    Ok(())
}
