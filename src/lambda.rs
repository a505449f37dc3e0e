use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::Client as DynamoClient;
use claims_sync::utils::logger;
use claims_sync::{
    CollaborateMdClient, DynamoStateStore, Result, SalesforceClient, SyncConfig, SyncEngine,
    SyncRequest, SyncResponse, SyncStateManager,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

async fn sync(config: &SyncConfig, request: SyncRequest) -> Result<SyncResponse> {
    let aws = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.state.region.clone()))
        .load()
        .await;
    let store = DynamoStateStore::new(DynamoClient::new(&aws), &config.state.table_name);

    let engine = SyncEngine::new(
        CollaborateMdClient::new(config)?,
        SalesforceClient::new(config)?,
        SyncStateManager::new(store, &config.state.sync_id),
        &config.salesforce.external_id_field,
    );
    Ok(engine.run(request).await)
}

async fn function_handler(event: LambdaEvent<SyncRequest>) -> std::result::Result<SyncResponse, Error> {
    let request = event.payload;
    tracing::info!("Lambda invoked (full_sync: {})", request.full_sync);

    let response = match SyncConfig::from_env() {
        Ok(config) => sync(&config, request).await,
        Err(e) => Err(e),
    };

    Ok(response.unwrap_or_else(|e| {
        tracing::error!("❌ Sync could not start: {}", e);
        SyncResponse::from_error(&e)
    }))
}

#[tokio::main]
async fn main() -> std::result::Result<(), Error> {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    logger::init_lambda_logger(&level);

    run(service_fn(function_handler)).await
}
