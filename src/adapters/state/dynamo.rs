use crate::domain::model::SyncState;
use crate::domain::ports::StateBackend;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

const KEY_ATTRIBUTE: &str = "sync_id";
const TABLE_READY_ATTEMPTS: u32 = 30;
const TABLE_READY_INTERVAL: Duration = Duration::from_secs(2);

/// DynamoDB table with one item per sync id. The table is created on first
/// use if it does not exist.
#[derive(Debug)]
pub struct DynamoStateStore {
    client: DynamoClient,
    table_name: String,
    ready: OnceCell<()>,
}

impl DynamoStateStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            ready: OnceCell::new(),
        }
    }

    async fn ensure_table(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                match self.table_status().await? {
                    Some(TableStatus::Active) => Ok(()),
                    Some(_) => self.wait_until_active().await,
                    None => {
                        self.create_table().await?;
                        self.wait_until_active().await
                    }
                }
            })
            .await
            .map(|_| ())
    }

    /// `None` when the table does not exist.
    async fn table_status(&self) -> Result<Option<TableStatus>> {
        match self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .table()
                .and_then(|table| table.table_status())
                .cloned()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(store_error("describe table", DisplayErrorContext(&e))),
        }
    }

    async fn create_table(&self) -> Result<()> {
        tracing::info!("Creating DynamoDB table {}", self.table_name);

        let key = KeySchemaElement::builder()
            .attribute_name(KEY_ATTRIBUTE)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| store_error("build key schema", e))?;
        let attribute = AttributeDefinition::builder()
            .attribute_name(KEY_ATTRIBUTE)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| store_error("build attribute definition", e))?;

        match self
            .client
            .create_table()
            .table_name(&self.table_name)
            .key_schema(key)
            .attribute_definitions(attribute)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            // Another invocation got there first.
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_in_use_exception()) =>
            {
                Ok(())
            }
            Err(e) => Err(store_error("create table", DisplayErrorContext(&e))),
        }
    }

    async fn wait_until_active(&self) -> Result<()> {
        for _ in 0..TABLE_READY_ATTEMPTS {
            if let Some(TableStatus::Active) = self.table_status().await? {
                tracing::info!("✅ DynamoDB table {} is active", self.table_name);
                return Ok(());
            }
            tokio::time::sleep(TABLE_READY_INTERVAL).await;
        }

        Err(SyncError::StateStoreError {
            message: format!("Table {} did not become active", self.table_name),
        })
    }
}

#[async_trait]
impl StateBackend for DynamoStateStore {
    async fn load(&self, sync_id: &str) -> Result<Option<SyncState>> {
        self.ensure_table().await?;

        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(sync_id.to_string()))
            .send()
            .await
            .map_err(|e| store_error("get item", DisplayErrorContext(&e)))?;

        output.item().map(item_to_state).transpose()
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        self.ensure_table().await?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(state_to_item(state)))
            .send()
            .await
            .map_err(|e| store_error("put item", DisplayErrorContext(&e)))?;
        Ok(())
    }
}

fn store_error(action: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::StateStoreError {
        message: format!("Failed to {}: {}", action, e),
    }
}

fn state_to_item(state: &SyncState) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            KEY_ATTRIBUTE.to_string(),
            AttributeValue::S(state.sync_id.clone()),
        ),
        (
            "last_sync_timestamp".to_string(),
            AttributeValue::S(state.last_sync_timestamp.to_rfc3339()),
        ),
        (
            "last_sync_date".to_string(),
            AttributeValue::S(state.last_sync_date.clone()),
        ),
        (
            "records_processed".to_string(),
            AttributeValue::N(state.records_processed.to_string()),
        ),
        (
            "records_successful".to_string(),
            AttributeValue::N(state.records_successful.to_string()),
        ),
        (
            "records_failed".to_string(),
            AttributeValue::N(state.records_failed.to_string()),
        ),
        (
            "updated_at".to_string(),
            AttributeValue::S(state.updated_at.to_rfc3339()),
        ),
    ])
}

fn item_to_state(item: &HashMap<String, AttributeValue>) -> Result<SyncState> {
    let string = |name: &str| -> Result<String> {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .ok_or_else(|| SyncError::StateStoreError {
                message: format!("State item is missing {}", name),
            })
    };
    let timestamp = |name: &str| -> Result<DateTime<Utc>> {
        let raw = string(name)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| SyncError::StateStoreError {
                message: format!("Invalid {} '{}': {}", name, raw, e),
            })
    };
    // Counters are informational; tolerate items written without them.
    let count = |name: &str| -> usize {
        item.get(name)
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    };

    let last_sync_timestamp = timestamp("last_sync_timestamp")?;
    Ok(SyncState {
        sync_id: string(KEY_ATTRIBUTE)?,
        last_sync_timestamp,
        last_sync_date: string("last_sync_date")
            .unwrap_or_else(|_| last_sync_timestamp.format("%Y-%m-%d").to_string()),
        records_processed: count("records_processed"),
        records_successful: count("records_successful"),
        records_failed: count("records_failed"),
        updated_at: timestamp("updated_at").unwrap_or(last_sync_timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SyncCounts;
    use chrono::TimeZone;

    #[test]
    fn test_item_conversion_keeps_every_attribute() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let state = SyncState::new(
            "default",
            ts,
            SyncCounts {
                processed: 10,
                successful: 9,
                failed: 1,
            },
        );

        let item = state_to_item(&state);
        assert_eq!(item.len(), 7);
        assert_eq!(
            item.get("records_failed"),
            Some(&AttributeValue::N("1".to_string()))
        );

        let restored = item_to_state(&item).unwrap();
        assert_eq!(restored.sync_id, "default");
        assert_eq!(restored.last_sync_timestamp, ts);
        assert_eq!(restored.last_sync_date, "2024-03-01");
        assert_eq!(restored.records_successful, 9);
    }

    #[test]
    fn test_item_without_timestamp_is_error() {
        let item = HashMap::from([(
            KEY_ATTRIBUTE.to_string(),
            AttributeValue::S("default".to_string()),
        )]);
        assert!(matches!(
            item_to_state(&item).unwrap_err(),
            SyncError::StateStoreError { .. }
        ));
    }
}
