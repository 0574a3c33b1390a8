use crate::api::AppError;
use crate::persistence::repo::{number_key, string_key, PutCondition, Table};
use crate::status::model::StatusCheckpoint;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CheckpointOperations {
    pub(crate) client: Arc<Client>,
}

pub(crate) struct CheckpointsTable();

impl Table<StatusCheckpoint> for CheckpointsTable {
    fn table_name() -> String {
        "status_checkpoints".to_string()
    }

    fn partition_key_name() -> String {
        "module".to_string()
    }

    fn partition_key_from_entity(entity: &StatusCheckpoint) -> AttributeValue {
        string_key(&entity.module)
    }
}

impl CheckpointOperations {
    pub async fn get(&self, module: &str) -> Result<Option<StatusCheckpoint>, AppError> {
        CheckpointsTable::get_item(self.client.clone(), string_key(module), None).await
    }

    /// Writes `checkpoint` only if the stored one still carries the
    /// `status_timestamp` of `expected` (or is still absent when `expected`
    /// is `None`). Returns whether the write happened.
    pub async fn compare_and_set(
        &self,
        expected: Option<&StatusCheckpoint>,
        checkpoint: &StatusCheckpoint,
    ) -> Result<bool, AppError> {
        let condition = write_condition(expected);
        CheckpointsTable::put_item_if(self.client.clone(), checkpoint, condition).await
    }
}

fn write_condition(expected: Option<&StatusCheckpoint>) -> PutCondition {
    match expected {
        None => PutCondition {
            expression: "attribute_not_exists(#pk)".to_string(),
            names: HashMap::from([("#pk".to_string(), CheckpointsTable::partition_key_name())]),
            values: HashMap::new(),
        },
        Some(prior) => PutCondition {
            expression: "#ts = :expected".to_string(),
            names: HashMap::from([("#ts".to_string(), "status_timestamp".to_string())]),
            values: HashMap::from([(
                ":expected".to_string(),
                number_key(prior.status_timestamp),
            )]),
        },
    }
}
