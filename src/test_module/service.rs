use crate::api::AppError;
use crate::persistence::repo::{number_key, string_key, Table};
use crate::test_module::model::TestModule;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::sync::Arc;
use tracing::debug;

pub struct TestModuleOperations {
    pub(crate) client: Arc<Client>,
}

pub(crate) struct TestModulesTable();

impl Table<TestModule> for TestModulesTable {
    fn table_name() -> String {
        "test_modules".to_string()
    }

    fn partition_key_name() -> String {
        "name".to_string()
    }

    fn partition_key_from_entity(entity: &TestModule) -> AttributeValue {
        string_key(&entity.name)
    }
}

impl TestModuleOperations {
    pub async fn list(&self) -> Result<Vec<TestModule>, AppError> {
        TestModulesTable::scan_all(self.client.clone()).await
    }

    /// Moves the module's upload horizon forward to `timestamp`. Older
    /// timestamps leave the record untouched.
    pub async fn record_upload(&self, name: &str, timestamp: i64) -> Result<(), AppError> {
        let result = TestModulesTable::update_builder(self.client.clone())
            .set_key(Some(TestModulesTable::unique_key(string_key(name), None)))
            .expression_attribute_names("#lu", "last_upload_timestamp")
            .expression_attribute_values(":lu", number_key(timestamp))
            .update_expression("SET #lu = :lu")
            .condition_expression("attribute_not_exists(#lu) OR #lu < :lu")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    debug!(module = %name, timestamp, "upload horizon already newer");
                    Ok(())
                } else {
                    Err(AppError::Store(service_error.to_string()))
                }
            }
        }
    }
}
