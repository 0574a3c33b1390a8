use crate::api::AppError;
use crate::persistence::repo::{number_key, string_key, Table};
use crate::report::model::TestReport;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::sync::Arc;

pub struct ReportOperations {
    pub(crate) client: Arc<Client>,
}

pub(crate) struct ReportsTable();

impl Table<TestReport> for ReportsTable {
    fn table_name() -> String {
        "test_reports".to_string()
    }

    fn partition_key_name() -> String {
        "module".to_string()
    }

    fn sort_key_name() -> Option<String> {
        Some("start_timestamp".to_string())
    }

    fn partition_key_from_entity(entity: &TestReport) -> AttributeValue {
        string_key(&entity.module)
    }

    fn sort_key_from_entity(entity: &TestReport) -> Option<AttributeValue> {
        Some(number_key(entity.start_timestamp))
    }
}

impl ReportOperations {
    pub async fn create(&self, report: TestReport) -> Result<TestReport, AppError> {
        ReportsTable::put_item(self.client.clone(), report).await
    }

    /// Reports of `module` with `from_exclusive < start_timestamp <= to_inclusive`,
    /// oldest first.
    pub async fn scan(
        &self,
        module: &str,
        from_exclusive: i64,
        to_inclusive: i64,
    ) -> Result<Vec<TestReport>, AppError> {
        if to_inclusive <= from_exclusive {
            return Ok(vec![]);
        }
        let module = module.to_string();
        ReportsTable::query_all(self.client.clone(), move |builder| {
            builder
                .consistent_read(true)
                .scan_index_forward(true)
                .expression_attribute_names("#pk", ReportsTable::partition_key_name())
                .expression_attribute_names("#sk", "start_timestamp")
                .expression_attribute_values(":pk", string_key(&module))
                .expression_attribute_values(":from", number_key(from_exclusive.saturating_add(1)))
                .expression_attribute_values(":to", number_key(to_inclusive))
                .key_condition_expression("#pk = :pk AND #sk BETWEEN :from AND :to")
        })
        .await
    }
}
