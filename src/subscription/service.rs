use crate::api::AppError;
use crate::persistence::model::QueryResult;
use crate::persistence::repo::{string_key, Table};
use crate::subscription::model::Subscription;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::sync::Arc;

pub struct SubscriptionOperations {
    pub(crate) client: Arc<Client>,
}

pub(crate) struct SubscriptionsTable();

impl Table<Subscription> for SubscriptionsTable {
    fn table_name() -> String {
        "subscriptions".to_string()
    }

    fn partition_key_name() -> String {
        "module".to_string()
    }

    fn sort_key_name() -> Option<String> {
        Some("email".to_string())
    }

    fn partition_key_from_entity(entity: &Subscription) -> AttributeValue {
        string_key(&entity.module)
    }

    fn sort_key_from_entity(entity: &Subscription) -> Option<AttributeValue> {
        Some(string_key(&entity.email))
    }
}

impl SubscriptionOperations {
    pub async fn create(&self, subscription: Subscription) -> Result<Subscription, AppError> {
        SubscriptionsTable::put_item(self.client.clone(), subscription).await
    }

    pub async fn list(
        &self,
        module: &str,
        next_page_key: Option<String>,
    ) -> Result<QueryResult<Subscription>, AppError> {
        SubscriptionsTable::list_items(self.client.clone(), string_key(module), next_page_key).await
    }

    pub async fn list_all(&self, module: &str) -> Result<Vec<Subscription>, AppError> {
        let module = module.to_string();
        SubscriptionsTable::query_all(self.client.clone(), move |builder| {
            builder
                .expression_attribute_names("#pk", SubscriptionsTable::partition_key_name())
                .expression_attribute_values(":pk", string_key(&module))
                .key_condition_expression("#pk = :pk")
        })
        .await
    }

    pub async fn delete(
        &self,
        module: &str,
        email: &str,
    ) -> Result<Option<Subscription>, AppError> {
        SubscriptionsTable::delete_item(
            self.client.clone(),
            string_key(module),
            Some(string_key(email)),
        )
        .await
    }
}
