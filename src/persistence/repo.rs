use crate::api::AppError;
use crate::persistence::model::{PageKey, QueryResult};
use crate::report::service::ReportOperations;
use crate::status::service::CheckpointOperations;
use crate::subscription::service::SubscriptionOperations;
use crate::test_module::service::TestModuleOperations;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::query::builders::QueryFluentBuilder;
use aws_sdk_dynamodb::operation::query::{QueryError, QueryOutput};
use aws_sdk_dynamodb::operation::update_item::builders::UpdateItemFluentBuilder;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_dynamo::aws_sdk_dynamodb_1::to_item;
use serde_dynamo::from_item;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type Item = HashMap<String, AttributeValue>;

/// Condition attached to a put. The put is rejected by the table when the
/// expression evaluates to false for the stored item.
pub(crate) struct PutCondition {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

pub(crate) trait Table<T>
where
    T: DeserializeOwned + Serialize + Clone + Send + Sync,
{
    fn table_name() -> String;
    fn partition_key_name() -> String;

    fn sort_key_name() -> Option<String> {
        None
    }

    fn partition_key_from_entity(entity: &T) -> AttributeValue;

    fn sort_key_from_entity(_entity: &T) -> Option<AttributeValue> {
        None
    }

    fn unique_key(partition_key: AttributeValue, sort_key: Option<AttributeValue>) -> Item {
        let mut key = HashMap::from([(Self::partition_key_name(), partition_key)]);
        if let (Some(name), Some(value)) = (Self::sort_key_name(), sort_key) {
            key.insert(name, value);
        }
        key
    }

    fn decode(item: Item) -> Result<T, AppError> {
        from_item(item).map_err(|e| {
            AppError::Store(format!("undecodable item in {}: {}", Self::table_name(), e))
        })
    }

    fn encode(entity: &T) -> Result<Item, AppError> {
        let mut item = to_item(entity).map_err(|e| {
            AppError::Internal(format!("unencodable item for {}: {}", Self::table_name(), e))
        })?;
        Self::add_main_key_attributes(entity, &mut item);
        Ok(item)
    }

    async fn get_item(
        client: Arc<Client>,
        partition_key: AttributeValue,
        sort_key: Option<AttributeValue>,
    ) -> Result<Option<T>, AppError> {
        let output = client
            .get_item()
            .table_name(Self::table_name())
            .set_key(Some(Self::unique_key(partition_key, sort_key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| AppError::Store(e.into_service_error().to_string()))?;
        output.item.map(Self::decode).transpose()
    }

    async fn put_item(client: Arc<Client>, entity: T) -> Result<T, AppError> {
        let item = Self::encode(&entity)?;
        client
            .put_item()
            .table_name(Self::table_name())
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| AppError::Store(e.into_service_error().to_string()))?;
        Ok(entity)
    }

    /// Returns `Ok(false)` when the table rejected the write because the
    /// condition did not hold.
    async fn put_item_if(
        client: Arc<Client>,
        entity: &T,
        condition: PutCondition,
    ) -> Result<bool, AppError> {
        let item = Self::encode(entity)?;
        let values = if condition.values.is_empty() {
            None
        } else {
            Some(condition.values)
        };
        let result = client
            .put_item()
            .table_name(Self::table_name())
            .set_item(Some(item))
            .condition_expression(condition.expression)
            .set_expression_attribute_names(Some(condition.names))
            .set_expression_attribute_values(values)
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    Ok(false)
                } else {
                    Err(AppError::Store(service_error.to_string()))
                }
            }
        }
    }

    async fn delete_item(
        client: Arc<Client>,
        partition_key: AttributeValue,
        sort_key: Option<AttributeValue>,
    ) -> Result<Option<T>, AppError> {
        let output = client
            .delete_item()
            .table_name(Self::table_name())
            .set_key(Some(Self::unique_key(partition_key, sort_key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| AppError::Store(e.into_service_error().to_string()))?;
        output.attributes.map(Self::decode).transpose()
    }

    fn query_builder(client: Arc<Client>) -> QueryFluentBuilder {
        client.query().table_name(Self::table_name())
    }

    fn update_builder(client: Arc<Client>) -> UpdateItemFluentBuilder {
        client.update_item().table_name(Self::table_name())
    }

    fn from_query_result(
        result: Result<QueryOutput, SdkError<QueryError, HttpResponse>>,
    ) -> Result<QueryResult<T>, AppError> {
        let output = result.map_err(|e| AppError::Store(e.into_service_error().to_string()))?;
        let items = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<T>, AppError>>()?;
        let next_page_key = match output.last_evaluated_key {
            Some(last_key) => Some(PageKey::from_attribute_values(last_key).to_next_page_key()?),
            None => None,
        };
        Ok(QueryResult {
            items,
            next_page_key,
        })
    }

    async fn list_items(
        client: Arc<Client>,
        partition_key: AttributeValue,
        next_page_key: Option<String>,
    ) -> Result<QueryResult<T>, AppError> {
        let start_key = match next_page_key {
            Some(next) => Some(PageKey::from_next_page_key(&next)?.to_attribute_values()),
            None => None,
        };
        let result = Self::query_builder(client)
            .expression_attribute_names("#pk", Self::partition_key_name())
            .expression_attribute_values(":pk", partition_key)
            .key_condition_expression("#pk = :pk")
            .set_exclusive_start_key(start_key)
            .send()
            .await;
        Self::from_query_result(result)
    }

    /// Follows `LastEvaluatedKey` until the query is exhausted.
    async fn query_all<F>(client: Arc<Client>, build: F) -> Result<Vec<T>, AppError>
    where
        F: Fn(QueryFluentBuilder) -> QueryFluentBuilder + Send + Sync,
    {
        let mut items: Vec<T> = vec![];
        let mut start_key: Option<Item> = None;
        loop {
            let output = build(Self::query_builder(client.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| AppError::Store(e.into_service_error().to_string()))?;
            for item in output.items.unwrap_or_default() {
                items.push(Self::decode(item)?);
            }
            match output.last_evaluated_key {
                Some(last_key) => start_key = Some(last_key),
                None => break,
            }
        }
        Ok(items)
    }

    async fn scan_all(client: Arc<Client>) -> Result<Vec<T>, AppError> {
        let mut items: Vec<T> = vec![];
        let mut start_key: Option<Item> = None;
        loop {
            let output = client
                .scan()
                .table_name(Self::table_name())
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| AppError::Store(e.into_service_error().to_string()))?;
            for item in output.items.unwrap_or_default() {
                items.push(Self::decode(item)?);
            }
            match output.last_evaluated_key {
                Some(last_key) => start_key = Some(last_key),
                None => break,
            }
        }
        Ok(items)
    }

    fn add_main_key_attributes(entity: &T, item: &mut Item) {
        item.insert(
            Self::partition_key_name(),
            Self::partition_key_from_entity(entity),
        );
        if let (Some(name), Some(value)) = (Self::sort_key_name(), Self::sort_key_from_entity(entity))
        {
            item.insert(name, value);
        }
    }
}

#[derive(Clone)]
pub struct Repository {
    client: Arc<Client>,
}

impl Repository {
    pub async fn new() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Repository {
            client: Arc::new(Client::new(&config)),
        }
    }

    pub fn reports(&self) -> ReportOperations {
        ReportOperations {
            client: Arc::clone(&self.client),
        }
    }

    pub fn checkpoints(&self) -> CheckpointOperations {
        CheckpointOperations {
            client: Arc::clone(&self.client),
        }
    }

    pub fn modules(&self) -> TestModuleOperations {
        TestModuleOperations {
            client: Arc::clone(&self.client),
        }
    }

    pub fn subscriptions(&self) -> SubscriptionOperations {
        SubscriptionOperations {
            client: Arc::clone(&self.client),
        }
    }
}

pub(crate) fn string_key(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

pub(crate) fn number_key(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}
