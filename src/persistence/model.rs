use crate::api::AppError;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Opaque pagination cursor, carried between queries as a JSON string.
pub struct PageKey {
    keys: HashMap<String, PageKeyValue>,
}

#[derive(serde::Serialize, serde::Deserialize)]
enum PageKeyValue {
    S(String),
    N(String),
}

impl PageKey {
    pub fn from_attribute_values(values: HashMap<String, AttributeValue>) -> Self {
        let keys = values
            .into_iter()
            .filter_map(|(k, v)| match v {
                AttributeValue::S(s) => Some((k, PageKeyValue::S(s))),
                AttributeValue::N(n) => Some((k, PageKeyValue::N(n))),
                _ => None,
            })
            .collect();
        Self { keys }
    }

    pub fn to_attribute_values(&self) -> HashMap<String, AttributeValue> {
        self.keys
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    PageKeyValue::S(s) => AttributeValue::S(s.clone()),
                    PageKeyValue::N(n) => AttributeValue::N(n.clone()),
                };
                (k.clone(), value)
            })
            .collect()
    }

    pub fn to_next_page_key(&self) -> Result<String, AppError> {
        serde_json::to_string(&self.keys).map_err(|e| AppError::Internal(e.to_string()))
    }

    pub fn from_next_page_key(keys: &str) -> Result<Self, AppError> {
        Ok(Self {
            keys: serde_json::from_str(keys)
                .map_err(|_| AppError::Validation("malformed page key".to_string()))?,
        })
    }
}

#[derive(Clone, Serialize, Debug)]
pub struct QueryResult<T>
where
    T: DeserializeOwned + Serialize + Clone,
{
    pub items: Vec<T>,
    pub next_page_key: Option<String>,
}
