use bon::Builder;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Builder)]
pub struct Subscription {
    #[builder(into)]
    pub module: String,
    #[builder(into)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}
