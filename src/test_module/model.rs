use bon::Builder;
use serde::{Deserialize, Serialize};

/// Registry entry for a test module, maintained by the upload path.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Builder)]
pub struct TestModule {
    #[builder(into)]
    pub name: String,
    /// Largest `start_timestamp` ever uploaded for the module, in microseconds.
    pub last_upload_timestamp: i64,
}
