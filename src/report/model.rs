use bon::Builder;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestCaseResult {
    Pass,
    Fail,
    Skip,
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Builder)]
pub struct TestCase {
    #[builder(into)]
    pub name: String,
    pub result: TestCaseResult,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Builder)]
pub struct DeviceInfo {
    #[builder(into)]
    pub branch: String,
    #[builder(into)]
    pub build_flavor: String,
    #[builder(into)]
    pub build_id: String,
}

/// One run of one test module against one build. Immutable once stored.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Builder)]
pub struct TestReport {
    #[builder(into)]
    pub module: String,
    #[builder(into)]
    pub build_id: String,
    /// Microseconds since epoch.
    pub start_timestamp: i64,
    #[builder(default)]
    pub devices: Vec<DeviceInfo>,
    #[builder(default)]
    pub test_cases: Vec<TestCase>,
}

impl TestReport {
    /// Postsubmit reports carry a plain integer build id and at least one device.
    pub fn is_postsubmit(&self) -> bool {
        !self.devices.is_empty()
            && !self.build_id.is_empty()
            && self.build_id.trim().parse::<i64>().is_ok()
    }

    pub fn branch_and_target(&self) -> Option<(&str, &str)> {
        self.devices
            .first()
            .map(|device| (device.branch.as_str(), device.build_flavor.as_str()))
    }
}
