//! In-memory collaborators for exercising the alert job without DynamoDB or
//! a mail relay.

use crate::api::AppError;
use crate::config::Config;
use crate::job::store::{ReportStore, SubscriberDirectory};
use crate::notification::mailer::Mailer;
use crate::notification::model::EmailMessage;
use crate::report::model::{DeviceInfo, TestCase, TestCaseResult, TestReport};
use crate::status::model::{Status, StatusCheckpoint};
use crate::test_module::model::TestModule;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.notification.default_email = Some("vts-alerts@example.com".to_string());
    config.notification.email_domain = "example.com".to_string();
    config
}

pub fn report(module: &str, timestamp: i64, cases: &[(&str, TestCaseResult)]) -> TestReport {
    TestReport::builder()
        .module(module)
        .build_id("4600000")
        .start_timestamp(timestamp)
        .devices(vec![DeviceInfo::builder()
            .branch("main")
            .build_flavor("walleye-userdebug")
            .build_id("4600000")
            .build()])
        .test_cases(
            cases
                .iter()
                .map(|(name, result)| TestCase::builder().name(*name).result(*result).build())
                .collect(),
        )
        .build()
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    modules: BTreeMap<String, TestModule>,
    reports: Vec<TestReport>,
    checkpoints: HashMap<String, StatusCheckpoint>,
    subscribers: HashMap<String, BTreeSet<String>>,
    unavailable: HashSet<String>,
    racing: HashSet<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload(&self, report: TestReport) {
        let mut inner = self.inner.lock().unwrap();
        let module = inner
            .modules
            .entry(report.module.clone())
            .or_insert_with(|| TestModule {
                name: report.module.clone(),
                last_upload_timestamp: report.start_timestamp,
            });
        module.last_upload_timestamp = module.last_upload_timestamp.max(report.start_timestamp);
        inner.reports.push(report);
    }

    pub fn subscribe(&self, module: &str, email: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .entry(module.to_string())
            .or_default()
            .insert(email.to_string());
    }

    pub fn checkpoint(&self, module: &str) -> Option<StatusCheckpoint> {
        self.inner.lock().unwrap().checkpoints.get(module).cloned()
    }

    /// Reads for `module` fail from now on.
    pub fn make_unavailable(&self, module: &str) {
        self.inner.lock().unwrap().unavailable.insert(module.to_string());
    }

    /// The next checkpoint write for `module` finds that another pass got
    /// there first.
    pub fn interfere_before_write(&self, module: &str) {
        self.inner.lock().unwrap().racing.insert(module.to_string());
    }

    fn check_available(inner: &Inner, module: &str) -> Result<(), AppError> {
        if inner.unavailable.contains(module) {
            Err(AppError::Store(format!("{} is unreachable", module)))
        } else {
            Ok(())
        }
    }
}

impl ReportStore for InMemoryStore {
    async fn list_modules(&self) -> Result<Vec<TestModule>, AppError> {
        Ok(self.inner.lock().unwrap().modules.values().cloned().collect())
    }

    async fn scan_reports(
        &self,
        module: &str,
        from_exclusive: i64,
        to_inclusive: i64,
    ) -> Result<Vec<TestReport>, AppError> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner, module)?;
        // Newest first, so callers cannot rely on store order.
        let mut reports: Vec<TestReport> = inner
            .reports
            .iter()
            .filter(|r| {
                r.module == module
                    && r.start_timestamp > from_exclusive
                    && r.start_timestamp <= to_inclusive
            })
            .cloned()
            .collect();
        reports.sort_by_key(|r| std::cmp::Reverse(r.start_timestamp));
        Ok(reports)
    }

    async fn get_checkpoint(&self, module: &str) -> Result<Option<StatusCheckpoint>, AppError> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner, module)?;
        Ok(inner.checkpoints.get(module).cloned())
    }

    async fn compare_and_set_checkpoint(
        &self,
        expected: Option<&StatusCheckpoint>,
        checkpoint: &StatusCheckpoint,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.racing.remove(&checkpoint.module) {
            let competing = StatusCheckpoint {
                status_timestamp: checkpoint.status_timestamp + 1,
                status: Status::Ok,
                ..checkpoint.clone()
            };
            inner.checkpoints.insert(checkpoint.module.clone(), competing);
        }
        let stored = inner
            .checkpoints
            .get(&checkpoint.module)
            .map(|c| c.status_timestamp);
        let unchanged = stored == expected.map(|c| c.status_timestamp);
        if !unchanged || stored.is_some_and(|ts| checkpoint.status_timestamp < ts) {
            return Ok(false);
        }
        inner
            .checkpoints
            .insert(checkpoint.module.clone(), checkpoint.clone());
        Ok(true)
    }
}

impl SubscriberDirectory for InMemoryStore {
    async fn subscribers(&self, module: &str) -> Result<BTreeSet<String>, AppError> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner, module)?;
        Ok(inner.subscribers.get(module).cloned().unwrap_or_default())
    }
}

/// Records delivered mail; recipients in `failing` are refused.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, EmailMessage)>>,
    failing: HashSet<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(vec![]),
            failing: HashSet::from([recipient.to_string()]),
        }
    }

    pub fn sent(&self) -> Vec<(String, EmailMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, message: &EmailMessage) -> Result<(), AppError> {
        if self.failing.contains(recipient) {
            return Err(AppError::Mail(format!("{} bounced", recipient)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.clone()));
        Ok(())
    }
}
