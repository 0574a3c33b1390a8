use crate::api::AppError;
use crate::persistence::repo::Repository;
use crate::report::model::TestReport;
use crate::status::model::StatusCheckpoint;
use crate::test_module::model::TestModule;
use std::collections::BTreeSet;
use std::future::Future;

/// Reports, module registry and checkpoints as seen by the alert job.
pub trait ReportStore: Send + Sync {
    fn list_modules(&self) -> impl Future<Output = Result<Vec<TestModule>, AppError>> + Send;

    /// Reports with `from_exclusive < start_timestamp <= to_inclusive`. Order
    /// is not guaranteed.
    fn scan_reports(
        &self,
        module: &str,
        from_exclusive: i64,
        to_inclusive: i64,
    ) -> impl Future<Output = Result<Vec<TestReport>, AppError>> + Send;

    fn get_checkpoint(
        &self,
        module: &str,
    ) -> impl Future<Output = Result<Option<StatusCheckpoint>, AppError>> + Send;

    /// `Ok(false)` means another pass moved the checkpoint since `expected`
    /// was read.
    fn compare_and_set_checkpoint(
        &self,
        expected: Option<&StatusCheckpoint>,
        checkpoint: &StatusCheckpoint,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

pub trait SubscriberDirectory: Send + Sync {
    fn subscribers(
        &self,
        module: &str,
    ) -> impl Future<Output = Result<BTreeSet<String>, AppError>> + Send;
}

impl ReportStore for Repository {
    async fn list_modules(&self) -> Result<Vec<TestModule>, AppError> {
        self.modules().list().await
    }

    async fn scan_reports(
        &self,
        module: &str,
        from_exclusive: i64,
        to_inclusive: i64,
    ) -> Result<Vec<TestReport>, AppError> {
        self.reports().scan(module, from_exclusive, to_inclusive).await
    }

    async fn get_checkpoint(&self, module: &str) -> Result<Option<StatusCheckpoint>, AppError> {
        self.checkpoints().get(module).await
    }

    async fn compare_and_set_checkpoint(
        &self,
        expected: Option<&StatusCheckpoint>,
        checkpoint: &StatusCheckpoint,
    ) -> Result<bool, AppError> {
        self.checkpoints().compare_and_set(expected, checkpoint).await
    }
}

impl SubscriberDirectory for Repository {
    async fn subscribers(&self, module: &str) -> Result<BTreeSet<String>, AppError> {
        Ok(self
            .subscriptions()
            .list_all(module)
            .await?
            .into_iter()
            .map(|subscription| subscription.email)
            .collect())
    }
}
