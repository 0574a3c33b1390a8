use crate::api::AppError;
use crate::config::Config;
use crate::job::store::{ReportStore, SubscriberDirectory};
use crate::notification::compose::{compose, resolve_recipients, select};
use crate::notification::mailer::Mailer;
use crate::notification::model::{EmailMessage, NotificationKind};
use crate::status::model::Status;
use crate::status::reconcile::{reconcile, scan_window};
use crate::test_module::model::TestModule;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed {
        checkpoint_written: bool,
        status: Option<Status>,
        notification: Option<NotificationKind>,
        delivered: usize,
    },
    /// Another pass advanced the checkpoint first. Nothing was sent.
    RaceLost,
    Aborted {
        reason: String,
    },
}

#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
pub struct ModuleSummary {
    pub module: String,
    #[serde(flatten)]
    pub outcome: PassOutcome,
}

#[derive(Serialize, Clone, Debug)]
pub struct JobSummary {
    pub job_id: String,
    pub modules: Vec<ModuleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mail held back until the module's checkpoint is safely written.
#[derive(Default)]
struct Outbox {
    messages: Vec<EmailMessage>,
}

impl Outbox {
    fn queue(&mut self, message: EmailMessage) {
        self.messages.push(message);
    }

    async fn flush<M: Mailer>(self, mailer: &M) -> usize {
        let mut delivered = 0;
        for message in &self.messages {
            for recipient in &message.recipients {
                match mailer.send(recipient, message).await {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        warn!(to = %recipient, subject = %message.subject, error = %err, "mail not delivered");
                    }
                }
            }
        }
        delivered
    }
}

pub struct AlertJob<S, D, M> {
    store: Arc<S>,
    directory: Arc<D>,
    mailer: Arc<M>,
    config: Arc<Config>,
}

impl<S, D, M> AlertJob<S, D, M>
where
    S: ReportStore,
    D: SubscriberDirectory,
    M: Mailer,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, mailer: Arc<M>, config: Arc<Config>) -> Self {
        Self {
            store,
            directory,
            mailer,
            config,
        }
    }

    /// One pass over every known module. Failures stay local to their module.
    pub async fn run(&self, now: i64) -> JobSummary {
        let job_id = Uuid::new_v4().to_string();
        let span = info_span!("alert_job", job_id = %job_id);
        async move {
            let modules = match self.store.list_modules().await {
                Ok(modules) => modules,
                Err(err) => {
                    error!(error = %err, "could not list test modules");
                    return JobSummary {
                        job_id,
                        modules: vec![],
                        error: Some(err.to_string()),
                    };
                }
            };
            info!(count = modules.len(), "reconciling test modules");
            let parallelism = self.config.job.parallelism.max(1);
            let mut summaries: Vec<ModuleSummary> = stream::iter(modules)
                .map(|module| self.run_module(module, now))
                .buffer_unordered(parallelism)
                .collect()
                .await;
            summaries.sort_by(|a, b| a.module.cmp(&b.module));
            JobSummary {
                job_id,
                modules: summaries,
                error: None,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_module(&self, module: TestModule, now: i64) -> ModuleSummary {
        let outcome = match self.reconcile_module(&module, now).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(module = %module.name, error = %err, "reconciliation pass aborted");
                PassOutcome::Aborted {
                    reason: err.to_string(),
                }
            }
        };
        ModuleSummary {
            module: module.name,
            outcome,
        }
    }

    async fn reconcile_module(&self, module: &TestModule, now: i64) -> Result<PassOutcome, AppError> {
        let previous = self.store.get_checkpoint(&module.name).await?;
        let horizon = module.last_upload_timestamp;
        let (from_exclusive, to_inclusive) = scan_window(previous.as_ref(), horizon);
        let reports = if to_inclusive > from_exclusive {
            self.store
                .scan_reports(&module.name, from_exclusive, to_inclusive)
                .await?
        } else {
            vec![]
        };
        let window_micros = i64::try_from(self.config.job.inactive_window_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1_000_000);
        let reconciliation = reconcile(
            &module.name,
            previous.as_ref(),
            reports,
            horizon,
            now,
            window_micros,
        );

        let mut outbox = Outbox::default();
        let notification = select(&reconciliation);
        if let Some(kind) = notification {
            let subscribers = self.directory.subscribers(&module.name).await?;
            let recipients = resolve_recipients(subscribers, &self.config.notification);
            if recipients.is_empty() {
                warn!(module = %module.name, ?kind, "no recipients for notification");
            } else {
                outbox.queue(compose(
                    &module.name,
                    &reconciliation,
                    kind,
                    recipients,
                    &self.config.notification,
                ));
            }
        }

        let status = reconciliation
            .checkpoint
            .as_ref()
            .map(|checkpoint| checkpoint.status);
        let checkpoint_written = match &reconciliation.checkpoint {
            Some(next) => {
                let written = self
                    .store
                    .compare_and_set_checkpoint(previous.as_ref(), next)
                    .await?;
                if !written {
                    info!(module = %module.name, "checkpoint advanced by another pass, abandoning");
                    return Ok(PassOutcome::RaceLost);
                }
                true
            }
            None => false,
        };

        let delivered = outbox.flush(self.mailer.as_ref()).await;
        info!(
            module = %module.name,
            ?status,
            ?notification,
            checkpoint_written,
            delivered,
            "reconciliation pass finished"
        );
        Ok(PassOutcome::Completed {
            checkpoint_written,
            status,
            notification,
            delivered,
        })
    }
}

pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX))
}

/// Runs the job every `period` until the process exits.
pub fn spawn_ticker<S, D, M>(job: Arc<AlertJob<S, D, M>>, period: Duration) -> JoinHandle<()>
where
    S: ReportStore + 'static,
    D: SubscriberDirectory + 'static,
    M: Mailer + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let summary = job.run(now_micros()).await;
            info!(job_id = %summary.job_id, modules = summary.modules.len(), "scheduled alert job done");
        }
    })
}
