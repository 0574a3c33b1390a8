use crate::config::NotificationConfig;
use crate::notification::model::{EmailMessage, NotificationKind};
use crate::status::reconcile::Reconciliation;
use aws_sdk_dynamodb::primitives::{DateTime, DateTimeFormat};
use regex::Regex;
use reqwest::Url;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::warn;
use uuid::Uuid;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@([A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)+)$")
            .expect("email pattern is valid")
    })
}

/// Syntactic check shared by the subscription API and recipient resolution.
pub fn is_valid_email(address: &str) -> bool {
    email_pattern().is_match(address)
}

/// First matching template wins; the classification sets overlap, so the
/// order matters.
pub fn select(reconciliation: &Reconciliation) -> Option<NotificationKind> {
    let changes = &reconciliation.changes;
    if !changes.new_failures.is_empty() {
        Some(NotificationKind::NewFailures)
    } else if !changes.continued_failures.is_empty() {
        Some(NotificationKind::ContinuedFailures)
    } else if !changes.transient_failures.is_empty() {
        Some(NotificationKind::TransientFailures)
    } else if !changes.fixed.is_empty() {
        Some(NotificationKind::AllPassing)
    } else if reconciliation.inactive_since.is_some() {
        Some(NotificationKind::Inactive)
    } else {
        None
    }
}

/// Subscribers plus the default address, keeping only well-formed addresses
/// in the allowed domain.
pub fn resolve_recipients<I>(subscribers: I, config: &NotificationConfig) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    subscribers
        .into_iter()
        .chain(config.default_email.clone())
        .map(|address| address.trim().to_string())
        .filter(|address| {
            let allowed = email_pattern()
                .captures(address)
                .and_then(|captures| captures.get(1))
                .is_some_and(|domain| {
                    domain.as_str().eq_ignore_ascii_case(config.email_domain.trim())
                });
            if !allowed {
                warn!(address = %address, "skipping recipient outside allowed domain");
            }
            allowed
        })
        .collect()
}

pub fn compose(
    module: &str,
    reconciliation: &Reconciliation,
    kind: NotificationKind,
    recipients: BTreeSet<String>,
    config: &NotificationConfig,
) -> EmailMessage {
    let changes = &reconciliation.changes;
    let build = reconciliation
        .latest
        .as_ref()
        .map_or("unknown", |report| report.build_id.as_str());
    let mut subject_parts: Vec<String> = vec![];
    if !config.subject_prefix.is_empty() {
        subject_parts.push(config.subject_prefix.clone());
    }
    if let Some((branch, target)) = reconciliation
        .latest
        .as_ref()
        .and_then(|report| report.branch_and_target())
    {
        subject_parts.push(format!("[{}]", branch));
        subject_parts.push(format!("({})", target));
    }
    let module_html = escape_html(module);
    let build_html = escape_html(build);

    let (headline, body) = match kind {
        NotificationKind::NewFailures | NotificationKind::ContinuedFailures => {
            let headline = if kind == NotificationKind::NewFailures {
                "New test failures in"
            } else {
                "Continued test failures in"
            };
            let mut body = format!(
                "Hello,<br><br>Test cases are failing in {} for device build ID {}.<br><br>",
                module_html, build_html
            );
            for name in &changes.new_failures {
                body.push_str(&format!("<b>{}</b><br>", escape_html(name)));
            }
            for name in &changes.continued_failures {
                body.push_str(&format!("{}<br>", escape_html(name)));
            }
            (headline, body)
        }
        NotificationKind::TransientFailures => {
            let mut body = format!(
                "Hello,<br><br>Some test cases failed in {} but tests all passed in the \
                 most recent device build ({}).<br><br>Transient failures:<br>",
                module_html, build_html
            );
            for name in &changes.transient_failures {
                body.push_str(&format!("{}<br>", escape_html(name)));
            }
            ("Transient test failure in", body)
        }
        NotificationKind::AllPassing => {
            let mut body = format!(
                "Hello,<br><br>All test cases passed in {} for device build ID {}!<br><br>Fixed:<br>",
                module_html, build_html
            );
            for name in &changes.fixed {
                body.push_str(&format!("{}<br>", escape_html(name)));
            }
            ("All test cases passing in", body)
        }
        NotificationKind::Inactive => {
            let last_upload = reconciliation
                .inactive_since
                .map_or_else(|| "an unknown time".to_string(), format_timestamp);
            let body = format!(
                "Hello,<br><br>Test {} is not running on any device builds. \
                 Last results were processed on {}.<br>",
                module_html, last_upload
            );
            ("Warning: inactive test", body)
        }
    };
    if kind == NotificationKind::Inactive {
        subject_parts.push(format!("{} {}", headline, module));
    } else {
        subject_parts.push(format!("{} {} @ {}", headline, module, build));
    }

    let link = dashboard_link(&config.dashboard_url, module);
    let html_body = format!(
        "{}<br>For details, visit the <a href=\"{}\">VTS dashboard.</a>",
        body,
        escape_html(&link)
    );

    EmailMessage {
        id: Uuid::new_v4().to_string(),
        kind,
        recipients,
        subject: subject_parts.join(" "),
        html_body,
    }
}

fn dashboard_link(dashboard_url: &str, module: &str) -> String {
    let table = format!("{}/show_table", dashboard_url.trim_end_matches('/'));
    match Url::parse(&table) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("testName", module);
            url.to_string()
        }
        Err(e) => {
            warn!(url = %dashboard_url, error = %e, "dashboard url does not parse");
            table
        }
    }
}

fn format_timestamp(micros: i64) -> String {
    DateTime::from_millis(micros / 1_000)
        .fmt(DateTimeFormat::DateTime)
        .unwrap_or_else(|_| micros.to_string())
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
