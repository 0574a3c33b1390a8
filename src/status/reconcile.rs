use crate::report::classify::{classify, Verdict};
use crate::report::model::TestReport;
use crate::status::model::{Status, StatusCheckpoint};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

pub const ONE_DAY_MICROS: i64 = 86_400 * 1_000_000;
/// Modules silent for longer than this no longer get inactive warnings.
pub const INACTIVE_CUTOFF_MICROS: i64 = 7 * ONE_DAY_MICROS;

/// Per-pass classification of test cases. Names appear in the order of the
/// latest report, followed by previously failing names it did not list.
#[derive(Serialize, Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusChanges {
    pub failing: Vec<String>,
    pub fixed: Vec<String>,
    pub new_failures: Vec<String>,
    pub continued_failures: Vec<String>,
    pub transient_failures: Vec<String>,
    pub skipped_while_failing: Vec<String>,
}

impl StatusChanges {
    pub fn has_failures(&self) -> bool {
        !self.new_failures.is_empty() || !self.continued_failures.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reconciliation {
    /// Checkpoint to persist. `None` means nothing changed.
    pub checkpoint: Option<StatusCheckpoint>,
    pub changes: StatusChanges,
    /// Newest postsubmit report in the window.
    pub latest: Option<TestReport>,
    /// Set to the last upload time when the inactive warning is due.
    pub inactive_since: Option<i64>,
}

/// `(from_exclusive, to_inclusive)` bounds of the reports to scan.
pub fn scan_window(previous: Option<&StatusCheckpoint>, last_upload: i64) -> (i64, i64) {
    match previous {
        Some(checkpoint) => (checkpoint.status_timestamp, last_upload),
        None => (last_upload.saturating_sub(ONE_DAY_MICROS), last_upload),
    }
}

/// True once a day for a module that stopped uploading between one and seven
/// days ago. `window_micros` should equal the job trigger period.
pub fn inactive_warning_due(last_upload: i64, now: i64, window_micros: i64) -> bool {
    let silence = now.saturating_sub(last_upload);
    silence > ONE_DAY_MICROS
        && silence < INACTIVE_CUTOFF_MICROS
        && silence % ONE_DAY_MICROS < window_micros
}

/// Folds the reports scanned for `module` into the next checkpoint.
///
/// `reports` may arrive in any order and may contain presubmit or malformed
/// entries; only postsubmit reports inside the scan window take part.
pub fn reconcile(
    module: &str,
    previous: Option<&StatusCheckpoint>,
    reports: Vec<TestReport>,
    last_upload: i64,
    now: i64,
    inactive_window_micros: i64,
) -> Reconciliation {
    let (from_exclusive, to_inclusive) = scan_window(previous, last_upload);
    let mut reports: Vec<TestReport> = reports
        .into_iter()
        .filter(|report| {
            report.is_postsubmit()
                && report.start_timestamp > from_exclusive
                && report.start_timestamp <= to_inclusive
        })
        .collect();
    reports.sort_by_key(|report| report.start_timestamp);

    let Some(latest) = reports.last() else {
        let checkpoint = previous
            .filter(|checkpoint| last_upload > checkpoint.status_timestamp)
            .map(|checkpoint| StatusCheckpoint {
                status_timestamp: last_upload,
                ..checkpoint.clone()
            });
        let inactive_since = inactive_warning_due(last_upload, now, inactive_window_micros)
            .then_some(last_upload);
        return Reconciliation {
            checkpoint,
            changes: StatusChanges::default(),
            latest: None,
            inactive_since,
        };
    };

    let empty = BTreeSet::new();
    let previously_failing = previous.map_or(&empty, |checkpoint| &checkpoint.failing_test_cases);

    let mut most_recent: HashMap<&str, Verdict> = HashMap::new();
    let mut ever_failed: HashSet<&str> = HashSet::new();
    for report in &reports {
        for (name, verdict) in classify(report) {
            if verdict == Verdict::Fail {
                ever_failed.insert(name);
            }
            most_recent.insert(name, verdict);
        }
    }
    let transient: BTreeSet<&str> = ever_failed
        .into_iter()
        .filter(|name| most_recent.get(name) != Some(&Verdict::Fail))
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<&str> = vec![];
    for test_case in &latest.test_cases {
        if seen.insert(test_case.name.as_str()) {
            ordered.push(test_case.name.as_str());
        }
    }
    for name in previously_failing {
        if seen.insert(name.as_str()) {
            ordered.push(name.as_str());
        }
    }

    let mut changes = StatusChanges {
        transient_failures: transient.iter().map(|name| name.to_string()).collect(),
        ..StatusChanges::default()
    };
    for name in ordered {
        let was_failing = previously_failing.contains(name);
        match most_recent.get(name) {
            None if was_failing => changes.skipped_while_failing.push(name.to_string()),
            None => {}
            Some(Verdict::Pass) => {
                if was_failing && !transient.contains(name) {
                    changes.fixed.push(name.to_string());
                }
            }
            Some(Verdict::Fail) => {
                changes.failing.push(name.to_string());
                if was_failing {
                    changes.continued_failures.push(name.to_string());
                } else {
                    changes.new_failures.push(name.to_string());
                }
            }
        }
    }

    let latest_verdicts = classify(latest);
    let pass_count = latest_verdicts
        .values()
        .filter(|verdict| **verdict == Verdict::Pass)
        .count();
    let fail_count = latest_verdicts.len() - pass_count;

    let failing_test_cases: BTreeSet<String> = changes
        .failing
        .iter()
        .chain(changes.skipped_while_failing.iter())
        .cloned()
        .collect();
    let status = if changes.has_failures() {
        Status::Failing
    } else {
        Status::Ok
    };
    let status_timestamp = previous.map_or(last_upload, |checkpoint| {
        checkpoint.status_timestamp.max(last_upload)
    });

    Reconciliation {
        checkpoint: Some(StatusCheckpoint {
            module: module.to_string(),
            status_timestamp,
            status,
            failing_test_cases,
            pass_count,
            fail_count,
        }),
        changes,
        latest: Some(latest.clone()),
        inactive_since: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::{DeviceInfo, TestCase, TestCaseResult};

    const WINDOW: i64 = 180 * 1_000_000;
    const MODULE: &str = "VtsHalNfcV1_0Target";

    fn report(timestamp: i64, cases: &[(&str, TestCaseResult)]) -> TestReport {
        TestReport::builder()
            .module(MODULE)
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

    fn failing_checkpoint(timestamp: i64, names: &[&str]) -> StatusCheckpoint {
        StatusCheckpoint::builder()
            .module(MODULE)
            .status_timestamp(timestamp)
            .status(Status::Failing)
            .failing_test_cases(names.iter().map(|name| name.to_string()).collect())
            .build()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn first_failure_without_checkpoint_is_new() {
        let result = reconcile(
            MODULE,
            None,
            vec![report(100, &[("X", TestCaseResult::Fail)])],
            100,
            100,
            WINDOW,
        );
        let checkpoint = result.checkpoint.unwrap();
        assert_eq!(checkpoint.status, Status::Failing);
        assert_eq!(checkpoint.failing_test_cases, BTreeSet::from(["X".to_string()]));
        assert_eq!(checkpoint.status_timestamp, 100);
        assert_eq!(result.changes.new_failures, names(&["X"]));
        assert!(result.changes.continued_failures.is_empty());
    }

    #[test]
    fn passing_after_failure_is_fixed() {
        let previous = failing_checkpoint(100, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![report(200, &[("X", TestCaseResult::Pass)])],
            200,
            200,
            WINDOW,
        );
        let checkpoint = result.checkpoint.unwrap();
        assert_eq!(result.changes.fixed, names(&["X"]));
        assert_eq!(checkpoint.status, Status::Ok);
        assert!(checkpoint.failing_test_cases.is_empty());
        assert_eq!(checkpoint.pass_count, 1);
    }

    #[test]
    fn fail_then_pass_inside_window_is_transient_not_fixed() {
        let previous = failing_checkpoint(100, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![
                report(200, &[("X", TestCaseResult::Pass)]),
                report(150, &[("X", TestCaseResult::Fail)]),
            ],
            200,
            200,
            WINDOW,
        );
        assert_eq!(result.changes.transient_failures, names(&["X"]));
        assert!(result.changes.fixed.is_empty());
        assert_eq!(result.checkpoint.unwrap().status, Status::Ok);
    }

    #[test]
    fn missing_from_latest_report_stays_failing() {
        let previous = failing_checkpoint(100, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![report(200, &[("Y", TestCaseResult::Pass)])],
            200,
            200,
            WINDOW,
        );
        assert_eq!(result.changes.skipped_while_failing, names(&["X"]));
        assert!(result.changes.fixed.is_empty());
        let checkpoint = result.checkpoint.unwrap();
        assert!(checkpoint.failing_test_cases.contains("X"));
    }

    #[test]
    fn explicitly_skipped_case_stays_failing() {
        let previous = failing_checkpoint(100, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![report(200, &[("X", TestCaseResult::Skip)])],
            200,
            200,
            WINDOW,
        );
        assert_eq!(result.changes.skipped_while_failing, names(&["X"]));
    }

    #[test]
    fn repeated_failure_is_continued() {
        let previous = failing_checkpoint(100, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![report(
                200,
                &[("X", TestCaseResult::Fail), ("Y", TestCaseResult::Fail)],
            )],
            200,
            200,
            WINDOW,
        );
        assert_eq!(result.changes.continued_failures, names(&["X"]));
        assert_eq!(result.changes.new_failures, names(&["Y"]));
        assert_eq!(result.changes.failing, names(&["X", "Y"]));
        assert_eq!(result.checkpoint.unwrap().fail_count, 2);
    }

    #[test]
    fn presubmit_reports_do_not_count() {
        let mut presubmit = report(200, &[("X", TestCaseResult::Fail)]);
        presubmit.build_id = "P4600000".to_string();
        let previous = StatusCheckpoint::builder()
            .module(MODULE)
            .status_timestamp(100)
            .status(Status::Ok)
            .build();
        let result = reconcile(MODULE, Some(&previous), vec![presubmit], 200, 200, WINDOW);
        assert_eq!(result.changes, StatusChanges::default());
        let checkpoint = result.checkpoint.unwrap();
        assert_eq!(checkpoint.status, Status::Ok);
        assert_eq!(checkpoint.status_timestamp, 200);
    }

    #[test]
    fn reports_outside_window_are_ignored() {
        let previous = failing_checkpoint(100, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![
                report(90, &[("X", TestCaseResult::Fail)]),
                report(200, &[("X", TestCaseResult::Pass)]),
            ],
            200,
            200,
            WINDOW,
        );
        assert_eq!(result.changes.fixed, names(&["X"]));
        assert!(result.changes.transient_failures.is_empty());
    }

    #[test]
    fn no_op_pass_changes_nothing() {
        let previous = failing_checkpoint(200, &["X"]);
        let first = reconcile(MODULE, Some(&previous), vec![], 200, 300, WINDOW);
        let second = reconcile(MODULE, Some(&previous), vec![], 200, 400, WINDOW);
        assert_eq!(first.checkpoint, None);
        assert_eq!(first, second);
        assert_eq!(first.inactive_since, None);
    }

    #[test]
    fn checkpoint_timestamp_never_moves_back() {
        let previous = failing_checkpoint(500, &["X"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![report(400, &[("X", TestCaseResult::Pass)])],
            400,
            600,
            WINDOW,
        );
        if let Some(checkpoint) = result.checkpoint {
            assert!(checkpoint.status_timestamp >= 500);
        }
    }

    #[test]
    fn each_name_lands_in_at_most_one_class() {
        let previous = failing_checkpoint(100, &["A", "B", "C", "D"]);
        let result = reconcile(
            MODULE,
            Some(&previous),
            vec![
                report(
                    150,
                    &[
                        ("A", TestCaseResult::Fail),
                        ("E", TestCaseResult::Fail),
                        ("F", TestCaseResult::Pass),
                    ],
                ),
                report(
                    200,
                    &[
                        ("A", TestCaseResult::Pass),
                        ("B", TestCaseResult::Pass),
                        ("C", TestCaseResult::Fail),
                        ("E", TestCaseResult::Pass),
                        ("F", TestCaseResult::Fail),
                    ],
                ),
            ],
            200,
            200,
            WINDOW,
        );
        let changes = &result.changes;
        let classes = [
            &changes.new_failures,
            &changes.continued_failures,
            &changes.transient_failures,
            &changes.skipped_while_failing,
            &changes.fixed,
        ];
        for name in ["A", "B", "C", "D", "E", "F"] {
            let hits = classes
                .iter()
                .filter(|class| class.iter().any(|n| n == name))
                .count();
            assert!(hits <= 1, "{} classified {} times", name, hits);
        }
        assert_eq!(changes.transient_failures, names(&["A", "E"]));
        assert_eq!(changes.fixed, names(&["B"]));
        assert_eq!(changes.continued_failures, names(&["C"]));
        assert_eq!(changes.new_failures, names(&["F"]));
        assert_eq!(changes.skipped_while_failing, names(&["D"]));
    }

    #[test]
    fn inactive_warning_fires_once_per_day() {
        let last_upload = 1_000 * ONE_DAY_MICROS;
        let two_days_later = last_upload + 2 * ONE_DAY_MICROS;
        let tick = WINDOW;
        let firing: Vec<i64> = (0..(ONE_DAY_MICROS / tick))
            .map(|i| two_days_later + i * tick)
            .filter(|now| inactive_warning_due(last_upload, *now, WINDOW))
            .collect();
        assert_eq!(firing, vec![two_days_later]);
    }

    #[test]
    fn inactive_warning_stops_after_a_week() {
        let last_upload = 0;
        assert!(!inactive_warning_due(last_upload, 8 * ONE_DAY_MICROS, WINDOW));
        assert!(!inactive_warning_due(last_upload, ONE_DAY_MICROS / 2, WINDOW));
        assert!(inactive_warning_due(last_upload, 3 * ONE_DAY_MICROS + 10, WINDOW));
    }

    #[test]
    fn empty_window_reports_inactive_module() {
        let previous = failing_checkpoint(100, &["X"]);
        let now = 100 + 2 * ONE_DAY_MICROS;
        let result = reconcile(MODULE, Some(&previous), vec![], 100, now, WINDOW);
        assert_eq!(result.inactive_since, Some(100));
        assert_eq!(result.checkpoint, None);
    }
}
