use crate::report::model::{TestCaseResult, TestReport};
use std::collections::HashMap;

/// Verdict of a test case that actually ran.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Maps each test case that ran in `report` to its verdict. Skipped and
/// unknown cases are absent. A later entry for the same name wins.
pub fn classify(report: &TestReport) -> HashMap<&str, Verdict> {
    let mut verdicts = HashMap::new();
    for test_case in &report.test_cases {
        let verdict = match test_case.result {
            TestCaseResult::Pass => Verdict::Pass,
            TestCaseResult::Fail => Verdict::Fail,
            TestCaseResult::Skip | TestCaseResult::Unknown => continue,
        };
        verdicts.insert(test_case.name.as_str(), verdict);
    }
    verdicts
}
