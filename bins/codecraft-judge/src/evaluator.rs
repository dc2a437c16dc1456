/// Test Evaluator - Language-Agnostic Judging Logic
///
/// **Core Responsibility:**
/// Turn raw execution outcomes into per-test-case statuses and fold them into
/// a verdict status.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about language runtimes
/// - Pure functions: (outcome, expected output, comparator) → result
///
/// **Classification Order (per test case):**
/// 1. Memory limit (oom)
/// 2. Time limit (wall clock or CPU budget)
/// 3. Runtime error (non-zero exit or output over the cap)
/// 4. Output comparison
///
/// **Normalization Rules (exact comparator):**
/// - `\r\n` becomes `\n`
/// - Trailing whitespace on every line is ignored
/// - Trailing blank lines are ignored
/// - Leading whitespace and case are significant

use codecraft_common::types::{
    CaseStatus, Comparator, ComparisonDetail, ExecutionOutcome, TestCase, TestCaseResult,
    VerdictStatus,
};

/// Status of a run that failed before its output could be judged.
pub fn classify(outcome: &ExecutionOutcome) -> Option<CaseStatus> {
    if outcome.oom {
        Some(CaseStatus::MemoryLimitExceeded)
    } else if outcome.timed_out {
        Some(CaseStatus::TimeLimitExceeded)
    } else if outcome.exit_code != Some(0) || outcome.output_truncated {
        Some(CaseStatus::RuntimeError)
    } else {
        None
    }
}

fn normalized_lines(output: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = output
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).trim_end())
        .collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

fn compare_exact(expected: &str, actual: &str) -> ComparisonDetail {
    let expected_lines = normalized_lines(expected);
    let actual_lines = normalized_lines(actual);

    for (i, (e, a)) in expected_lines.iter().zip(actual_lines.iter()).enumerate() {
        if e != a {
            return ComparisonDetail::LineMismatch {
                line: i + 1,
                expected: e.to_string(),
                actual: a.to_string(),
            };
        }
    }

    if expected_lines.len() != actual_lines.len() {
        return ComparisonDetail::LengthMismatch {
            expected: expected_lines.len(),
            actual: actual_lines.len(),
        };
    }
    ComparisonDetail::Matched
}

fn numbers_close(expected: f64, actual: f64, abs_tolerance: f64, rel_tolerance: f64) -> bool {
    let diff = (expected - actual).abs();
    diff <= abs_tolerance || diff <= rel_tolerance * expected.abs()
}

fn tokens_match(expected: &str, actual: &str, abs_tolerance: f64, rel_tolerance: f64) -> bool {
    match (expected.parse::<f64>(), actual.parse::<f64>()) {
        (Ok(e), Ok(a)) if e.is_finite() && a.is_finite() => {
            numbers_close(e, a, abs_tolerance, rel_tolerance)
        }
        _ => expected == actual,
    }
}

fn compare_float(
    expected: &str,
    actual: &str,
    abs_tolerance: f64,
    rel_tolerance: f64,
) -> ComparisonDetail {
    let expected_tokens: Vec<&str> = expected.split_whitespace().collect();
    let actual_tokens: Vec<&str> = actual.split_whitespace().collect();

    for (i, (e, a)) in expected_tokens.iter().zip(actual_tokens.iter()).enumerate() {
        if !tokens_match(e, a, abs_tolerance, rel_tolerance) {
            return ComparisonDetail::TokenMismatch {
                token: i + 1,
                expected: e.to_string(),
                actual: a.to_string(),
            };
        }
    }

    if expected_tokens.len() != actual_tokens.len() {
        return ComparisonDetail::LengthMismatch {
            expected: expected_tokens.len(),
            actual: actual_tokens.len(),
        };
    }
    ComparisonDetail::Matched
}

pub fn compare(comparator: &Comparator, expected: &str, actual: &str) -> ComparisonDetail {
    match *comparator {
        Comparator::Exact => compare_exact(expected, actual),
        Comparator::Float {
            abs_tolerance,
            rel_tolerance,
        } => compare_float(expected, actual, abs_tolerance, rel_tolerance),
    }
}

/// Judge one test case's outcome.
pub fn evaluate_case(
    index: usize,
    test_case: &TestCase,
    outcome: ExecutionOutcome,
    comparator: &Comparator,
) -> TestCaseResult {
    let (status, detail) = match classify(&outcome) {
        Some(failure) => (failure, ComparisonDetail::NotCompared),
        None => {
            let detail = compare(comparator, &test_case.expected_output, &outcome.stdout);
            let status = if detail == ComparisonDetail::Matched {
                CaseStatus::Passed
            } else {
                CaseStatus::WrongAnswer
            };
            (status, detail)
        }
    };

    TestCaseResult {
        index,
        is_sample: test_case.is_sample,
        is_hidden: test_case.is_hidden,
        status,
        passed: status == CaseStatus::Passed,
        outcome,
        detail,
    }
}

/// Verdict-level figures folded from the executed test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub status: VerdictStatus,
    pub total_time_ms: u64,
    pub peak_memory_kb: u64,
}

/// Fold executed test cases into a verdict status.
///
/// The highest-precedence failure wins; on equal precedence the earlier test
/// case wins. No results at all is an internal error, never `Accepted`.
pub fn summarize(results: &[TestCaseResult]) -> Summary {
    let mut status = if results.is_empty() {
        VerdictStatus::InternalError
    } else {
        VerdictStatus::Accepted
    };

    for result in results {
        let candidate = VerdictStatus::from(result.status);
        if candidate.rank() > status.rank() {
            status = candidate;
        }
    }

    Summary {
        status,
        total_time_ms: results.iter().map(|r| r.outcome.wall_time_ms).sum(),
        peak_memory_kb: results
            .iter()
            .map(|r| r.outcome.peak_memory_kb)
            .max()
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_case(expected_output: &str) -> TestCase {
        TestCase {
            input: "input".to_string(),
            expected_output: expected_output.to_string(),
            is_sample: true,
            is_hidden: false,
        }
    }

    fn make_outcome(stdout: &str, wall_time_ms: u64) -> ExecutionOutcome {
        ExecutionOutcome {
            stdout: stdout.to_string(),
            exit_code: Some(0),
            wall_time_ms,
            cpu_time_ms: wall_time_ms,
            peak_memory_kb: 1000,
            ..Default::default()
        }
    }

    fn result_with(status: CaseStatus) -> TestCaseResult {
        TestCaseResult {
            index: 0,
            is_sample: false,
            is_hidden: false,
            status,
            passed: status == CaseStatus::Passed,
            outcome: make_outcome("", 10),
            detail: ComparisonDetail::NotCompared,
        }
    }

    #[test]
    fn test_exact_match_ignores_trailing_whitespace() {
        let detail = compare(&Comparator::Exact, "42", "42  \n\n");
        assert_eq!(detail, ComparisonDetail::Matched);

        let detail = compare(&Comparator::Exact, "a\nb", "a\r\nb\r\n");
        assert_eq!(detail, ComparisonDetail::Matched);
    }

    #[test]
    fn test_exact_match_keeps_leading_whitespace_and_case() {
        assert_eq!(
            compare(&Comparator::Exact, "hello", "  hello"),
            ComparisonDetail::LineMismatch {
                line: 1,
                expected: "hello".to_string(),
                actual: "  hello".to_string(),
            }
        );
        assert_ne!(compare(&Comparator::Exact, "Hello", "hello"), ComparisonDetail::Matched);
    }

    #[test]
    fn test_exact_reports_first_differing_line() {
        let detail = compare(&Comparator::Exact, "1\n2\n3", "1\n5\n3");
        assert_eq!(
            detail,
            ComparisonDetail::LineMismatch {
                line: 2,
                expected: "2".to_string(),
                actual: "5".to_string(),
            }
        );
    }

    #[test]
    fn test_exact_reports_missing_lines() {
        let detail = compare(&Comparator::Exact, "1\n2\n3", "1\n2\n");
        assert_eq!(
            detail,
            ComparisonDetail::LengthMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_empty_output_matches_empty_expected() {
        assert_eq!(compare(&Comparator::Exact, "", "   \n"), ComparisonDetail::Matched);
    }

    #[test]
    fn test_float_comparator_tolerance() {
        let comparator = Comparator::Float {
            abs_tolerance: 1e-6,
            rel_tolerance: 1e-6,
        };
        assert_eq!(
            compare(&comparator, "0.333333", "0.3333331\n"),
            ComparisonDetail::Matched
        );
        assert_eq!(
            compare(&comparator, "1000000 yes", "1000000.5 yes"),
            ComparisonDetail::Matched
        );
        assert_eq!(
            compare(&comparator, "1.5 2.5", "1.5 2.6"),
            ComparisonDetail::TokenMismatch {
                token: 2,
                expected: "2.5".to_string(),
                actual: "2.6".to_string(),
            }
        );
        assert_eq!(
            compare(&comparator, "1 2", "1"),
            ComparisonDetail::LengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_float_comparator_non_numeric_tokens_are_exact() {
        let comparator = Comparator::Float {
            abs_tolerance: 1.0,
            rel_tolerance: 1.0,
        };
        assert_ne!(compare(&comparator, "YES", "yes"), ComparisonDetail::Matched);
        assert_ne!(compare(&comparator, "nan", "1"), ComparisonDetail::Matched);
    }

    #[test]
    fn test_classification_order() {
        let mut outcome = make_outcome("", 10);
        assert_eq!(classify(&outcome), None);

        outcome.exit_code = Some(1);
        assert_eq!(classify(&outcome), Some(CaseStatus::RuntimeError));

        outcome.timed_out = true;
        outcome.exit_code = None;
        assert_eq!(classify(&outcome), Some(CaseStatus::TimeLimitExceeded));

        outcome.oom = true;
        assert_eq!(classify(&outcome), Some(CaseStatus::MemoryLimitExceeded));
    }

    #[test]
    fn test_output_overflow_is_runtime_error() {
        let outcome = ExecutionOutcome {
            output_truncated: true,
            ..make_outcome("yyyy", 10)
        };
        assert_eq!(classify(&outcome), Some(CaseStatus::RuntimeError));
    }

    #[test]
    fn test_evaluate_case_passed() {
        let result = evaluate_case(3, &make_test_case("42"), make_outcome("42\n", 7), &Comparator::Exact);
        assert!(result.passed);
        assert_eq!(result.index, 3);
        assert_eq!(result.status, CaseStatus::Passed);
        assert_eq!(result.detail, ComparisonDetail::Matched);
        assert_eq!(result.outcome.wall_time_ms, 7);
    }

    #[test]
    fn test_evaluate_case_failed_run_is_not_compared() {
        let outcome = ExecutionOutcome {
            stderr: "Traceback".to_string(),
            exit_code: Some(1),
            ..Default::default()
        };
        let result = evaluate_case(0, &make_test_case("42"), outcome, &Comparator::Exact);
        assert!(!result.passed);
        assert_eq!(result.status, CaseStatus::RuntimeError);
        assert_eq!(result.detail, ComparisonDetail::NotCompared);
    }

    #[test]
    fn test_summarize_all_passed() {
        let results = vec![
            evaluate_case(0, &make_test_case("a"), make_outcome("a", 40), &Comparator::Exact),
            evaluate_case(1, &make_test_case("b"), ExecutionOutcome {
                peak_memory_kb: 5000,
                ..make_outcome("b", 2)
            }, &Comparator::Exact),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.status, VerdictStatus::Accepted);
        assert_eq!(summary.total_time_ms, 42);
        assert_eq!(summary.peak_memory_kb, 5000);
    }

    #[test]
    fn test_summarize_precedence() {
        let results = vec![
            result_with(CaseStatus::WrongAnswer),
            result_with(CaseStatus::Passed),
            result_with(CaseStatus::TimeLimitExceeded),
        ];
        assert_eq!(summarize(&results).status, VerdictStatus::TimeLimitExceeded);

        let results = vec![result_with(CaseStatus::Passed), result_with(CaseStatus::WrongAnswer)];
        assert_eq!(summarize(&results).status, VerdictStatus::WrongAnswer);

        let results = vec![result_with(CaseStatus::WrongAnswer), result_with(CaseStatus::RuntimeError)];
        assert_eq!(summarize(&results).status, VerdictStatus::RuntimeError);
    }

    #[test]
    fn test_summarize_empty_is_internal_error() {
        let summary = summarize(&[]);
        assert_eq!(summary.status, VerdictStatus::InternalError);
        assert_eq!(summary.total_time_ms, 0);
        assert_eq!(summary.peak_memory_kb, 0);
    }
}
