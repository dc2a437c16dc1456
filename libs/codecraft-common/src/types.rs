use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ProblemId = u64;

/// Closed set of languages the judge knows how to compile and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
    Java,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Javascript,
        Language::Python,
        Language::Java,
        Language::Cpp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Ok(Language::Javascript),
            "python" | "py" | "python3" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ad hoc run against sample test cases; never persisted.
    Run,
    /// Judged run against the full suite; persisted exactly once.
    Submit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Run => f.write_str("run"),
            Mode::Submit => f.write_str("submit"),
        }
    }
}

/// A request accepted by the scheduler. Immutable once admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: Language,
    pub problem_id: ProblemId,
    pub mode: Mode,
    pub requester_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_sample: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

/// How a program's stdout is matched against the expected output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Comparator {
    #[default]
    Exact,
    Float {
        #[serde(default = "default_tolerance")]
        abs_tolerance: f64,
        #[serde(default = "default_tolerance")]
        rel_tolerance: f64,
    },
}

fn default_tolerance() -> f64 {
    1e-6
}

/// A problem as the judge sees it: ordered test cases plus optional overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub id: ProblemId,
    #[serde(default)]
    pub comparator: Comparator,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    pub test_cases: Vec<TestCase>,
}

impl ProblemSpec {
    /// Test cases a request of `mode` runs against, paired with their index in
    /// the stored order.
    ///
    /// `Run` uses the sample cases; when none are flagged it falls back to every
    /// case that is not hidden. `Submit` uses everything.
    pub fn cases_for(&self, mode: Mode) -> Vec<(usize, &TestCase)> {
        let indexed = self.test_cases.iter().enumerate();
        match mode {
            Mode::Submit => indexed.collect(),
            Mode::Run => {
                let samples: Vec<_> = indexed.clone().filter(|(_, tc)| tc.is_sample).collect();
                if samples.is_empty() {
                    indexed.filter(|(_, tc)| !tc.is_hidden).collect()
                } else {
                    samples
                }
            }
        }
    }
}

/// Limits applied to a single sandboxed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub wall_time_ms: u64,
    pub cpu_time_ms: u64,
    pub memory_mb: u64,
    pub max_output_bytes: usize,
    pub pids: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_ms: 2000,
            cpu_time_ms: 1000,
            memory_mb: 256,
            max_output_bytes: 1024 * 1024,
            pids: 64,
        }
    }
}

/// Raw result of running one unit of code against one input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed before it could exit on its own.
    pub exit_code: Option<i64>,
    pub wall_time_ms: u64,
    pub cpu_time_ms: u64,
    pub peak_memory_kb: u64,
    pub timed_out: bool,
    pub oom: bool,
    #[serde(default)]
    pub output_truncated: bool,
}

impl ExecutionOutcome {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.oom && !self.output_truncated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
}

impl CaseStatus {
    /// Runtime errors and limit violations stop the remaining test cases.
    pub fn short_circuits(&self) -> bool {
        matches!(
            self,
            CaseStatus::RuntimeError
                | CaseStatus::TimeLimitExceeded
                | CaseStatus::MemoryLimitExceeded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonDetail {
    Matched,
    /// First differing line (1-based) under exact comparison.
    LineMismatch {
        line: usize,
        expected: String,
        actual: String,
    },
    /// First differing token (1-based) under float comparison.
    TokenMismatch {
        token: usize,
        expected: String,
        actual: String,
    },
    /// Output has a different number of lines or tokens than expected.
    LengthMismatch { expected: usize, actual: usize },
    /// The program failed before its output could be judged.
    NotCompared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Position of the test case in the problem's stored order.
    pub index: usize,
    pub is_sample: bool,
    pub is_hidden: bool,
    pub status: CaseStatus,
    pub passed: bool,
    pub outcome: ExecutionOutcome,
    pub detail: ComparisonDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    InternalError,
}

impl VerdictStatus {
    /// Precedence when several categories occur: compile > runtime > limits > wrong answer.
    pub fn rank(&self) -> u8 {
        match self {
            VerdictStatus::Accepted => 0,
            VerdictStatus::WrongAnswer => 1,
            VerdictStatus::TimeLimitExceeded | VerdictStatus::MemoryLimitExceeded => 2,
            VerdictStatus::RuntimeError => 3,
            VerdictStatus::CompileError => 4,
            VerdictStatus::InternalError => 5,
        }
    }

    /// Human label as stored by the submissions table.
    pub fn label(&self) -> &'static str {
        match self {
            VerdictStatus::Accepted => "Accepted",
            VerdictStatus::WrongAnswer => "Wrong Answer",
            VerdictStatus::CompileError => "Compilation Error",
            VerdictStatus::RuntimeError => "Runtime Error",
            VerdictStatus::TimeLimitExceeded => "Time Limit Exceeded",
            VerdictStatus::MemoryLimitExceeded => "Memory Limit Exceeded",
            VerdictStatus::InternalError => "Internal Error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Accepted => "accepted",
            VerdictStatus::WrongAnswer => "wrong_answer",
            VerdictStatus::CompileError => "compile_error",
            VerdictStatus::RuntimeError => "runtime_error",
            VerdictStatus::TimeLimitExceeded => "time_limit_exceeded",
            VerdictStatus::MemoryLimitExceeded => "memory_limit_exceeded",
            VerdictStatus::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<CaseStatus> for VerdictStatus {
    fn from(status: CaseStatus) -> Self {
        match status {
            CaseStatus::Passed => VerdictStatus::Accepted,
            CaseStatus::WrongAnswer => VerdictStatus::WrongAnswer,
            CaseStatus::RuntimeError => VerdictStatus::RuntimeError,
            CaseStatus::TimeLimitExceeded => VerdictStatus::TimeLimitExceeded,
            CaseStatus::MemoryLimitExceeded => VerdictStatus::MemoryLimitExceeded,
        }
    }
}

/// Final judged outcome of one request. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub request_id: Uuid,
    pub problem_id: ProblemId,
    pub language: Language,
    pub mode: Mode,
    pub requester_id: String,
    pub status: VerdictStatus,
    pub results: Vec<TestCaseResult>,
    pub total_time_ms: u64,
    pub peak_memory_kb: u64,
    /// Compiler diagnostics when `status` is `CompileError`.
    pub compile_output: Option<String>,
    /// Operator-facing explanation when `status` is `InternalError`.
    pub message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl Verdict {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn phase(&self) -> JobPhase {
        match self.status {
            VerdictStatus::CompileError | VerdictStatus::InternalError => JobPhase::Failed,
            _ => JobPhase::Completed,
        }
    }

    /// Copy safe to show the requester: hidden test cases keep their status and
    /// timings but lose their output and comparison detail.
    pub fn redacted(&self) -> Verdict {
        let mut copy = self.clone();
        for result in copy.results.iter_mut().filter(|r| r.is_hidden) {
            result.outcome.stdout.clear();
            result.outcome.stderr.clear();
            if !matches!(result.detail, ComparisonDetail::Matched) {
                result.detail = ComparisonDetail::NotCompared;
            }
        }
        copy
    }
}

/// Lifecycle of a request: `Queued -> Compiling -> Running(i/N) -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Compiling,
    Running { current: usize, total: usize },
    Completed,
    Failed,
}
