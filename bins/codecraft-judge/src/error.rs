use crate::engine::EngineError;
use crate::store::StoreError;
use codecraft_common::types::{Language, Mode, ProblemId};

/// Failures that stop a request before it can produce a normal verdict.
///
/// Everything except `Cancelled` becomes an `InternalError` verdict at the
/// worker boundary.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("request cancelled")]
    Cancelled,

    #[error("problem {0} not found")]
    ProblemNotFound(ProblemId),

    #[error("problem {problem_id} has no test cases for {mode}")]
    NoTestCases { problem_id: ProblemId, mode: Mode },

    #[error("test case {index} input is {size} bytes (limit {limit})")]
    InputTooLarge {
        index: usize,
        size: usize,
        limit: usize,
    },

    #[error("language {0} is not configured")]
    LanguageNotConfigured(Language),

    #[error("problem store: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Engine(EngineError),

    #[error("scratch workspace: {0}")]
    Workspace(#[from] std::io::Error),
}

impl From<EngineError> for JudgeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => JudgeError::Cancelled,
            other => JudgeError::Engine(other),
        }
    }
}
