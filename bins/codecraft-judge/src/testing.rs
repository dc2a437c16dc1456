// Shared fixtures for unit tests.
use crate::config::LanguageConfig;
use crate::engine::{EngineError, ExecutionEngine, Invocation};
use async_trait::async_trait;
use codecraft_common::types::{Comparator, ExecutionOutcome, ProblemId, ProblemSpec, TestCase};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn language_config(name: &str) -> LanguageConfig {
    LanguageConfig {
        name: name.to_string(),
        version: "test".to_string(),
        image: format!("codecraft-{}:test", name),
        dockerfile_path: None,
        memory_limit_mb: 128,
        cpu_time_limit_ms: 1000,
        wall_time_limit_ms: 2000,
        compile_timeout_ms: 10_000,
        compile_memory_limit_mb: 512,
        max_output_bytes: 4096,
        pids_limit: 16,
    }
}

pub fn problem(id: ProblemId, test_cases: Vec<TestCase>) -> ProblemSpec {
    ProblemSpec {
        id,
        comparator: Comparator::Exact,
        time_limit_ms: None,
        memory_limit_mb: None,
        test_cases,
    }
}

pub fn ok_outcome(stdout: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: stdout.to_string(),
        exit_code: Some(0),
        wall_time_ms: 10,
        cpu_time_ms: 8,
        peak_memory_kb: 2048,
        ..Default::default()
    }
}

pub fn failed_outcome(exit_code: i64, stderr: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        stderr: stderr.to_string(),
        exit_code: Some(exit_code),
        wall_time_ms: 10,
        cpu_time_ms: 8,
        peak_memory_kb: 2048,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub stdin: Option<String>,
}

type Script = dyn Fn(&Invocation<'_>) -> Result<ExecutionOutcome, EngineError> + Send + Sync;

/// Engine whose outcome is computed by a closure; records every invocation.
pub struct ScriptedEngine {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedEngine {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<ExecutionOutcome, EngineError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        invocation: Invocation<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.calls.lock().unwrap().push(RecordedCall {
            argv: invocation.argv.to_vec(),
            workdir: invocation.workdir.to_path_buf(),
            stdin: invocation.stdin.map(str::to_string),
        });
        (self.script)(&invocation)
    }
}
