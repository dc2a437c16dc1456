/// Judge Engine - High-Level Orchestration
///
/// **Responsibility:**
/// Take one admitted request from `Compiling` to a verdict.
///
/// **Architecture:**
/// 1. Load the problem and select test cases for the request's mode
/// 2. Compile once into a private workspace (adapter.rs + engine.rs)
/// 3. Run each test case in order, each in a fresh copy of the artifact
/// 4. Judge each outcome and fold them into a verdict (evaluator.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (engine's job)
/// - How output is compared (evaluator's job)
/// - Queueing and fairness (scheduler's job)
///
/// Cancellation is checked at test-case boundaries; an in-flight invocation is
/// killed by the engine when the token fires.

use crate::adapter::{adapter_for, LanguageAdapter};
use crate::config::{LanguageConfig, LanguageConfigManager};
use crate::engine::{ExecutionEngine, Invocation, STDIN_FILE};
use crate::error::JudgeError;
use crate::evaluator;
use crate::store::ProblemStore;
use chrono::Utc;
use codecraft_common::types::{
    ExecutionOutcome, ExecutionRequest, JobPhase, TestCaseResult, Verdict, VerdictStatus,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Test inputs above this size are a problem misconfiguration.
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Progress callback invoked on every phase change.
pub type Progress<'a> = &'a (dyn Fn(JobPhase) + Send + Sync);

/// Sources plus whatever the compile step produced. Lives only as long as the
/// request that built it.
struct CompiledArtifact {
    dir: TempDir,
    run_command: Vec<String>,
}

enum CompileResult {
    Compiled(CompiledArtifact),
    Failed { diagnostics: String },
}

pub struct Judge {
    engine: Arc<dyn ExecutionEngine>,
    languages: Arc<LanguageConfigManager>,
    problems: Arc<dyn ProblemStore>,
    scratch_dir: PathBuf,
}

impl Judge {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        languages: Arc<LanguageConfigManager>,
        problems: Arc<dyn ProblemStore>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            languages,
            problems,
            scratch_dir,
        }
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    /// Judge one request. Returns `Err` only when no meaningful verdict exists.
    pub async fn judge(
        &self,
        request_id: Uuid,
        request: &ExecutionRequest,
        progress: Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<Verdict, JudgeError> {
        let problem = self
            .problems
            .load(request.problem_id)
            .await?
            .ok_or(JudgeError::ProblemNotFound(request.problem_id))?;

        let cases = problem.cases_for(request.mode);
        if cases.is_empty() {
            return Err(JudgeError::NoTestCases {
                problem_id: request.problem_id,
                mode: request.mode,
            });
        }

        let config = self
            .languages
            .get_config(&request.language)
            .map_err(|_| JudgeError::LanguageNotConfigured(request.language))?;
        let run_limits = self
            .languages
            .run_limits(&request.language, &problem)
            .map_err(|_| JudgeError::LanguageNotConfigured(request.language))?;
        let adapter = adapter_for(request.language);

        info!(
            request_id = %request_id,
            language = %request.language,
            mode = %request.mode,
            problem_id = request.problem_id,
            test_count = cases.len(),
            "Judging request"
        );

        progress(JobPhase::Compiling);
        let artifact = match self
            .compile(request_id, adapter, config, &request.source_code, cancel)
            .await?
        {
            CompileResult::Compiled(artifact) => artifact,
            CompileResult::Failed { diagnostics } => {
                info!(request_id = %request_id, "Compilation failed");
                let mut verdict = build_verdict(request_id, request, Vec::new());
                verdict.status = VerdictStatus::CompileError;
                verdict.compile_output = Some(diagnostics);
                return Ok(verdict);
            }
        };

        let total = cases.len();
        let mut results: Vec<TestCaseResult> = Vec::with_capacity(total);

        for (position, (index, test_case)) in cases.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(JudgeError::Cancelled);
            }
            if test_case.input.len() > MAX_INPUT_BYTES {
                return Err(JudgeError::InputTooLarge {
                    index,
                    size: test_case.input.len(),
                    limit: MAX_INPUT_BYTES,
                });
            }

            progress(JobPhase::Running {
                current: position + 1,
                total,
            });

            let run_dir = self.workspace("run").await?;
            copy_artifact(artifact.dir.path(), run_dir.path()).await?;

            let outcome = self
                .engine
                .execute(
                    Invocation {
                        image: &config.image,
                        argv: &artifact.run_command,
                        workdir: run_dir.path(),
                        stdin: Some(&test_case.input),
                        limits: run_limits,
                    },
                    cancel,
                )
                .await?;
            drop(run_dir);

            let result = evaluator::evaluate_case(index, test_case, outcome, &problem.comparator);
            debug!(
                request_id = %request_id,
                test_index = index,
                status = ?result.status,
                wall_time_ms = result.outcome.wall_time_ms,
                peak_memory_kb = result.outcome.peak_memory_kb,
                "Test case judged"
            );

            let stop = result.status.short_circuits();
            results.push(result);
            if stop {
                break;
            }
        }

        Ok(build_verdict(request_id, request, results))
    }

    /// Fresh, world-writable directory: the sandbox user is not the judge's.
    async fn workspace(&self, purpose: &str) -> Result<TempDir, JudgeError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("codecraft-{}-", purpose))
            .tempdir_in(&self.scratch_dir)?;
        tokio::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777)).await?;
        Ok(dir)
    }

    async fn compile(
        &self,
        request_id: Uuid,
        adapter: &dyn LanguageAdapter,
        config: &LanguageConfig,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<CompileResult, JudgeError> {
        let dir = self.workspace("build").await?;
        let files = adapter.prepare_sources(source);
        for file in &files {
            tokio::fs::write(dir.path().join(&file.name), &file.contents).await?;
        }
        debug!(
            request_id = %request_id,
            extension = adapter.file_extension(),
            files = ?files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "Sources prepared"
        );

        let run_command = adapter.run_command(source);
        let Some(compile_command) = adapter.compile_command(source) else {
            return Ok(CompileResult::Compiled(CompiledArtifact { dir, run_command }));
        };

        let limits = self
            .languages
            .compile_limits(&adapter.language())
            .map_err(|_| JudgeError::LanguageNotConfigured(adapter.language()))?;

        let outcome = self
            .engine
            .execute(
                Invocation {
                    image: &config.image,
                    argv: &compile_command,
                    workdir: dir.path(),
                    stdin: None,
                    limits,
                },
                cancel,
            )
            .await?;

        if outcome.exited_cleanly() {
            debug!(
                request_id = %request_id,
                wall_time_ms = outcome.wall_time_ms,
                "Compilation succeeded"
            );
            return Ok(CompileResult::Compiled(CompiledArtifact { dir, run_command }));
        }

        Ok(CompileResult::Failed {
            diagnostics: compile_diagnostics(&outcome, limits.wall_time_ms),
        })
    }
}

fn compile_diagnostics(outcome: &ExecutionOutcome, timeout_ms: u64) -> String {
    if outcome.timed_out {
        return format!("Compilation timed out after {} ms", timeout_ms);
    }
    if outcome.oom {
        return "Compiler exceeded its memory limit".to_string();
    }
    let text = if outcome.stderr.trim().is_empty() {
        &outcome.stdout
    } else {
        &outcome.stderr
    };
    if text.trim().is_empty() {
        format!("Compiler exited with status {:?}", outcome.exit_code)
    } else {
        text.clone()
    }
}

/// Copy the artifact's files into a run directory, leaving the previous
/// invocation's input behind.
async fn copy_artifact(from: &Path, to: &Path) -> Result<(), JudgeError> {
    let mut entries = tokio::fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == STDIN_FILE || !entry.file_type().await?.is_file() {
            continue;
        }
        tokio::fs::copy(entry.path(), to.join(entry.file_name())).await?;
    }
    Ok(())
}

fn build_verdict(request_id: Uuid, request: &ExecutionRequest, results: Vec<TestCaseResult>) -> Verdict {
    let summary = evaluator::summarize(&results);
    Verdict {
        request_id,
        problem_id: request.problem_id,
        language: request.language,
        mode: request.mode,
        requester_id: request.requester_id.clone(),
        status: summary.status,
        results,
        total_time_ms: summary.total_time_ms,
        peak_memory_kb: summary.peak_memory_kb,
        compile_output: None,
        message: None,
        completed_at: Utc::now(),
    }
}

/// Verdict for a request the service failed, not the submission.
pub fn internal_error_verdict(
    request_id: Uuid,
    request: &ExecutionRequest,
    message: impl Into<String>,
) -> Verdict {
    let mut verdict = build_verdict(request_id, request, Vec::new());
    verdict.status = VerdictStatus::InternalError;
    verdict.message = Some(message.into());
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::store::MemoryProblemStore;
    use crate::testing::{failed_outcome, language_config, ok_outcome, problem, ScriptedEngine};
    use codecraft_common::types::{CaseStatus, Comparator, Language, Mode, TestCase};
    use std::sync::Mutex;

    fn case(input: &str, expected: &str, sample: bool, hidden: bool) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected.to_string(),
            is_sample: sample,
            is_hidden: hidden,
        }
    }

    fn request(language: Language, mode: Mode, source: &str) -> ExecutionRequest {
        ExecutionRequest {
            source_code: source.to_string(),
            language,
            problem_id: 1,
            mode,
            requester_id: "user-1".to_string(),
        }
    }

    fn judge_with(engine: Arc<ScriptedEngine>, problems: Vec<codecraft_common::types::ProblemSpec>) -> (Judge, TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let languages = LanguageConfigManager::from_configs(vec![
            language_config("javascript"),
            language_config("python"),
            language_config("cpp"),
        ])
        .unwrap();
        let judge = Judge::new(
            engine,
            Arc::new(languages),
            Arc::new(MemoryProblemStore::new(problems)),
            scratch.path().to_path_buf(),
        );
        (judge, scratch)
    }

    /// Doubles the integer on stdin, like `return input * 2`.
    fn doubling_engine() -> Arc<ScriptedEngine> {
        Arc::new(ScriptedEngine::new(|invocation| {
            let n: i64 = invocation.stdin.unwrap_or("0").trim().parse().unwrap_or(0);
            Ok(ok_outcome(&format!("{}\n", n * 2)))
        }))
    }

    async fn run(judge: &Judge, request: &ExecutionRequest) -> Result<Verdict, JudgeError> {
        judge
            .judge(Uuid::new_v4(), request, &|_| {}, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_all_cases_pass_is_accepted() {
        let engine = doubling_engine();
        let (judge, _scratch) = judge_with(
            engine.clone(),
            vec![problem(1, vec![case("21", "42", true, false), case("5", "10", false, true)])],
        );

        let verdict = run(&judge, &request(Language::Javascript, Mode::Submit, "return input * 2"))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::Accepted);
        assert_eq!(verdict.results.len(), 2);
        assert!(verdict.results.iter().all(|r| r.passed));
        assert_eq!(verdict.total_time_ms, 20);
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_run_mode_uses_samples_only() {
        let engine = doubling_engine();
        let (judge, _scratch) = judge_with(
            engine.clone(),
            vec![problem(
                1,
                vec![
                    case("1", "2", true, false),
                    case("2", "4", false, true),
                    case("3", "6", true, false),
                ],
            )],
        );

        let verdict = run(&judge, &request(Language::Javascript, Mode::Run, ""))
            .await
            .unwrap();

        let indices: Vec<usize> = verdict.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 2]);
        let inputs: Vec<Option<String>> = engine.calls().into_iter().map(|c| c.stdin).collect();
        assert_eq!(inputs, vec![Some("1".to_string()), Some("3".to_string())]);
    }

    #[tokio::test]
    async fn test_wrong_answer_keeps_running() {
        let (judge, _scratch) = judge_with(
            doubling_engine(),
            vec![problem(
                1,
                vec![
                    case("1", "2", true, false),
                    case("2", "5", true, false),
                    case("3", "6", true, false),
                ],
            )],
        );

        let verdict = run(&judge, &request(Language::Python, Mode::Submit, ""))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::WrongAnswer);
        assert_eq!(verdict.results.len(), 3);
        assert_eq!(verdict.passed_count(), 2);
        assert_eq!(verdict.results[1].status, CaseStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn test_runtime_error_short_circuits() {
        let engine = Arc::new(ScriptedEngine::new(|invocation| {
            if invocation.stdin == Some("boom") {
                Ok(failed_outcome(1, "Traceback (most recent call last)"))
            } else {
                Ok(ok_outcome("ok"))
            }
        }));
        let (judge, _scratch) = judge_with(
            engine.clone(),
            vec![problem(
                1,
                vec![
                    case("a", "ok", true, false),
                    case("boom", "ok", true, false),
                    case("c", "ok", true, false),
                    case("d", "ok", true, false),
                ],
            )],
        );

        let verdict = run(&judge, &request(Language::Python, Mode::Submit, ""))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::RuntimeError);
        assert_eq!(verdict.results.len(), 2);
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_time_limit_short_circuits() {
        let engine = Arc::new(ScriptedEngine::new(|_| {
            Ok(ExecutionOutcome {
                timed_out: true,
                wall_time_ms: 2000,
                ..Default::default()
            })
        }));
        let (judge, _scratch) = judge_with(
            engine,
            vec![problem(1, vec![case("1", "1", true, false), case("2", "2", true, false)])],
        );

        let verdict = run(&judge, &request(Language::Javascript, Mode::Submit, "while(true){}"))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::TimeLimitExceeded);
        assert_eq!(verdict.results.len(), 1);
        assert!(verdict.results[0].outcome.timed_out);
    }

    #[tokio::test]
    async fn test_compile_error_runs_nothing() {
        let engine = Arc::new(ScriptedEngine::new(|invocation| {
            if invocation.argv[0] == "g++" {
                Ok(failed_outcome(1, "main.cpp:1:1: error: expected declaration"))
            } else {
                Ok(ok_outcome("42"))
            }
        }));
        let (judge, _scratch) = judge_with(
            engine.clone(),
            vec![problem(1, vec![case("21", "42", true, false)])],
        );

        let verdict = run(&judge, &request(Language::Cpp, Mode::Submit, "int main( {"))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::CompileError);
        assert!(verdict.results.is_empty());
        assert!(verdict
            .compile_output
            .as_deref()
            .unwrap_or("")
            .contains("expected declaration"));
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_compile_timeout_is_compile_error() {
        let engine = Arc::new(ScriptedEngine::new(|_| {
            Ok(ExecutionOutcome {
                timed_out: true,
                ..Default::default()
            })
        }));
        let (judge, _scratch) = judge_with(engine, vec![problem(1, vec![case("1", "1", true, false)])]);

        let verdict = run(&judge, &request(Language::Cpp, Mode::Run, ""))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::CompileError);
        assert!(verdict.compile_output.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_compiled_artifact_reaches_every_run() {
        let engine = Arc::new(ScriptedEngine::new(|invocation| {
            if invocation.argv[0] == "g++" {
                std::fs::write(invocation.workdir.join("main"), "binary").unwrap();
                return Ok(ok_outcome(""));
            }
            let present = invocation.workdir.join("main").exists()
                && invocation.workdir.join("main.cpp").exists();
            Ok(ok_outcome(if present { "yes" } else { "no" }))
        }));
        let (judge, _scratch) = judge_with(
            engine,
            vec![problem(1, vec![case("1", "yes", true, false), case("2", "yes", true, false)])],
        );

        let verdict = run(&judge, &request(Language::Cpp, Mode::Submit, "int main(){}"))
            .await
            .unwrap();
        assert_eq!(verdict.status, VerdictStatus::Accepted);
    }

    #[tokio::test]
    async fn test_no_state_survives_between_test_cases() {
        let engine = Arc::new(ScriptedEngine::new(|invocation| {
            let marker = invocation.workdir.join("cache.txt");
            let leaked = marker.exists();
            std::fs::write(&marker, "answer").unwrap();
            Ok(ok_outcome(if leaked { "leaked" } else { "clean" }))
        }));
        let (judge, _scratch) = judge_with(
            engine.clone(),
            vec![problem(1, vec![case("1", "clean", true, false), case("2", "clean", true, false)])],
        );

        let verdict = run(&judge, &request(Language::Python, Mode::Submit, ""))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::Accepted);
        let calls = engine.calls();
        assert_ne!(calls[0].workdir, calls[1].workdir);
        assert!(!calls[0].workdir.exists());
    }

    #[tokio::test]
    async fn test_float_comparator_from_problem() {
        let engine = Arc::new(ScriptedEngine::new(|_| Ok(ok_outcome("3.1415927\n"))));
        let mut spec = problem(1, vec![case("", "3.14159265", true, false)]);
        spec.comparator = Comparator::Float {
            abs_tolerance: 1e-6,
            rel_tolerance: 1e-6,
        };
        let (judge, _scratch) = judge_with(engine, vec![spec]);

        let verdict = run(&judge, &request(Language::Python, Mode::Run, ""))
            .await
            .unwrap();
        assert_eq!(verdict.status, VerdictStatus::Accepted);
    }

    #[tokio::test]
    async fn test_unknown_problem_and_empty_suite_are_errors() {
        let (judge, _scratch) = judge_with(doubling_engine(), vec![problem(1, vec![])]);

        let mut missing = request(Language::Python, Mode::Submit, "");
        missing.problem_id = 99;
        assert!(matches!(
            run(&judge, &missing).await,
            Err(JudgeError::ProblemNotFound(99))
        ));

        assert!(matches!(
            run(&judge, &request(Language::Python, Mode::Submit, "")).await,
            Err(JudgeError::NoTestCases { problem_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_language_is_error() {
        let (judge, _scratch) = judge_with(
            doubling_engine(),
            vec![problem(1, vec![case("1", "2", true, false)])],
        );
        assert!(matches!(
            run(&judge, &request(Language::Java, Mode::Run, "")).await,
            Err(JudgeError::LanguageNotConfigured(Language::Java))
        ));
    }

    #[tokio::test]
    async fn test_sandbox_failure_propagates() {
        let engine = Arc::new(ScriptedEngine::new(|_| {
            Err(EngineError::Sandbox("docker daemon unreachable".to_string()))
        }));
        let (judge, _scratch) = judge_with(engine, vec![problem(1, vec![case("1", "2", true, false)])]);

        let err = run(&judge, &request(Language::Python, Mode::Run, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Engine(_)));
        assert!(err.to_string().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_case() {
        let engine = doubling_engine();
        let (judge, _scratch) = judge_with(
            engine.clone(),
            vec![problem(1, vec![case("1", "2", true, false)])],
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = judge
            .judge(Uuid::new_v4(), &request(Language::Python, Mode::Run, ""), &|_| {}, &cancel)
            .await;
        assert!(matches!(result, Err(JudgeError::Cancelled)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_progress_phases() {
        let phases = Mutex::new(Vec::new());
        let (judge, _scratch) = judge_with(
            doubling_engine(),
            vec![problem(1, vec![case("1", "2", true, false), case("2", "4", true, false)])],
        );

        judge
            .judge(
                Uuid::new_v4(),
                &request(Language::Python, Mode::Run, ""),
                &|phase| phases.lock().unwrap().push(phase),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            phases.into_inner().unwrap(),
            vec![
                JobPhase::Compiling,
                JobPhase::Running { current: 1, total: 2 },
                JobPhase::Running { current: 2, total: 2 },
            ]
        );
    }

    #[test]
    fn test_internal_error_verdict() {
        let verdict = internal_error_verdict(
            Uuid::new_v4(),
            &request(Language::Python, Mode::Submit, ""),
            "no test cases",
        );
        assert_eq!(verdict.status, VerdictStatus::InternalError);
        assert!(verdict.results.is_empty());
        assert_eq!(verdict.message.as_deref(), Some("no test cases"));
        assert_eq!(verdict.phase(), JobPhase::Failed);
    }

    fn toolchain_available(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    /// Judge backed by host toolchains, with limits loose enough for a JVM.
    fn local_judge(language: &str) -> (Judge, TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = language_config(language);
        config.memory_limit_mb = 1024;
        config.cpu_time_limit_ms = 10_000;
        config.wall_time_limit_ms = 20_000;
        config.compile_timeout_ms = 60_000;
        let judge = Judge::new(
            Arc::new(crate::engine::LocalEngine),
            Arc::new(LanguageConfigManager::from_configs(vec![config]).unwrap()),
            Arc::new(MemoryProblemStore::new(vec![problem(
                1,
                vec![case("21", "42", true, false), case("-7", "-14", false, true)],
            )])),
            scratch.path().to_path_buf(),
        );
        (judge, scratch)
    }

    #[tokio::test]
    async fn test_java_editor_template_calls_solution() {
        if !toolchain_available("javac") {
            eprintln!("javac not found, skipping");
            return;
        }
        let (judge, _scratch) = local_judge("java");
        let source = "public class Solution {
    public static void main(String[] args) {
        // Example usage
    }

    public static String solution(String input) {
        return String.valueOf(Integer.parseInt(input) * 2);
    }
}";

        let verdict = run(&judge, &request(Language::Java, Mode::Submit, source))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::Accepted, "{:?}", verdict);
        assert_eq!(verdict.results[0].outcome.stdout, "42\n");
    }

    #[tokio::test]
    async fn test_cpp_editor_template_calls_solution() {
        if !toolchain_available("g++") {
            eprintln!("g++ not found, skipping");
            return;
        }
        let (judge, _scratch) = local_judge("cpp");
        let source = "#include <iostream>
#include <string>

std::string solution(std::string input) {
    return std::to_string(std::stoi(input) * 2);
}

int main() {
    // Example usage
    return 0;
}";

        let verdict = run(&judge, &request(Language::Cpp, Mode::Submit, source))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::Accepted, "{:?}", verdict);
        assert_eq!(verdict.results[0].outcome.stdout, "42\n");
    }

    #[tokio::test]
    async fn test_cpp_compile_error_points_at_submission_line() {
        if !toolchain_available("g++") {
            eprintln!("g++ not found, skipping");
            return;
        }
        let (judge, _scratch) = local_judge("cpp");
        let source = "#include <string>\nstd::string solution(std::string input) {\n    return undefined_name;\n}\n";

        let verdict = run(&judge, &request(Language::Cpp, Mode::Submit, source))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::CompileError);
        assert!(verdict.compile_output.unwrap_or_default().contains("main.cpp:3"));
    }
}
