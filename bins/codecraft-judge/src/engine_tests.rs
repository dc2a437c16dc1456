/// Integration tests for the Docker sandbox
///
/// These tests drive the full judge pipeline against real containers:
/// 1. Interpreted submissions are accepted through the harness
/// 2. Infinite loops hit the time limit and stop the suite
/// 3. Compilation failures run nothing
/// 4. The sandbox has no network
/// 5. Memory hogs are reported as memory limit violations
/// 6. Repeated runs produce identical output
///
/// Run with `cargo test -- --ignored` on a host with a Docker daemon; the
/// stock images are pulled on first use.

#[cfg(test)]
mod docker_tests {
    use crate::config::{LanguageConfig, LanguageConfigManager};
    use crate::docker::DockerEngine;
    use crate::engine::{ExecutionEngine, Invocation};
    use crate::executor::Judge;
    use crate::store::MemoryProblemStore;
    use codecraft_common::types::{
        Comparator, ExecutionRequest, Language, Mode, ProblemSpec, ResourceLimits, TestCase,
        VerdictStatus,
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn stock_config(name: &str, image: &str) -> LanguageConfig {
        LanguageConfig {
            name: name.to_string(),
            version: "stock".to_string(),
            image: image.to_string(),
            dockerfile_path: None,
            memory_limit_mb: 256,
            cpu_time_limit_ms: 2000,
            wall_time_limit_ms: 4000,
            compile_timeout_ms: 60_000,
            compile_memory_limit_mb: 1024,
            max_output_bytes: 64 * 1024,
            pids_limit: 64,
        }
    }

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected.to_string(),
            is_sample: true,
            is_hidden: false,
        }
    }

    async fn docker_judge(problem: ProblemSpec) -> (Judge, tempfile::TempDir) {
        let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
        let engine = DockerEngine::connect()
            .await
            .expect("Failed to connect to Docker");
        let languages = LanguageConfigManager::from_configs(vec![
            stock_config("javascript", "node:20-alpine"),
            stock_config("python", "python:3.12-alpine"),
            stock_config("cpp", "gcc:13"),
        ])
        .expect("Failed to build language config");

        let judge = Judge::new(
            Arc::new(engine),
            Arc::new(languages),
            Arc::new(MemoryProblemStore::new(vec![problem])),
            scratch.path().to_path_buf(),
        );
        (judge, scratch)
    }

    fn problem(test_cases: Vec<TestCase>) -> ProblemSpec {
        ProblemSpec {
            id: 1,
            comparator: Comparator::Exact,
            time_limit_ms: None,
            memory_limit_mb: None,
            test_cases,
        }
    }

    fn submit(language: Language, source: &str) -> ExecutionRequest {
        ExecutionRequest {
            source_code: source.to_string(),
            language,
            problem_id: 1,
            mode: Mode::Submit,
            requester_id: "docker-test".to_string(),
        }
    }

    async fn judge_once(judge: &Judge, request: &ExecutionRequest) -> codecraft_common::types::Verdict {
        judge
            .judge(Uuid::new_v4(), request, &|_| {}, &CancellationToken::new())
            .await
            .expect("Judge failed")
    }

    /// Test: the editor's JavaScript template style is accepted
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_javascript_doubles_input() {
        let (judge, _scratch) = docker_judge(problem(vec![case("21", "42")])).await;

        let verdict = judge_once(&judge, &submit(Language::Javascript, "return input * 2")).await;

        assert_eq!(verdict.status, VerdictStatus::Accepted);
        assert!(verdict.results[0].passed);
    }

    /// Test: python solution() template and plain scripts both work
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_solution_function() {
        let (judge, _scratch) = docker_judge(problem(vec![case("abc", "cba"), case("xy", "yx")])).await;

        let source = "def solution(input):\n    return input[::-1]\n";
        let verdict = judge_once(&judge, &submit(Language::Python, source)).await;

        assert_eq!(verdict.status, VerdictStatus::Accepted);
        assert_eq!(verdict.results.len(), 2);
    }

    /// Test: an infinite loop exceeds the limit and stops the suite
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_infinite_loop_times_out() {
        let mut spec = problem(vec![case("1", "1"), case("2", "2")]);
        spec.time_limit_ms = Some(1000);
        let (judge, _scratch) = docker_judge(spec).await;

        let verdict = judge_once(&judge, &submit(Language::Python, "while True:\n    pass\n")).await;

        assert_eq!(verdict.status, VerdictStatus::TimeLimitExceeded);
        assert_eq!(verdict.results.len(), 1);
        assert!(verdict.results[0].outcome.timed_out);
    }

    /// Test: C++ compile errors carry diagnostics and run nothing
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_cpp_compile_error() {
        let (judge, _scratch) = docker_judge(problem(vec![case("1", "1")])).await;

        let verdict = judge_once(&judge, &submit(Language::Cpp, "int main( { return 0 }")).await;

        assert_eq!(verdict.status, VerdictStatus::CompileError);
        assert!(verdict.results.is_empty());
        assert!(verdict.compile_output.unwrap_or_default().contains("error"));
    }

    /// Test: C++ compiles once and every case runs the binary
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_cpp_accepted() {
        let (judge, _scratch) = docker_judge(problem(vec![case("3 4", "7"), case("10 -2", "8")])).await;

        let source = "#include <iostream>\nint main(){long a,b;std::cin>>a>>b;std::cout<<a+b<<\"\\n\";}\n";
        let verdict = judge_once(&judge, &submit(Language::Cpp, source)).await;

        assert_eq!(verdict.status, VerdictStatus::Accepted);
        assert_eq!(verdict.results.len(), 2);
    }

    /// Test: no network inside the sandbox
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_network_is_unreachable() {
        let (judge, _scratch) = docker_judge(problem(vec![case("", "ok")])).await;

        let source = "import socket\nsocket.create_connection((\"1.1.1.1\", 53), timeout=2)\nprint(\"ok\")\n";
        let verdict = judge_once(&judge, &submit(Language::Python, source)).await;

        assert_eq!(verdict.status, VerdictStatus::RuntimeError);
    }

    /// Test: allocating past the ceiling is a memory limit violation
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_memory_hog_is_mle() {
        let mut spec = problem(vec![case("", "done")]);
        spec.memory_limit_mb = Some(64);
        let (judge, _scratch) = docker_judge(spec).await;

        let source = "blocks = []\nwhile True:\n    blocks.append(bytearray(16 * 1024 * 1024))\n";
        let verdict = judge_once(&judge, &submit(Language::Python, source)).await;

        assert_eq!(verdict.status, VerdictStatus::MemoryLimitExceeded);
    }

    /// Test: same code, same input, same limits, same output
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_repeated_runs_are_identical() {
        let engine = DockerEngine::connect().await.expect("Failed to connect to Docker");
        let argv: Vec<String> = ["python3", "-c", "import sys; print(sys.stdin.read().upper())"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let dir = tempfile::tempdir().expect("Failed to create workdir");
            std::fs::set_permissions(
                dir.path(),
                std::os::unix::fs::PermissionsExt::from_mode(0o777),
            )
            .expect("Failed to open workdir");
            let outcome = engine
                .execute(
                    Invocation {
                        image: "python:3.12-alpine",
                        argv: &argv,
                        workdir: dir.path(),
                        stdin: Some("same input"),
                        limits: ResourceLimits::default(),
                    },
                    &CancellationToken::new(),
                )
                .await
                .expect("Execution failed");
            outcomes.push(outcome);
        }

        assert_eq!(outcomes[0].stdout, "SAME INPUT\n");
        assert_eq!(outcomes[0].stdout, outcomes[1].stdout);
        assert_eq!(outcomes[0].exit_code, outcomes[1].exit_code);
    }
}
