// Problem stores (read side) and result sinks (write side) the judge talks to.
use async_trait::async_trait;
use codecraft_common::redis as keys;
use codecraft_common::types::{ProblemId, ProblemSpec, Verdict};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed problem {problem_id}: {source}")]
    Malformed {
        problem_id: ProblemId,
        source: serde_json::Error,
    },
}

/// Read-only source of problem definitions.
#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn load(&self, problem_id: ProblemId) -> Result<Option<ProblemSpec>, StoreError>;
}

/// Problems as `<dir>/<id>.json`, read on every request so edits apply
/// without a restart.
#[derive(Debug, Clone)]
pub struct DirProblemStore {
    dir: PathBuf,
}

impl DirProblemStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ProblemStore for DirProblemStore {
    async fn load(&self, problem_id: ProblemId) -> Result<Option<ProblemSpec>, StoreError> {
        let path = self.dir.join(format!("{}.json", problem_id));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        decode_problem(problem_id, &content).map(Some)
    }
}

/// Parse a stored problem. The id it was looked up by is authoritative over
/// any id inside the payload.
fn decode_problem(problem_id: ProblemId, content: &str) -> Result<ProblemSpec, StoreError> {
    let mut problem: ProblemSpec = serde_json::from_str(content)
        .map_err(|source| StoreError::Malformed { problem_id, source })?;
    problem.id = problem_id;
    Ok(problem)
}

#[derive(Clone)]
pub struct RedisProblemStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisProblemStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProblemStore for RedisProblemStore {
    async fn load(&self, problem_id: ProblemId) -> Result<Option<ProblemSpec>, StoreError> {
        let mut conn = self.conn.clone();
        keys::load_problem_payload(&mut conn, problem_id)
            .await?
            .map(|payload| decode_problem(problem_id, &payload))
            .transpose()
    }
}

/// Fixed set of problems, for tests and tooling.
#[derive(Debug, Default, Clone)]
pub struct MemoryProblemStore {
    problems: HashMap<ProblemId, ProblemSpec>,
}

impl MemoryProblemStore {
    pub fn new(problems: impl IntoIterator<Item = ProblemSpec>) -> Self {
        Self {
            problems: problems.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

#[async_trait]
impl ProblemStore for MemoryProblemStore {
    async fn load(&self, problem_id: ProblemId) -> Result<Option<ProblemSpec>, StoreError> {
        Ok(self.problems.get(&problem_id).cloned())
    }
}

/// Receives every finished `Submit` verdict exactly once.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit(&self, verdict: &Verdict) -> Result<(), StoreError>;

    /// Previously emitted verdict, when the sink can read back.
    async fn fetch(&self, _request_id: &uuid::Uuid) -> Result<Option<Verdict>, StoreError> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct RedisResultSink {
    conn: redis::aio::ConnectionManager,
    ttl_seconds: u64,
}

impl RedisResultSink {
    pub fn new(conn: redis::aio::ConnectionManager, ttl_seconds: u64) -> Self {
        Self { conn, ttl_seconds }
    }
}

#[async_trait]
impl ResultSink for RedisResultSink {
    async fn emit(&self, verdict: &Verdict) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        keys::store_verdict(&mut conn, verdict, self.ttl_seconds).await?;
        debug!(request_id = %verdict.request_id, "Verdict persisted to Redis");
        Ok(())
    }

    async fn fetch(&self, request_id: &uuid::Uuid) -> Result<Option<Verdict>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_verdict(&mut conn, request_id).await?)
    }
}

/// Sink for deployments without Redis: the verdict only reaches the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResultSink;

#[async_trait]
impl ResultSink for LogResultSink {
    async fn emit(&self, verdict: &Verdict) -> Result<(), StoreError> {
        info!(
            request_id = %verdict.request_id,
            problem_id = verdict.problem_id,
            requester = %verdict.requester_id,
            status = %verdict.status,
            passed = verdict.passed_count(),
            total = verdict.results.len(),
            total_time_ms = verdict.total_time_ms,
            peak_memory_kb = verdict.peak_memory_kb,
            "Submission verdict"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecraft_common::types::{Comparator, TestCase};

    fn sample_problem(id: ProblemId) -> ProblemSpec {
        ProblemSpec {
            id,
            comparator: Comparator::Exact,
            time_limit_ms: None,
            memory_limit_mb: None,
            test_cases: vec![TestCase {
                input: "21".to_string(),
                expected_output: "42".to_string(),
                is_sample: true,
                is_hidden: false,
            }],
        }
    }

    #[tokio::test]
    async fn test_dir_store_loads_problem_file() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{"id": 999, "time_limit_ms": 1500, "test_cases": [
            {"input": "1", "expected_output": "2", "is_sample": true}
        ]}"#;
        std::fs::write(dir.path().join("7.json"), json).unwrap();

        let store = DirProblemStore::new(dir.path());
        let problem = store.load(7).await.unwrap().unwrap();
        assert_eq!(problem.id, 7);
        assert_eq!(problem.time_limit_ms, Some(1500));
        assert_eq!(problem.test_cases.len(), 1);
        assert!(!problem.test_cases[0].is_hidden);
    }

    #[test]
    fn test_stored_problem_takes_lookup_id() {
        let payload = serde_json::to_string(&sample_problem(999)).unwrap();
        let problem = decode_problem(12, &payload).unwrap();
        assert_eq!(problem.id, 12);
        assert_eq!(problem.test_cases.len(), 1);

        let err = decode_problem(12, "{not json").unwrap_err();
        assert!(matches!(err, StoreError::Malformed { problem_id: 12, .. }));
    }

    #[tokio::test]
    async fn test_dir_store_missing_problem_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirProblemStore::new(dir.path());
        assert!(store.load(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dir_store_malformed_problem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("3.json"), "{not json").unwrap();
        let store = DirProblemStore::new(dir.path());
        let err = store.load(3).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { problem_id: 3, .. }));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryProblemStore::new(vec![sample_problem(1), sample_problem(2)]);
        assert_eq!(store.load(2).await.unwrap().unwrap().id, 2);
        assert!(store.load(3).await.unwrap().is_none());
    }
}
