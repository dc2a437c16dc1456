use crate::types::{ProblemId, Verdict};
use redis::{AsyncCommands, RedisResult};

/// Redis key layout shared by the judge service and whatever consumes its
/// verdicts. Keys are deterministic so producers and consumers never drift.

pub const PROBLEM_PREFIX: &str = "codecraft:problem";
pub const VERDICT_PREFIX: &str = "codecraft:verdict";
/// List of persisted verdict ids, newest first, for the statistics consumer.
pub const VERDICT_LIST: &str = "codecraft:verdicts";

pub fn problem_key(problem_id: ProblemId) -> String {
    format!("{}:{}", PROBLEM_PREFIX, problem_id)
}

pub fn verdict_key(request_id: &uuid::Uuid) -> String {
    format!("{}:{}", VERDICT_PREFIX, request_id)
}

fn json_error(context: &'static str, e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, context, e.to_string()))
}

/// Raw JSON of a problem definition. Read-only: the judge never writes
/// problems.
pub async fn load_problem_payload(
    conn: &mut redis::aio::ConnectionManager,
    problem_id: ProblemId,
) -> RedisResult<Option<String>> {
    conn.get(problem_key(problem_id)).await
}

/// Persist a verdict with a TTL and announce it on the verdict list.
pub async fn store_verdict(
    conn: &mut redis::aio::ConnectionManager,
    verdict: &Verdict,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let key = verdict_key(&verdict.request_id);
    let payload =
        serde_json::to_string(verdict).map_err(|e| json_error("serialization error", e))?;

    let _: () = conn.set_ex(&key, payload, ttl_seconds).await?;
    let _: () = conn
        .lpush(VERDICT_LIST, verdict.request_id.to_string())
        .await?;

    Ok(())
}

pub async fn get_verdict(
    conn: &mut redis::aio::ConnectionManager,
    request_id: &uuid::Uuid,
) -> RedisResult<Option<Verdict>> {
    let payload: Option<String> = conn.get(verdict_key(request_id)).await?;

    match payload {
        Some(data) => {
            let verdict: Verdict =
                serde_json::from_str(&data).map_err(|e| json_error("deserialization error", e))?;
            Ok(Some(verdict))
        }
        None => Ok(None),
    }
}
