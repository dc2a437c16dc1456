// Service configuration, read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemSource {
    Dir,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Docker,
    /// Unisolated host processes. Development only.
    Local,
}

/// What happens to a request whose requester is already at their in-flight cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterLimitPolicy {
    /// Admit it; dispatch skips it until the requester drops below the cap.
    Queue,
    /// Refuse it at admission.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub redis_url: Option<String>,
    pub languages_config: PathBuf,
    pub problem_source: ProblemSource,
    pub problems_dir: PathBuf,
    pub engine: EngineKind,
    pub scratch_dir: PathBuf,
    pub max_workers: usize,
    pub max_queue_depth: usize,
    pub max_submits_per_user: usize,
    pub max_runs_per_user: usize,
    pub requester_limit_policy: RequesterLimitPolicy,
    pub run_queue_timeout: Duration,
    pub submit_queue_timeout: Duration,
    pub max_retained_results: usize,
    pub result_ttl_seconds: u64,
    pub log_format: LogFormat,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let problem_source = match get("PROBLEM_SOURCE").as_deref() {
            None | Some("dir") => ProblemSource::Dir,
            Some("redis") => ProblemSource::Redis,
            Some(other) => return Err(invalid("PROBLEM_SOURCE", other, "expected dir or redis")),
        };

        let engine = match get("EXECUTION_ENGINE").as_deref() {
            None | Some("docker") => EngineKind::Docker,
            Some("local") => EngineKind::Local,
            Some(other) => {
                return Err(invalid("EXECUTION_ENGINE", other, "expected docker or local"))
            }
        };

        let requester_limit_policy = match get("REQUESTER_LIMIT_POLICY").as_deref() {
            None | Some("queue") => RequesterLimitPolicy::Queue,
            Some("reject") => RequesterLimitPolicy::Reject,
            Some(other) => {
                return Err(invalid(
                    "REQUESTER_LIMIT_POLICY",
                    other,
                    "expected queue or reject",
                ))
            }
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other, "expected text or json")),
        };

        let redis_url = get("REDIS_URL");
        if problem_source == ProblemSource::Redis && redis_url.is_none() {
            return Err(invalid("PROBLEM_SOURCE", "redis", "REDIS_URL is not set"));
        }

        let max_workers: usize = parse_or(get("MAX_WORKERS"), "MAX_WORKERS", 4)?;
        if max_workers == 0 {
            return Err(invalid("MAX_WORKERS", "0", "must be at least 1"));
        }

        Ok(Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            redis_url,
            languages_config: get("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/languages.json")),
            problem_source,
            problems_dir: get("PROBLEMS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("problems")),
            engine,
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_workers,
            max_queue_depth: parse_or(get("MAX_QUEUE_DEPTH"), "MAX_QUEUE_DEPTH", 64)?,
            max_submits_per_user: parse_or(
                get("MAX_SUBMITS_PER_USER"),
                "MAX_SUBMITS_PER_USER",
                1,
            )?,
            max_runs_per_user: parse_or(get("MAX_RUNS_PER_USER"), "MAX_RUNS_PER_USER", 2)?,
            requester_limit_policy,
            run_queue_timeout: Duration::from_millis(parse_or(
                get("RUN_QUEUE_TIMEOUT_MS"),
                "RUN_QUEUE_TIMEOUT_MS",
                10_000,
            )?),
            submit_queue_timeout: Duration::from_millis(parse_or(
                get("SUBMIT_QUEUE_TIMEOUT_MS"),
                "SUBMIT_QUEUE_TIMEOUT_MS",
                120_000,
            )?),
            max_retained_results: parse_or(
                get("MAX_RETAINED_RESULTS"),
                "MAX_RETAINED_RESULTS",
                1024,
            )?,
            result_ttl_seconds: parse_or(get("RESULT_TTL_SECONDS"), "RESULT_TTL_SECONDS", 86_400)?,
            log_format,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &value, &e.to_string())),
    }
}
