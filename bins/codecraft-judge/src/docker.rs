/// Docker-based execution engine for sandboxed code execution
///
/// **Isolation Rules (per invocation):**
/// 1. Fresh container, force-removed afterwards (drop guard)
/// 2. Network disabled, all capabilities dropped, no-new-privileges
/// 3. Read-only root filesystem; only the invocation's scratch directory
///    (bind-mounted at /box) and a small /tmp tmpfs are writable
/// 4. Unprivileged user, pids limit, memory limit with no swap
/// 5. CPU budget sampled from the stats stream, with an RLIMIT_CPU backstop
/// 6. Wall clock enforced by a timer; the container is killed on expiry
///
/// The scratch directory path must be valid on the Docker host.

use crate::engine::{write_stdin, CappedOutput, EngineError, ExecutionEngine, Invocation, STDIN_FILE};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use codecraft_common::types::{ExecutionOutcome, ResourceLimits};
use futures_util::stream::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MOUNT_POINT: &str = "/box";
const SANDBOX_USER: &str = "65534:65534";
/// Exit status of a process killed by SIGXCPU (RLIMIT_CPU soft limit).
const EXIT_SIGXCPU: i64 = 128 + 24;
/// Exit status of a process killed by SIGKILL.
const EXIT_SIGKILL: i64 = 128 + 9;

/// Container cleanup guard - guarantees container removal on drop
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
        }
    }
}

impl<'a> Drop for ContainerGuard<'a> {
    fn drop(&mut self) {
        // Drop cannot be async; removal is best-effort on a detached task.
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker
                .remove_container(&container_id, Some(remove_options))
                .await
            {
                warn!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

pub struct DockerEngine {
    docker: Docker,
    available_images: Mutex<HashSet<String>>,
}

/// Resource usage sampled while the container runs.
#[derive(Default)]
struct Usage {
    cpu_ns: AtomicU64,
    peak_memory_bytes: AtomicU64,
}

enum Ending {
    Finished { stdout: CappedOutput, stderr: CappedOutput },
    OutputOverflow { stdout: CappedOutput, stderr: CappedOutput },
    WallClock,
    CpuBudget,
    Cancelled,
}

impl DockerEngine {
    /// Connect to the local Docker daemon and check that it answers.
    pub async fn connect() -> anyhow::Result<Self> {
        use anyhow::Context;

        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        docker
            .ping()
            .await
            .context("Docker daemon did not answer ping")?;

        Ok(Self {
            docker,
            available_images: Mutex::new(HashSet::new()),
        })
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        let known = self
            .available_images
            .lock()
            .map(|images| images.contains(image))
            .unwrap_or(false);
        if known {
            return Ok(());
        }

        if self.docker.inspect_image(image).await.is_err() {
            warn!(image = %image, "Image cache miss, pulling");

            let options = Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            });

            let mut stream = self.docker.create_image(options, None, None);
            while let Some(result) = stream.next().await {
                result.map_err(|e| {
                    EngineError::Sandbox(format!("failed to pull image {}: {}", image, e))
                })?;
            }

            info!(image = %image, "Image pulled");
        }

        if let Ok(mut images) = self.available_images.lock() {
            images.insert(image.to_string());
        }
        Ok(())
    }

    fn container_config(invocation: &Invocation<'_>) -> Config<String> {
        let limits = &invocation.limits;

        // The command reads its input from the scratch directory so no stdin
        // attachment is needed.
        let mut cmd = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            format!("exec \"$@\" < {}", STDIN_FILE),
            "sh".to_string(),
        ];
        cmd.extend(invocation.argv.iter().cloned());

        Config {
            image: Some(invocation.image.to_string()),
            cmd: Some(cmd),
            entrypoint: Some(vec![]),
            env: Some(vec!["HOME=/tmp".to_string(), "LANG=C.UTF-8".to_string()]),
            user: Some(SANDBOX_USER.to_string()),
            working_dir: Some(MOUNT_POINT.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(Self::host_config(invocation, limits)),
            ..Default::default()
        }
    }

    fn host_config(invocation: &Invocation<'_>, limits: &ResourceLimits) -> HostConfig {
        let memory = (limits.memory_mb * 1024 * 1024) as i64;
        let cpu_seconds = limits.cpu_time_ms.div_ceil(1000) as i64 + 1;

        HostConfig {
            binds: Some(vec![format!(
                "{}:{}:rw",
                invocation.workdir.display(),
                MOUNT_POINT
            )]),
            memory: Some(memory),
            memory_swap: Some(memory),
            nano_cpus: Some(1_000_000_000),
            pids_limit: Some(i64::from(limits.pids)),
            network_mode: Some("none".to_string()),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            tmpfs: Some(HashMap::from([(
                "/tmp".to_string(),
                "rw,nosuid,size=64m".to_string(),
            )])),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("cpu".to_string()),
                soft: Some(cpu_seconds),
                hard: Some(cpu_seconds + 1),
            }]),
            ..Default::default()
        }
    }

    /// Follow the container's output until it exits or overflows the cap.
    async fn collect_logs(&self, container_id: &str, limit: usize) -> Ending {
        let mut stdout = CappedOutput::new(limit);
        let mut stderr = CappedOutput::new(limit);

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });
        let mut logs_stream = self.docker.logs(container_id, logs_options);

        while let Some(output) = logs_stream.next().await {
            let within_cap = match output {
                Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                Ok(_) => true,
                Err(e) => {
                    warn!(container_id = %container_id, error = %e, "Error reading container logs");
                    break;
                }
            };
            if !within_cap {
                return Ending::OutputOverflow { stdout, stderr };
            }
        }

        // A non-zero exit surfaces as an error item here; the exit code is
        // read from inspect afterwards.
        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        while wait_stream.next().await.is_some() {}

        Ending::Finished { stdout, stderr }
    }

    /// Sample CPU and memory until the CPU budget is exhausted. Never returns
    /// while the container stays within budget.
    async fn watch_usage(&self, container_id: &str, cpu_budget_ns: u64, usage: &Usage) {
        let options = Some(StatsOptions {
            stream: true,
            one_shot: false,
        });
        let mut stats_stream = self.docker.stats(container_id, options);

        while let Some(Ok(stats)) = stats_stream.next().await {
            let memory = stats
                .memory_stats
                .max_usage
                .or(stats.memory_stats.usage)
                .unwrap_or(0);
            usage.peak_memory_bytes.fetch_max(memory, Ordering::Relaxed);

            let cpu_ns = stats.cpu_stats.cpu_usage.total_usage;
            usage.cpu_ns.fetch_max(cpu_ns, Ordering::Relaxed);
            if cpu_ns > cpu_budget_ns {
                return;
            }
        }

        std::future::pending::<()>().await
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute(
        &self,
        invocation: Invocation<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        write_stdin(invocation.workdir, invocation.stdin).await?;
        self.ensure_image(invocation.image).await?;

        let container_name = format!("codecraft-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), Self::container_config(&invocation))
            .await
            .map_err(|e| EngineError::Sandbox(format!("failed to create container: {}", e)))?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let start_time = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::Sandbox(format!("failed to start container: {}", e)))?;

        let limits = invocation.limits;
        let usage = Usage::default();
        let cpu_budget_ns = limits.cpu_time_ms.saturating_mul(1_000_000);

        let ending = tokio::select! {
            ending = self.collect_logs(&container_id, limits.max_output_bytes) => ending,
            _ = tokio::time::sleep(Duration::from_millis(limits.wall_time_ms)) => Ending::WallClock,
            _ = self.watch_usage(&container_id, cpu_budget_ns, &usage) => Ending::CpuBudget,
            _ = cancel.cancelled() => Ending::Cancelled,
        };
        let wall_time_ms = start_time.elapsed().as_millis() as u64;

        if !matches!(ending, Ending::Finished { .. }) {
            if let Err(e) = self
                .docker
                .kill_container(&container_id, None::<KillContainerOptions<String>>)
                .await
            {
                debug!(container_id = %container_id, error = %e, "Kill failed; container likely exited");
            }
        }

        let (stdout, stderr, mut timed_out, output_truncated) = match ending {
            Ending::Finished { stdout, stderr } => (stdout, stderr, false, false),
            Ending::OutputOverflow { stdout, stderr } => (stdout, stderr, false, true),
            Ending::WallClock | Ending::CpuBudget => {
                (CappedOutput::new(0), CappedOutput::new(0), true, false)
            }
            Ending::Cancelled => return Err(EngineError::Cancelled),
        };

        let inspect = self
            .docker
            .inspect_container(&container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| EngineError::Sandbox(format!("failed to inspect container: {}", e)))?;
        let state = inspect.state.unwrap_or_default();
        let oom_killed = state.oom_killed.unwrap_or(false);

        let peak_memory_kb = usage.peak_memory_bytes.load(Ordering::Relaxed) / 1024;
        let sampled_cpu_ms = usage.cpu_ns.load(Ordering::Relaxed) / 1_000_000;
        // Short runs can finish before the first stats sample arrives.
        let cpu_time_ms = if sampled_cpu_ms == 0 {
            wall_time_ms
        } else {
            sampled_cpu_ms
        };

        let exit_code = if timed_out { None } else { state.exit_code };
        match exit_code {
            Some(EXIT_SIGXCPU) => timed_out = true,
            Some(EXIT_SIGKILL) if !oom_killed && cpu_time_ms >= limits.cpu_time_ms => {
                timed_out = true
            }
            _ => {}
        }
        let oom = !timed_out
            && (oom_killed
                || (exit_code == Some(EXIT_SIGKILL)
                    && peak_memory_kb * 100 >= limits.memory_mb * 1024 * 95));

        debug!(
            container_id = %container_id,
            exit_code = ?exit_code,
            wall_time_ms,
            cpu_time_ms,
            peak_memory_kb,
            timed_out,
            oom,
            output_truncated,
            "Container execution finished"
        );

        Ok(ExecutionOutcome {
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            exit_code: if timed_out { None } else { exit_code },
            wall_time_ms,
            cpu_time_ms,
            peak_memory_kb,
            timed_out,
            oom,
            output_truncated,
        })
    }
}
