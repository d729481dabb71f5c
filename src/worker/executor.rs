use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::config::SandboxConfig;
use crate::scheduler::{ExecutionStatus, JobDescriptor};

/// What a runner reports back for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub outputs: Value,
    pub status: ExecutionStatus,
}

/// The execution engine. The queue overlay never looks inside a job; it
/// hands descriptors to a runner and records whatever comes back.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &JobDescriptor) -> RunOutcome;
}

/// Completes every job immediately, echoing its payload as the output.
#[derive(Debug, Clone, Default)]
pub struct NoopRunner;

#[async_trait]
impl JobRunner for NoopRunner {
    async fn run(&self, job: &JobDescriptor) -> RunOutcome {
        RunOutcome {
            outputs: json!({ "payload": job.payload }),
            status: ExecutionStatus::success(),
        }
    }
}

/// Runs the payload's `command` string in a sandboxed Docker container.
///
/// Containers run with:
/// - Network isolation (disabled by default)
/// - Dropped capabilities
/// - Read-only root filesystem
/// - Memory and CPU limits
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn docker_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if self.config.network_disabled {
            args.push("--network=none".to_string());
        }
        if let Some(ref limit) = self.config.memory_limit {
            args.push(format!("--memory={}", limit));
        }
        if let Some(ref limit) = self.config.cpu_limit {
            args.push(format!("--cpus={}", limit));
        }

        args.push("--cap-drop=ALL".to_string());
        args.push("--security-opt=no-new-privileges".to_string());
        args.push("--read-only".to_string());

        args.push(self.config.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(command.to_string());
        args
    }

    fn process_output(
        job: &JobDescriptor,
        result: Result<std::process::Output, std::io::Error>,
    ) -> RunOutcome {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                let status = if output.status.success() {
                    ExecutionStatus::success()
                } else if stderr.is_empty() {
                    ExecutionStatus::error(format!("Exit code: {:?}", exit_code))
                } else {
                    ExecutionStatus::error(stderr.clone())
                };

                tracing::info!(
                    job_id = %job.id,
                    status = %status.status_str,
                    exit_code = ?exit_code,
                    "Job finished"
                );

                RunOutcome {
                    outputs: json!({
                        "exit_code": exit_code,
                        "stdout": stdout,
                        "stderr": stderr,
                    }),
                    status,
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Job execution failed");
                RunOutcome {
                    outputs: Value::Null,
                    status: ExecutionStatus::error(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl JobRunner for SandboxRunner {
    async fn run(&self, job: &JobDescriptor) -> RunOutcome {
        let Some(command) = job.payload.get("command").and_then(Value::as_str) else {
            return RunOutcome {
                outputs: Value::Null,
                status: ExecutionStatus::error("payload has no command"),
            };
        };

        tracing::info!(job_id = %job.id, command, image = %self.config.image, "Executing job");

        let result = Command::new("docker")
            .args(self.docker_args(command))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Self::process_output(job, result)
    }
}
