//! `RunningModel`: owns one child process group end-to-end.

use std::collections::BTreeMap;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use modelzoo_types::{Listener, Model, ModelStatus};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol;
use crate::supervisor::log_ring::LogRing;

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
const READER_JOIN_BUDGET: Duration = Duration::from_secs(1);
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything that changes over the lifetime of the child: the handle
/// itself, its process-group id, and the reader task draining its output.
/// Guarded by one async mutex since stop/status/spawn never need to hold it
/// for long and never block inside the lock on anything but the child
/// itself.
struct Inner {
    child: Option<Child>,
    pgid: Option<i32>,
    reader: Option<JoinHandle<()>>,
}

/// A handle to one backend process group, as spawned by a runtime driver.
///
/// `RunningModel` exclusively owns its child process group — no other
/// component signals it directly.
pub struct RunningModel {
    pub runtime_name: String,
    pub model: Model,
    pub listener: Listener,
    pub environment_name: String,
    pub logs: Arc<LogRing>,
    inner: Mutex<Inner>,
}

impl RunningModel {
    /// Spawns `argv[0] argv[1..]` as the root of a new process group,
    /// merging environments host < combined < extra < forced CUDA order,
    /// and starts the log reader. `argv` and `env` must already reflect
    /// whatever the runtime driver decided (flags, extra vars, cwd).
    pub async fn spawn(
        runtime_name: String,
        model: Model,
        listener: Listener,
        environment_name: String,
        combined_vars: BTreeMap<String, String>,
        extra_environment: BTreeMap<String, String>,
        argv: Vec<String>,
        working_directory: Option<PathBuf>,
    ) -> Result<Self> {
        anyhow::ensure!(!argv.is_empty(), "spawn requires a non-empty argv");

        let logs = Arc::new(LogRing::new());
        seed_logs(&logs, &argv, &combined_vars);

        let mut env: BTreeMap<String, String> = std::env::vars().collect();
        env.extend(combined_vars);
        env.extend(extra_environment);
        env.insert(
            modelzoo_types::CUDA_DEVICE_ORDER_KEY.to_string(),
            modelzoo_types::CUDA_DEVICE_ORDER_VALUE.to_string(),
        );

        let mut std_cmd = std::process::Command::new(&argv[0]);
        std_cmd.args(&argv[1..]);
        std_cmd.env_clear();
        std_cmd.envs(&env);
        std_cmd.stdout(Stdio::piped());
        std_cmd.stderr(Stdio::piped());
        if let Some(dir) = &working_directory {
            std_cmd.current_dir(dir);
        }
        // New process group rooted at the child itself, so the whole tree
        // (shell wrappers included) can be signalled as a unit.
        std_cmd.process_group(0);

        let mut cmd: tokio::process::Command = std_cmd.into();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", argv.join(" ")))?;

        let pid = child
            .id()
            .context("spawned child has no pid (already reaped?)")?;
        let pgid = pid as i32;

        let stdout = child.stdout.take().context("child stdout not piped")?;
        let stderr = child.stderr.take().context("child stderr not piped")?;
        let reader = spawn_log_reader(logs.clone(), stdout, stderr, runtime_name.clone());

        info!(runtime = %runtime_name, model = %model.model_name, pgid, "spawned backend process group");

        Ok(Self {
            runtime_name,
            model,
            listener,
            environment_name,
            logs,
            inner: Mutex::new(Inner {
                child: Some(child),
                pgid: Some(pgid),
                reader: Some(reader),
            }),
        })
    }

    /// `{running, ready}`. `ready` costs one HTTP round trip and is never
    /// cached.
    pub async fn status(&self) -> ModelStatus {
        let running = self.is_running().await;
        let ready = if running { self.is_ready().await } else { false };
        ModelStatus { running, ready }
    }

    async fn is_running(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let wait_result = match inner.child.as_mut() {
            Some(child) => child.try_wait(),
            None => return false,
        };

        match wait_result {
            Ok(None) => true,
            Ok(Some(_)) => {
                // Child exited on its own (crash, OOM, natural exit) and was
                // just reaped by try_wait. Clear the handle and pgid so "pgid
                // is Some iff the child is live" keeps holding, and so a
                // later stop() finds nothing to signal instead of targeting a
                // pid the OS may have already recycled for an unrelated
                // process group.
                inner.child = None;
                inner.pgid = None;
                if let Some(reader) = inner.reader.take() {
                    reader.abort();
                }
                false
            }
            Err(_) => false,
        }
    }

    async fn is_ready(&self) -> bool {
        let Some(def) = protocol::get(&self.listener.protocol) else {
            return false;
        };
        let Some(path) = def.health_check else {
            return false;
        };
        let url = format!("{}{}", self.listener.base_url(), path);

        let client = match reqwest::Client::builder()
            .timeout(READY_PROBE_TIMEOUT)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to build readiness probe client");
                return false;
            }
        };

        match client.get(&url).send().await {
            Ok(resp) => resp.status().as_u16() == def.health_status,
            Err(e) => {
                debug!(model = %self.model.model_name, error = %e, "readiness probe failed");
                false
            }
        }
    }

    /// Returns a point-in-time copy of the last 100 log lines.
    pub fn logs(&self) -> Vec<String> {
        self.logs.snapshot()
    }

    /// Terminates the process group. `no_wait = true` fires SIGTERM and
    /// returns immediately (used during global shutdown); otherwise waits
    /// up to 5s for the root to exit before escalating to SIGKILL.
    /// Stopping an already-dead group is not an error, and calling `stop`
    /// twice is a safe no-op.
    pub async fn stop(&self, no_wait: bool) {
        let mut inner = self.inner.lock().await;

        let (Some(mut child), Some(pgid)) = (inner.child.take(), inner.pgid.take()) else {
            return;
        };

        send_signal(pgid, Signal::SIGTERM);

        if !no_wait {
            match tokio::time::timeout(STOP_GRACE_PERIOD, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(pgid, "process group did not exit within grace period, sending SIGKILL");
                    send_signal(pgid, Signal::SIGKILL);
                    let _ = child.wait().await;
                }
            }
        }

        if let Some(reader) = inner.reader.take() {
            if no_wait {
                reader.abort();
            } else {
                let _ = tokio::time::timeout(READER_JOIN_BUDGET, reader).await;
            }
        }
    }
}

fn send_signal(pgid: i32, signal: Signal) {
    // Negative pid targets the whole process group (killpg semantics).
    match kill(Pid::from_raw(-pgid), signal) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => debug!(pgid, "process group already terminated"),
        Err(e) => warn!(pgid, error = %e, "failed to signal process group"),
    }
}

fn seed_logs(logs: &LogRing, argv: &[String], combined_vars: &BTreeMap<String, String>) {
    logs.push(format!("Command: {}", argv.join(" ")));
    logs.push("Environment:".to_string());
    for (key, value) in combined_vars {
        logs.push(format!("  {key}={value}"));
    }
    logs.push("---".to_string());
}

fn spawn_log_reader(
    logs: Arc<LogRing>,
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
    runtime_name: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;

        loop {
            if stdout_done && stderr_done {
                break;
            }
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(l)) => logs.push(l),
                        _ => stdout_done = true,
                    }
                }
                line = stderr_lines.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(l)) => logs.push(l),
                        _ => stderr_done = true,
                    }
                }
            }
        }
        debug!(runtime = %runtime_name, "log reader exiting, child output closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelzoo_types::{Listener, ModelFormat};

    fn sleeper_model() -> Model {
        Model {
            zoo_name: "z".into(),
            model_id: "/models/sleeper.gguf".into(),
            model_format: ModelFormat::Gguf,
            model_name: "sleeper".into(),
            model_size: None,
            api_url: None,
            api_key: None,
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let running = RunningModel::spawn(
            "llama.cpp".into(),
            sleeper_model(),
            Listener::new("openai", "0.0.0.0", 50199),
            "empty".into(),
            Default::default(),
            Default::default(),
            vec!["sleep".into(), "30".into()],
            None,
        )
        .await
        .unwrap();

        assert!(running.is_running().await);
        running.stop(true).await;
        assert!(!running.is_running().await);

        // Second call finds no child/pgid left to signal and returns
        // immediately rather than panicking or re-signalling a reused pid.
        running.stop(true).await;
        assert!(!running.is_running().await);
    }

    #[tokio::test]
    async fn status_of_dead_process_is_not_running_and_not_ready() {
        let running = RunningModel::spawn(
            "llama.cpp".into(),
            sleeper_model(),
            Listener::new("openai", "0.0.0.0", 50198),
            "empty".into(),
            Default::default(),
            Default::default(),
            vec!["true".into()],
            None,
        )
        .await
        .unwrap();

        // Give the trivially-exiting child a moment to be reaped by try_wait.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = running.status().await;
        assert!(!status.running);
        assert!(!status.ready);

        running.stop(true).await;
    }
}
