//! Ord process lifecycle controller
//!
//! Drives one external indexer binary through an index-update/serve cycle
//! per target height: spawn `index update` and wait for it to finish, spawn
//! `server`, poll until it reports the target height, hand the live
//! endpoint to the snapshot builder, persist, then shut the server down.
//! The indexer's data directory and HTTP port are exclusively owned for the
//! duration of a cycle; cycles never overlap.

use crate::capture::{build_snapshot, CaptureError, Strategy};
use crate::events::{ChildKind, LifecycleEvent, Reporter};
use crate::ord_client::{OrdApiConfig, OrdClient};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to spawn indexer ({mode})")]
    ProcessSpawnFailed {
        mode: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("index update for height {height} exited with code {code:?}")]
    IndexUpdateFailed { height: u64, code: Option<i32> },
    #[error("server overshot target height {target}: reports {reported}")]
    HeightOvershoot { target: u64, reported: u64 },
    #[error("server not ready after {elapsed:?} (target height {target})")]
    ReadyTimeout { target: u64, elapsed: Duration },
    #[error("server exited with code {code:?} while waiting for readiness")]
    ServerExited { code: Option<i32> },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to persist snapshot")]
    Persist(#[source] std::io::Error),
}

/// Indexer invocation and timing parameters. Validated once, up front,
/// rather than read from ambient state mid-run.
#[derive(Debug, Clone)]
pub struct OrdConfig {
    /// Indexer executable: a path, or a bare name resolved from PATH.
    pub executable: PathBuf,
    /// Index data directory, exclusively owned while a cycle runs.
    pub data_dir: PathBuf,
    /// Port the serve mode binds.
    pub http_port: u16,
    pub bitcoin_rpc_url: String,
    pub bitcoin_rpc_username: String,
    pub bitcoin_rpc_password: String,
    /// Where snapshots land, under one subdirectory per run label.
    pub states_dir: PathBuf,
    /// Delay between readiness probes.
    pub poll_interval: Duration,
    /// Hard bound on the readiness wait; a server that has not reached the
    /// target height by then fails the cycle instead of blocking forever.
    pub ready_timeout: Duration,
    /// How long to wait after SIGINT before escalating to SIGKILL.
    pub term_grace: Duration,
}

impl OrdConfig {
    pub fn new(
        executable: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        http_port: u16,
        bitcoin_rpc_url: impl Into<String>,
        bitcoin_rpc_username: impl Into<String>,
        bitcoin_rpc_password: impl Into<String>,
        states_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            data_dir: data_dir.into(),
            http_port,
            bitcoin_rpc_url: bitcoin_rpc_url.into(),
            bitcoin_rpc_username: bitcoin_rpc_username.into(),
            bitcoin_rpc_password: bitcoin_rpc_password.into(),
            states_dir: states_dir.into(),
            poll_interval: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(120),
            term_grace: Duration::from_secs(30),
        }
    }

    /// Resolve and sanity-check everything that can fail before any
    /// process is spawned.
    pub fn validate(mut self) -> Result<Self, LifecycleError> {
        if self.executable.components().count() == 1 {
            self.executable = which::which(&self.executable).map_err(|e| {
                LifecycleError::Config(format!(
                    "indexer executable {:?} not found in PATH: {e}",
                    self.executable
                ))
            })?;
        } else if !self.executable.is_file() {
            return Err(LifecycleError::Config(format!(
                "indexer executable {} does not exist",
                self.executable.display()
            )));
        }
        if self.http_port == 0 {
            return Err(LifecycleError::Config("http port must be non-zero".into()));
        }
        if self.bitcoin_rpc_url.is_empty() {
            return Err(LifecycleError::Config("bitcoin RPC URL is empty".into()));
        }
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| LifecycleError::Config(format!("cannot create data dir: {e}")))?;
        std::fs::create_dir_all(&self.states_dir)
            .map_err(|e| LifecycleError::Config(format!("cannot create states dir: {e}")))?;
        Ok(self)
    }

    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }
}

/// Controller for one indexer instance.
pub struct OrdIndexer {
    config: OrdConfig,
    reporter: Arc<dyn Reporter>,
}

impl OrdIndexer {
    /// Build a controller over a validated config.
    pub fn new(config: OrdConfig, reporter: Arc<dyn Reporter>) -> Result<Self, LifecycleError> {
        let config = config.validate()?;
        Ok(Self { config, reporter })
    }

    pub fn config(&self) -> &OrdConfig {
        &self.config
    }

    /// Flags shared by both invocation modes. The height limit is one past
    /// the target so the index stops exactly at `height`.
    fn base_args(&self, height: u64) -> Vec<String> {
        vec![
            "--chain".into(),
            "mainnet".into(),
            "--bitcoin-rpc-url".into(),
            self.config.bitcoin_rpc_url.clone(),
            "--bitcoin-rpc-username".into(),
            self.config.bitcoin_rpc_username.clone(),
            "--bitcoin-rpc-password".into(),
            self.config.bitcoin_rpc_password.clone(),
            "--index-runes".into(),
            "--no-index-inscriptions".into(),
            "--height-limit".into(),
            (height + 1).to_string(),
            "--data-dir".into(),
            self.config.data_dir.display().to_string(),
        ]
    }

    fn spawn(&self, args: &[String], mode: &'static str) -> Result<Child, LifecycleError> {
        Command::new(&self.config.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LifecycleError::ProcessSpawnFailed { mode, source })
    }

    /// Forward child stdout/stderr to the reporter as lines arrive.
    fn forward_output(&self, child: &mut Child, kind: ChildKind) {
        if let Some(stdout) = child.stdout.take() {
            let reporter = self.reporter.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    reporter.event(LifecycleEvent::ChildOutput { kind, line: &line });
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let reporter = self.reporter.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    reporter.event(LifecycleEvent::ChildOutput { kind, line: &line });
                }
            });
        }
    }

    /// Run `index update` up to `height` and wait for it to exit.
    pub async fn update_index(&self, height: u64) -> Result<(), LifecycleError> {
        self.reporter.event(LifecycleEvent::UpdatingIndex { height });

        let mut args = self.base_args(height);
        args.extend(["index".to_string(), "update".to_string()]);
        let mut child = self.spawn(&args, "index update")?;
        self.forward_output(&mut child, ChildKind::IndexUpdate);

        let status = child
            .wait()
            .await
            .map_err(|source| LifecycleError::ProcessSpawnFailed {
                mode: "index update",
                source,
            })?;
        if !status.success() {
            return Err(LifecycleError::IndexUpdateFailed {
                height,
                code: status.code(),
            });
        }

        self.reporter.event(LifecycleEvent::IndexUpdated { height });
        Ok(())
    }

    /// Poll `/blockheight` until the server reports exactly `height`.
    ///
    /// A failed probe means "not listening yet" and is retried after the
    /// poll interval, never treated as an error on its own. What does end
    /// the wait: the target height (ready), a greater height (the instance
    /// mis-synced), child exit, or the readiness timeout.
    async fn wait_until_ready(
        &self,
        child: &mut Child,
        client: &OrdClient,
        height: u64,
    ) -> Result<(), LifecycleError> {
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(|source| {
                LifecycleError::ProcessSpawnFailed {
                    mode: "server",
                    source,
                }
            })? {
                return Err(LifecycleError::ServerExited {
                    code: status.code(),
                });
            }

            match client.block_height().await {
                Ok(reported) if reported == height => {
                    self.reporter.event(LifecycleEvent::ServerReady { height });
                    return Ok(());
                }
                Ok(reported) if reported > height => {
                    return Err(LifecycleError::HeightOvershoot {
                        target: height,
                        reported,
                    });
                }
                Ok(reported) => {
                    self.reporter.event(LifecycleEvent::WaitingForServer {
                        height,
                        reported: Some(reported),
                    });
                }
                Err(_) => {
                    self.reporter.event(LifecycleEvent::WaitingForServer {
                        height,
                        reported: None,
                    });
                }
            }

            if start.elapsed() >= self.config.ready_timeout {
                return Err(LifecycleError::ReadyTimeout {
                    target: height,
                    elapsed: start.elapsed(),
                });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Interrupt the server and wait for it to exit, escalating to SIGKILL
    /// after the grace period. The exit code is informational only.
    async fn shutdown(&self, mut child: Child, height: u64) -> Option<i32> {
        self.reporter
            .event(LifecycleEvent::TerminatingServer { height });

        if let Some(pid) = child.id() {
            // SAFETY: pid came from a live child we own.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }

        let code = match tokio::time::timeout(self.config.term_grace, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(_)) => None,
            Err(_) => {
                let _ = child.start_kill();
                child.wait().await.ok().and_then(|s| s.code())
            }
        };
        self.reporter
            .event(LifecycleEvent::ServerExited { height, code });
        code
    }

    /// Serve, wait for readiness, capture, persist, terminate: the full
    /// serve-side cycle for one height. Returns the persisted snapshot
    /// path. The index for `height` must already be up to date.
    pub async fn capture_height(
        &self,
        height: u64,
        label: &str,
        strategy: Strategy,
        fan_out: usize,
    ) -> Result<PathBuf, LifecycleError> {
        let client = OrdClient::new(OrdApiConfig::new(self.config.endpoint()))
            .map_err(CaptureError::SourceUnavailable)?;

        let mut args = self.base_args(height);
        args.extend([
            "server".to_string(),
            "--http-port".to_string(),
            self.config.http_port.to_string(),
        ]);
        let mut child = self.spawn(&args, "server")?;
        self.forward_output(&mut child, ChildKind::Server);
        self.reporter.event(LifecycleEvent::ServerSpawned {
            height,
            port: self.config.http_port,
        });

        if let Err(e) = self.wait_until_ready(&mut child, &client, height).await {
            // The cycle failed before capture; don't leave the port held.
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(e);
        }

        self.reporter.event(LifecycleEvent::Capturing { height });
        let captured = build_snapshot(&client, height, strategy, fan_out).await;

        // Capture completes (or fails) before termination is issued; the
        // server must stay up for the whole read either way.
        let persisted = match captured {
            Ok(snapshot) => snapshot
                .save(&self.config.states_dir, label)
                .map_err(LifecycleError::Persist)
                .map(|path| (path, snapshot.runes.len())),
            Err(e) => Err(e.into()),
        };
        self.shutdown(child, height).await;

        let (path, runes) = persisted?;
        self.reporter.event(LifecycleEvent::SnapshotPersisted {
            height,
            runes,
            path: &path,
        });
        Ok(path)
    }
}
