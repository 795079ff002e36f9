//! Lifecycle progress events
//!
//! The controller and driver report progress through this seam instead of
//! writing to the console themselves, so operational output stays decoupled
//! from control flow.

use std::path::Path;

/// Which indexer invocation a child-output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    IndexUpdate,
    Server,
}

/// Progress and error events emitted while driving one height's cycle.
#[derive(Debug)]
pub enum LifecycleEvent<'a> {
    UpdatingIndex { height: u64 },
    IndexUpdated { height: u64 },
    ServerSpawned { height: u64, port: u16 },
    WaitingForServer { height: u64, reported: Option<u64> },
    ServerReady { height: u64 },
    Capturing { height: u64 },
    SnapshotPersisted {
        height: u64,
        runes: usize,
        path: &'a Path,
    },
    TerminatingServer { height: u64 },
    ServerExited { height: u64, code: Option<i32> },
    ChildOutput { kind: ChildKind, line: &'a str },
    CycleFailed { height: u64, error: &'a str },
}

/// Sink for lifecycle events.
pub trait Reporter: Send + Sync {
    fn event(&self, event: LifecycleEvent<'_>);
}

/// Default reporter: renders events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn event(&self, event: LifecycleEvent<'_>) {
        use LifecycleEvent::*;
        match event {
            UpdatingIndex { height } => log::info!("updating index for height {height}"),
            IndexUpdated { height } => log::info!("index updated for height {height}"),
            ServerSpawned { height, port } => {
                log::info!("spawned server for height {height} on port {port}")
            }
            WaitingForServer { height, reported } => match reported {
                Some(reported) => log::debug!(
                    "waiting for server: at height {reported}, want {height}"
                ),
                None => log::debug!("waiting for server: not listening yet"),
            },
            ServerReady { height } => log::info!("server ready at height {height}"),
            Capturing { height } => log::info!("capturing state at height {height}"),
            SnapshotPersisted { height, runes, path } => log::info!(
                "persisted {runes} runes for height {height} to {}",
                path.display()
            ),
            TerminatingServer { height } => log::info!("terminating server for height {height}"),
            ServerExited { height, code } => {
                log::info!("server for height {height} exited with code {code:?}")
            }
            ChildOutput { kind, line } => {
                let tag = match kind {
                    ChildKind::IndexUpdate => "index",
                    ChildKind::Server => "server",
                };
                log::debug!("[{tag}] {line}");
            }
            CycleFailed { height, error } => {
                log::error!("cycle for height {height} failed: {error}")
            }
        }
    }
}

/// Reporter that drops everything; handy in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn event(&self, _event: LifecycleEvent<'_>) {}
}
