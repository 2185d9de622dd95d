//! Lifecycle of the long-running background tasks (game loop, address
//! sweeper, server, client).
//!
//! A worker is started, reports readiness (or a startup error) exactly once,
//! and stops cooperatively when asked:
//!
//! ```text
//! Idle --start--> Running --stop--> Stopping --task exits--> Stopped
//! ```

use crate::universe::UniverseError;
use log::error;
use std::future::Future;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to reach {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] UniverseError),
    #[error("{0} has not been started")]
    NotStarted(&'static str),
    #[error("{0} exited before it was ready")]
    ExitedEarly(&'static str),
}

/// Sending half of the "started" signal, handed to the worker task.
#[derive(Debug)]
pub struct Ready(oneshot::Sender<Result<(), WorkerError>>);

impl Ready {
    pub fn ok(self) {
        let _ = self.0.send(Ok(()));
    }

    pub fn fail(self, error: WorkerError) {
        let _ = self.0.send(Err(error));
    }
}

/// Cooperative stop signal observed by a worker task.
///
/// Also fires when the owning [`Lifecycle`] is dropped.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once a stop has been requested.
    pub async fn requested(&mut self) {
        loop {
            let stop = *self.receiver.borrow();
            if stop {
                return;
            }

            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owner-side state machine of one background task.
#[derive(Debug)]
pub struct Lifecycle {
    name: &'static str,
    state: WorkerState,
    ready: bool,
    stop_tx: Option<watch::Sender<bool>>,
    ready_rx: Option<oneshot::Receiver<Result<(), WorkerError>>>,
    handle: Option<JoinHandle<()>>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: WorkerState::Idle,
            ready: false,
            stop_tx: None,
            ready_rx: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> WorkerState {
        match (self.state, &self.handle) {
            (WorkerState::Running | WorkerState::Stopping, Some(handle)) if handle.is_finished() => {
                WorkerState::Stopped
            }
            (state, _) => state,
        }
    }

    /// Spawns the worker task. Ignored while the worker is running.
    pub fn spawn<F, Fut>(&mut self, run: F)
    where
        F: FnOnce(Ready, Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if matches!(self.state(), WorkerState::Running | WorkerState::Stopping) {
            log::warn!("{} is already running", self.name);
            return;
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = run(Ready(ready_tx), Shutdown { receiver: stop_rx });
        self.handle = Some(tokio::spawn(task));
        self.ready_rx = Some(ready_rx);
        self.stop_tx = Some(stop_tx);
        self.ready = false;
        self.state = WorkerState::Running;
    }

    /// Waits until the task reports readiness or a startup error.
    pub async fn wait_started(&mut self) -> Result<(), WorkerError> {
        if self.ready {
            return Ok(());
        }

        let receiver = self.ready_rx.take().ok_or(WorkerError::NotStarted(self.name))?;
        let result = receiver
            .await
            .unwrap_or(Err(WorkerError::ExitedEarly(self.name)));

        self.ready = result.is_ok();
        result
    }

    /// Requests a cooperative stop; does not wait for the task to exit.
    pub fn stop(&mut self) {
        if self.state != WorkerState::Running {
            return;
        }

        if let Some(stop_tx) = &self.stop_tx {
            let _ = stop_tx.send(true);
        }
        self.state = WorkerState::Stopping;
    }

    /// Waits for the task to exit.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("{} task failed: {}", self.name, e);
            }
        }

        if self.state != WorkerState::Idle {
            self.state = WorkerState::Stopped;
        }
    }
}

/// Uniform start / wait-started / stop interface of the background workers.
#[allow(async_fn_in_trait)]
pub trait AsyncWorker {
    fn lifecycle(&mut self) -> &mut Lifecycle;

    /// Spawns the worker's task; returns immediately.
    fn start(&mut self);

    async fn wait_started(&mut self) -> Result<(), WorkerError> {
        self.lifecycle().wait_started().await
    }

    fn stop(&mut self) {
        self.lifecycle().stop();
    }

    async fn join(&mut self) {
        self.lifecycle().join().await;
    }

    fn state(&mut self) -> WorkerState {
        self.lifecycle().state()
    }
}
