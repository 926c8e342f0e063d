//! Keep-alive supervisor for the reply worker.
//!
//! A single actor task owns the worker process and the keep-running flag.
//! Callers talk to it through [`SupervisorHandle`]; exits reported by the
//! per-process monitor task and restart timers arrive on the same queue, so
//! every transition is decided in one place.
//!
//! Restarts are unbounded: while the flag is set, every exit schedules a new
//! launch after the cool-down. The flag is checked again when the cool-down
//! ends, so disabling during the wait cancels the restart.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{LaunchSpec, WorkerState, WorkerStatus};

/// How long output readers may drain after the worker exits.
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);

enum Message {
    Enable,
    Disable,
    Shutdown,
    Exited { generation: u64, code: Option<i32> },
    RestartDue,
}

/// Handle to the supervisor actor. Cheap to clone.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Message>,
    status: watch::Receiver<WorkerStatus>,
}

impl SupervisorHandle {
    /// Spawn the actor. The worker is not started until [`enable`](Self::enable).
    pub fn spawn(spec: LaunchSpec, cooldown: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(WorkerStatus::default());

        let supervisor = Supervisor {
            spec,
            cooldown,
            tx: tx.clone(),
            status: status_tx,
            keep_running: false,
            worker: None,
            generation: 0,
            closing: false,
        };
        tokio::spawn(supervisor.run(rx));

        Self {
            tx,
            status: status_rx,
        }
    }

    /// Set the keep-running flag and start the worker if it is not running.
    pub fn enable(&self) {
        self.send(Message::Enable);
    }

    /// Clear the keep-running flag and ask a running worker to terminate.
    pub fn disable(&self) {
        self.send(Message::Disable);
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status.clone()
    }

    /// Disable, wait up to `grace` for the worker to exit, then stop the actor.
    ///
    /// A worker still alive after `grace` is killed when its monitor task is
    /// dropped with the runtime.
    pub async fn shutdown(&self, grace: Duration) {
        self.disable();
        let mut status = self.subscribe();
        let timed_out = tokio::time::timeout(
            grace,
            status.wait_for(|s| matches!(s.state, WorkerState::Stopped)),
        )
        .await
        .is_err();
        if timed_out {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Worker did not exit before shutdown"
            );
        }
        self.send(Message::Shutdown);
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            debug!("Supervisor already stopped");
        }
    }
}

struct LiveWorker {
    generation: u64,
    terminate: Option<oneshot::Sender<()>>,
}

struct Supervisor {
    spec: LaunchSpec,
    cooldown: Duration,
    tx: mpsc::UnboundedSender<Message>,
    status: watch::Sender<WorkerStatus>,
    keep_running: bool,
    worker: Option<LiveWorker>,
    /// Bumped on every spawn so stale exit reports are ignored.
    generation: u64,
    closing: bool,
}

impl Supervisor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Enable => self.on_enable(),
                Message::Disable => self.on_disable(),
                Message::Shutdown => {
                    self.on_disable();
                    self.closing = true;
                }
                Message::Exited { generation, code } => self.on_exited(generation, code),
                Message::RestartDue => self.on_restart_due(),
            }

            if self.closing && self.worker.is_none() {
                break;
            }
        }
        debug!("Supervisor stopped");
    }

    fn on_enable(&mut self) {
        if self.closing {
            return;
        }
        self.keep_running = true;
        self.publish(|s| s.keep_running = true);
        self.launch();
    }

    fn on_disable(&mut self) {
        self.keep_running = false;
        self.publish(|s| s.keep_running = false);

        match self.worker.as_mut() {
            Some(worker) => {
                if let Some(terminate) = worker.terminate.take() {
                    info!("Stopping worker");
                    let _ = terminate.send(());
                }
            }
            None => self.publish(|s| s.state = WorkerState::Stopped),
        }
    }

    fn on_exited(&mut self, generation: u64, code: Option<i32>) {
        if self.worker.as_ref().map(|w| w.generation) != Some(generation) {
            debug!(generation, "Ignoring exit of a stale worker");
            return;
        }
        self.worker = None;

        let keep_running = self.keep_running && !self.closing;
        self.publish(|s| {
            s.exit_count += 1;
            s.last_exit_code = code;
            s.state = if keep_running {
                WorkerState::Exited { code }
            } else {
                WorkerState::Stopped
            };
        });

        if keep_running {
            warn!(
                code = ?code,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Worker exited, restarting after cool-down"
            );
            let tx = self.tx.clone();
            let cooldown = self.cooldown;
            tokio::spawn(async move {
                tokio::time::sleep(cooldown).await;
                let _ = tx.send(Message::RestartDue);
            });
        } else {
            info!(code = ?code, "Worker exited");
        }
    }

    fn on_restart_due(&mut self) {
        if self.keep_running && !self.closing {
            self.launch();
        } else if self.worker.is_none() {
            self.publish(|s| s.state = WorkerState::Stopped);
        }
    }

    /// Start a worker if one should run and none is live.
    fn launch(&mut self) {
        if !self.keep_running || self.worker.is_some() {
            return;
        }
        self.publish(|s| s.state = WorkerState::Starting);

        let spawned = self
            .spec
            .build_command()
            .and_then(|mut cmd| cmd.spawn().map_err(Into::into));
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "Failed to launch worker");
                let message = e.to_string();
                self.publish(|s| {
                    s.state = WorkerState::Stopped;
                    s.last_error = Some(message);
                });
                return;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let pid = child.id();
        info!(pid = ?pid, script = %self.spec.script.display(), "Worker started");

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_output(stdout, OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_output(stderr, OutputStream::Stderr));
        }

        let (terminate_tx, terminate_rx) = oneshot::channel();
        tokio::spawn(monitor_worker(
            child,
            readers,
            terminate_rx,
            self.tx.clone(),
            generation,
        ));

        self.worker = Some(LiveWorker {
            generation,
            terminate: Some(terminate_tx),
        });
        self.publish(|s| {
            s.spawn_count += 1;
            s.last_error = None;
            s.state = WorkerState::Running { pid };
        });
    }

    fn publish(&self, update: impl FnOnce(&mut WorkerStatus)) {
        self.status.send_modify(update);
    }
}

/// Wait for the worker to exit (or be told to terminate) and report back.
async fn monitor_worker(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut terminate: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<Message>,
    generation: u64,
) {
    let status = tokio::select! {
        result = child.wait() => result,
        Ok(()) = &mut terminate => {
            request_termination(&mut child);
            child.wait().await
        }
    };

    let code = match status {
        Ok(s) => s.code(),
        Err(e) => {
            warn!(error = %e, "Waiting on worker failed");
            None
        }
    };

    // Descendants may still hold the pipes open.
    for mut reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    let _ = tx.send(Message::Exited { generation, code });
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain kill(2) on a pid we spawned and have not yet reaped.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            return;
        }
        debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill failed");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill failed");
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Forward worker output line by line into the log.
fn forward_output<R>(reader: R, stream: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match stream {
                    OutputStream::Stdout => info!(target: "moodreply::worker", "{line}"),
                    OutputStream::Stderr => warn!(target: "moodreply::worker", "{line}"),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(?stream, error = %e, "Worker output closed");
                    break;
                }
            }
        }
    })
}
