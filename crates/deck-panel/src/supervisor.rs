//! Lifecycle of the one external gateway process.
//!
//! The supervisor owns at most one child at a time. A per-launch monitor
//! task reads the child's output, decides readiness and notices exit; the
//! shared state only ever records the outcome. Every launch gets a
//! generation number so a monitor whose process was already stopped (or
//! replaced by a restart) cannot clobber the state of its successor.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use deck_types::event::PanelEvent;
use deck_types::gateway::{GatewaySnapshot, GatewayStatus, Readiness};

use crate::error::SupervisorError;
use crate::events::EventBus;
use crate::readiness::{MarkerPolicy, ReadinessPolicy, Verdict};

/// Output kept for readiness matching; older text is discarded.
const MAX_ASSESSED_OUTPUT: usize = 64 * 1024;

/// How long to wait for trailing output once the child has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// The executable and arguments used to launch the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl GatewayCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `<bin> gateway start --foreground`
    pub fn foreground(bin: impl Into<String>) -> Self {
        Self::new(bin, ["gateway", "start", "--foreground"])
    }

    /// Platform name of the gateway CLI.
    pub fn default_program() -> &'static str {
        if cfg!(windows) {
            "openclaw.cmd"
        } else {
            "openclaw"
        }
    }
}

impl Default for GatewayCommand {
    fn default() -> Self {
        Self::foreground(Self::default_program())
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub command: GatewayCommand,
    /// With no readiness verdict after this long, the gateway is assumed up.
    pub grace_period: Duration,
    /// Pause between stop and start on restart.
    pub restart_delay: Duration,
    /// Captured output lines kept for log tailing.
    pub log_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            command: GatewayCommand::default(),
            grace_period: Duration::from_secs(10),
            restart_delay: Duration::from_secs(1),
            log_capacity: 500,
        }
    }
}

type ReadySender = oneshot::Sender<Result<Readiness, SupervisorError>>;

struct ProcessHandle {
    generation: u64,
    pid: Option<u32>,
    /// Dropping this tells the monitor to kill the child.
    _kill: oneshot::Sender<()>,
}

#[derive(Default)]
struct SupervisorState {
    status: GatewayStatus,
    started_at: Option<DateTime<Utc>>,
    handle: Option<ProcessHandle>,
    next_generation: u64,
}

struct Shared {
    state: Mutex<SupervisorState>,
    output: Mutex<LineRing>,
    events: EventBus,
    policy: Arc<dyn ReadinessPolicy>,
    options: SupervisorOptions,
}

/// Handle to the gateway supervisor. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions, events: EventBus) -> Self {
        Self::with_policy(options, events, MarkerPolicy::default())
    }

    pub fn with_policy(
        options: SupervisorOptions,
        events: EventBus,
        policy: impl ReadinessPolicy + 'static,
    ) -> Self {
        let output = LineRing::new(options.log_capacity);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SupervisorState::default()),
                output: Mutex::new(output),
                events,
                policy: Arc::new(policy),
                options,
            }),
        }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.shared.options
    }

    /// Launch the gateway and wait until it is ready, the grace period
    /// passes, or it fails.
    pub async fn start(&self) -> Result<Readiness, SupervisorError> {
        let ready = self.launch()?;
        ready.await.unwrap_or(Err(SupervisorError::Lost))
    }

    fn launch(&self) -> Result<oneshot::Receiver<Result<Readiness, SupervisorError>>, SupervisorError> {
        let shared = &self.shared;
        let command = &shared.options.command;

        let mut state = shared.state.lock();
        if state.handle.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %command.program, "Failed to launch gateway: {e}");
                state.status = GatewayStatus::Error;
                shared.publish_status(GatewayStatus::Error);
                state.status = GatewayStatus::Stopped;
                state.started_at = None;
                shared.publish_status(GatewayStatus::Stopped);
                return Err(SupervisorError::Spawn {
                    program: command.program.clone(),
                    message: e.to_string(),
                });
            }
        };

        let generation = state.next_generation;
        state.next_generation += 1;
        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        state.handle = Some(ProcessHandle {
            generation,
            pid,
            _kill: kill_tx,
        });
        state.status = GatewayStatus::Starting;
        state.started_at = None;
        shared.publish_status(GatewayStatus::Starting);
        drop(state);

        info!(?pid, program = %command.program, "Gateway launched");

        let (chunk_tx, chunk_rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, chunk_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, chunk_tx));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let monitor = Monitor {
            shared: Arc::clone(shared),
            generation,
            ready: Some(ready_tx),
            output: String::new(),
        };
        tokio::spawn(monitor.run(child, chunk_rx, kill_rx));

        Ok(ready_rx)
    }

    /// Terminate the owned process, if any, and mark the gateway stopped.
    /// Returns whether there was a process to stop.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.state.lock();
        let handle = state.handle.take();
        let changed = state.status != GatewayStatus::Stopped;
        state.status = GatewayStatus::Stopped;
        state.started_at = None;
        if changed || handle.is_some() {
            self.shared.publish_status(GatewayStatus::Stopped);
        }
        match handle {
            Some(handle) => {
                info!(pid = ?handle.pid, "Stopping gateway");
                true
            }
            None => false,
        }
    }

    pub async fn restart(&self) -> Result<Readiness, SupervisorError> {
        self.stop();
        tokio::time::sleep(self.shared.options.restart_delay).await;
        self.start().await
    }

    /// Last recorded status. The process is not probed, so an exit that the
    /// monitor has not observed yet is not reflected.
    pub fn status(&self) -> GatewayStatus {
        self.shared.state.lock().status
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        let state = self.shared.state.lock();
        let uptime_seconds = match (state.status, state.started_at) {
            (GatewayStatus::Running, Some(at)) => Some((Utc::now() - at).num_seconds().max(0)),
            _ => None,
        };
        GatewaySnapshot {
            status: state.status,
            started_at: state.started_at,
            pid: state.handle.as_ref().and_then(|h| h.pid),
            uptime_seconds,
        }
    }

    /// The last `lines` lines of captured output, oldest first.
    pub fn recent_output(&self, lines: usize) -> Vec<String> {
        self.shared.output.lock().tail(lines)
    }
}

impl Shared {
    fn publish_status(&self, status: GatewayStatus) {
        self.events.send(PanelEvent::GatewayStatus { status });
    }

    fn capture(&self, chunk: &str) {
        self.output.lock().push(chunk);
        self.events.send(PanelEvent::GatewayLog {
            chunk: chunk.to_string(),
        });
    }

    fn owns(state: &SupervisorState, generation: u64) -> bool {
        state
            .handle
            .as_ref()
            .is_some_and(|h| h.generation == generation)
    }

    /// Starting → Running for the given launch. False if it no longer owns
    /// the handle.
    fn mark_running(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if !Self::owns(&state, generation) || state.status != GatewayStatus::Starting {
            return false;
        }
        state.status = GatewayStatus::Running;
        state.started_at = Some(Utc::now());
        self.publish_status(GatewayStatus::Running);
        true
    }

    /// Drop the handle of the given launch and mark the gateway stopped.
    /// False if the handle was already taken by `stop()` or a newer launch.
    fn release(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if !Self::owns(&state, generation) {
            return false;
        }
        state.handle = None;
        state.status = GatewayStatus::Stopped;
        state.started_at = None;
        self.publish_status(GatewayStatus::Stopped);
        true
    }
}

enum Step {
    Chunk(Option<String>),
    GraceElapsed,
    Kill,
    Exited(std::io::Result<std::process::ExitStatus>),
}

/// Watches one launched process until it exits.
struct Monitor {
    shared: Arc<Shared>,
    generation: u64,
    /// Pending `start()` caller; `None` once answered.
    ready: Option<ReadySender>,
    output: String,
}

impl Monitor {
    async fn run(
        mut self,
        mut child: Child,
        mut chunks: mpsc::Receiver<String>,
        mut kill: oneshot::Receiver<()>,
    ) {
        let grace = tokio::time::sleep(self.shared.options.grace_period);
        tokio::pin!(grace);
        let mut chunks_open = true;
        let mut killing = false;

        let exit = loop {
            let step = tokio::select! {
                chunk = chunks.recv(), if chunks_open => Step::Chunk(chunk),
                _ = &mut grace, if self.ready.is_some() => Step::GraceElapsed,
                _ = &mut kill, if !killing => Step::Kill,
                status = child.wait() => Step::Exited(status),
            };

            match step {
                Step::Chunk(Some(chunk)) => {
                    if self.on_chunk(&chunk) && !killing {
                        killing = true;
                        terminate(&mut child);
                    }
                }
                Step::Chunk(None) => chunks_open = false,
                Step::GraceElapsed => self.on_grace_elapsed(),
                Step::Kill => {
                    killing = true;
                    terminate(&mut child);
                }
                Step::Exited(status) => break status,
            }
        };

        // Output written just before exit may still be in flight.
        while chunks_open {
            match tokio::time::timeout(DRAIN_TIMEOUT, chunks.recv()).await {
                Ok(Some(chunk)) => self.shared.capture(&chunk),
                _ => chunks_open = false,
            }
        }

        let code = match exit {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait for gateway: {e}");
                None
            }
        };
        let owned = self.shared.release(self.generation);
        info!(?code, "Gateway exited");

        if let Some(ready) = self.ready.take() {
            let err = if owned {
                SupervisorError::Exited { code }
            } else {
                SupervisorError::Cancelled
            };
            let _ = ready.send(Err(err));
        }
    }

    /// Returns true when the child must be terminated.
    fn on_chunk(&mut self, chunk: &str) -> bool {
        self.shared.capture(chunk);

        let Some(ready) = self.ready.take() else {
            return false;
        };

        self.output.push_str(chunk);
        if self.output.len() > MAX_ASSESSED_OUTPUT {
            let mut cut = self.output.len() - MAX_ASSESSED_OUTPUT / 2;
            while !self.output.is_char_boundary(cut) {
                cut += 1;
            }
            self.output.drain(..cut);
        }

        match self.shared.policy.assess(&self.output) {
            Verdict::Unknown => {
                self.ready = Some(ready);
                false
            }
            Verdict::Ready => {
                let result = if self.shared.mark_running(self.generation) {
                    info!("Gateway is ready");
                    Ok(Readiness::Observed)
                } else {
                    Err(SupervisorError::Cancelled)
                };
                let _ = ready.send(result);
                false
            }
            Verdict::Failed(reason) => {
                warn!(%reason, "Gateway reported a startup failure");
                self.shared.release(self.generation);
                let _ = ready.send(Err(SupervisorError::NotReady(reason)));
                true
            }
        }
    }

    fn on_grace_elapsed(&mut self) {
        let Some(ready) = self.ready.take() else {
            return;
        };
        let result = if self.shared.mark_running(self.generation) {
            warn!(
                grace = ?self.shared.options.grace_period,
                "No readiness marker seen; assuming the gateway is running"
            );
            Ok(Readiness::Assumed)
        } else {
            Err(SupervisorError::Cancelled)
        };
        let _ = ready.send(result);
    }
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to signal gateway: {e}");
    } else {
        debug!(pid = ?child.id(), "Kill signal sent");
    }
}

/// Forward raw output chunks until EOF or the receiver goes away.
async fn forward_output<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Gateway output stream closed: {e}");
                break;
            }
        }
    }
}

/// An unterminated tail longer than this is kept as a line of its own.
const MAX_PARTIAL_LINE: usize = 4096;

/// Bounded buffer of complete output lines plus the unterminated tail.
struct LineRing {
    lines: VecDeque<String>,
    partial: String,
    capacity: usize,
}

impl LineRing {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            partial: String::new(),
            capacity,
        }
    }

    fn push(&mut self, chunk: &str) {
        self.partial.push_str(chunk);
        while let Some(pos) = self.partial.find('\n') {
            let line = self.partial[..pos].trim_end_matches('\r').to_string();
            self.partial.drain(..=pos);
            self.push_line(line);
        }
        if self.partial.len() >= MAX_PARTIAL_LINE {
            let line = std::mem::take(&mut self.partial);
            self.push_line(line);
        }
    }

    fn push_line(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn tail(&self, n: usize) -> Vec<String> {
        let mut all: Vec<String> = self.lines.iter().cloned().collect();
        if !self.partial.is_empty() {
            all.push(self.partial.clone());
        }
        let skip = all.len().saturating_sub(n);
        all.split_off(skip)
    }
}
