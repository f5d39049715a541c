//! # Session Controller Module
//!
//! Owns the recording session state machine. All state lives inside a single
//! Tokio task; user actions, timers, lifecycle notifications, sensor samples
//! and export results all reach it as messages and are handled one at a time.
//!
//! ## State Machine
//! ```text
//!            start() ok
//!   Idle ───────────────────▶ Recording
//!    ▲                            │
//!    └────────────────────────────┘
//!      stop(User | Timeout | Backgrounded | SourceSilent)
//! ```
//! Every stop trigger goes through the same `stop()`, which flips the state to
//! Idle before doing anything else. A trigger that arrives later finds the
//! controller Idle and does nothing, so a session is exported at most once.
//!
//! ## Key Components
//! - `SessionController`: the owner task
//! - `SessionHandle`: cloneable front end usable from any thread or task
//! - `Status`: read-only view published through a `watch` channel

use crate::buffer::{SampleBuffer, DISPLAY_WINDOW};
use crate::config::Config;
use crate::error::{PreconditionError, SessionError, SourceError};
use crate::export::{CsvExporter, ExportReport, ExportWorker};
use crate::sample::{Sample, SensorKind};
use crate::source::{Authorization, EventSource, SourceStreams};
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
}

/// What ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Toggle, explicit stop, or controller shutdown
    User,
    /// The maximum session duration elapsed
    Timeout,
    /// The application moved to the background
    Backgrounded,
    /// No sample arrived within the liveness timeout
    SourceSilent,
}

impl StopReason {
    fn describe(&self) -> Option<&'static str> {
        match self {
            StopReason::User => None,
            StopReason::Timeout => Some("Stopped: time limit reached"),
            StopReason::Backgrounded => Some("Stopped: app moved to background"),
            StopReason::SourceSilent => Some("Stopped: sensor went quiet"),
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No session was active; nothing happened
    NotRecording,
    /// The session ended without samples; no file is written
    NoData,
    /// The frozen samples were handed to the export thread
    Exporting { samples: usize },
    /// The export thread is gone and the samples were discarded
    ExportFailed { samples: usize },
}

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Started,
    Stopped(StopOutcome),
    /// Arrived right after an automatic stop and would have restarted recording
    Ignored,
}

/// Outcome of the most recent export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub reason: StopReason,
    pub samples: usize,
    pub result: Result<PathBuf, String>,
}

/// Read-only view for a UI. Only the controller task writes it.
#[derive(Debug, Clone)]
pub struct Status<S> {
    pub message: String,
    pub recording: bool,
    pub recorded_count: usize,
    /// Last `DISPLAY_WINDOW` accepted samples, oldest first
    pub recent: Vec<S>,
    pub exports_in_flight: usize,
    pub exports_finished: u64,
    pub last_export: Option<ExportSummary>,
}

impl<S> Status<S> {
    fn new() -> Self {
        Self {
            message: "Ready".to_string(),
            recording: false,
            recorded_count: 0,
            recent: Vec::new(),
            exports_in_flight: 0,
            exports_finished: 0,
            last_export: None,
        }
    }
}

enum Command {
    Start(oneshot::Sender<Result<(), PreconditionError>>),
    Stop(oneshot::Sender<StopOutcome>),
    Toggle(oneshot::Sender<Result<Toggled, PreconditionError>>),
    Background,
    Shutdown,
}

/// Front end to a running `SessionController`.
///
/// Cheap to clone. `notify_background` and `shutdown` don't need an async
/// context and can be called from any thread.
pub struct SessionHandle<S> {
    commands: UnboundedSender<Command>,
    status: watch::Receiver<Status<S>>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            status: self.status.clone(),
        }
    }
}

impl<S: Sample> SessionHandle<S> {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| SessionError::ControllerClosed)?;
        reply_rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(Command::Start).await?.map_err(SessionError::from)
    }

    pub async fn stop(&self) -> Result<StopOutcome, SessionError> {
        self.request(Command::Stop).await
    }

    pub async fn toggle(&self) -> Result<Toggled, SessionError> {
        self.request(Command::Toggle).await?.map_err(SessionError::from)
    }

    /// Lifecycle signal: the application left the foreground
    pub fn notify_background(&self) {
        if self.commands.send(Command::Background).is_err() {
            log::debug!("Background notification dropped: controller not running");
        }
    }

    /// Ends the controller task. An active session is stopped and exported
    /// first, and exports already running are waited for.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Snapshot of the current status
    pub fn status(&self) -> Status<S> {
        self.status.borrow().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.status.borrow().recording
    }

    /// Receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<Status<S>> {
        self.status.clone()
    }
}

/// The single owner of session state.
pub struct SessionController<E: EventSource> {
    source: E,
    streams: SourceStreams<E::Sample>,
    config: Config,
    state: SessionState,
    session_id: u64,
    buffer: SampleBuffer<E::Sample>,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
    last_sample_at: Option<Instant>,
    /// When the last session ended without the user asking
    auto_stopped_at: Option<Instant>,
    exports_in_flight: usize,
    worker: ExportWorker<E::Sample>,
    reports: UnboundedReceiver<ExportReport>,
    commands: UnboundedReceiver<Command>,
    status: watch::Sender<Status<E::Sample>>,
}

impl<E: EventSource> SessionController<E> {
    fn kind() -> SensorKind {
        <E::Sample as Sample>::KIND
    }

    /// Claims the source's streams and sets up the export thread.
    pub fn new(
        mut source: E,
        config: Config,
    ) -> Result<(Self, SessionHandle<E::Sample>), SourceError> {
        let streams = source
            .streams()
            .ok_or_else(|| SourceError::Failed("event streams already claimed".to_string()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::new());
        let worker = ExportWorker::spawn(CsvExporter::new(config.output_dir.clone()), report_tx);

        let controller = SessionController {
            source,
            streams,
            config,
            state: SessionState::Idle,
            session_id: 0,
            buffer: SampleBuffer::new(),
            started_at: None,
            deadline: None,
            last_sample_at: None,
            auto_stopped_at: None,
            exports_in_flight: 0,
            worker,
            reports: report_rx,
            commands: command_rx,
            status: status_tx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            status: status_rx,
        };

        Ok((controller, handle))
    }

    /// Creates a controller and runs it on the current Tokio runtime.
    pub fn spawn(
        source: E,
        config: Config,
    ) -> Result<(SessionHandle<E::Sample>, JoinHandle<()>), SourceError> {
        let (controller, handle) = Self::new(source, config)?;
        let task = tokio::spawn(controller.run());
        Ok((handle, task))
    }

    /// Processes messages until shutdown or until every handle is dropped.
    ///
    /// Samples and errors are taken before commands so that anything the
    /// source delivered ahead of a stop request is still counted.
    pub async fn run(mut self) {
        let mut samples_open = true;
        let mut errors_open = true;

        loop {
            let deadline = self.deadline;
            let silence = self.silence_deadline();

            tokio::select! {
                biased;

                sample = self.streams.samples.recv(), if samples_open => match sample {
                    Some(sample) => self.ingest(sample),
                    None => {
                        log::warn!("{} sample stream closed", Self::kind());
                        samples_open = false;
                    }
                },
                error = self.streams.errors.recv(), if errors_open => match error {
                    Some(error) => self.report_source_error(error),
                    None => errors_open = false,
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(report) = self.reports.recv() => self.finish_export(report),
                _ = sleep_until(deadline) => {
                    self.deadline = None;
                    if self.state == SessionState::Recording {
                        log::info!("Maximum session duration reached");
                        self.stop(StopReason::Timeout);
                    }
                }
                _ = sleep_until(silence) => {
                    if self.state == SessionState::Recording {
                        log::warn!(
                            "No {} samples received within the liveness timeout",
                            Self::kind()
                        );
                        self.stop(StopReason::SourceSilent);
                    }
                }
            }
        }

        self.stop(StopReason::User);
        while self.exports_in_flight > 0 {
            match self.reports.recv().await {
                Some(report) => self.finish_export(report),
                None => break,
            }
        }
        log::info!("Session controller shut down");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.stop(StopReason::User));
            }
            Command::Toggle(reply) => {
                let _ = reply.send(self.toggle());
            }
            Command::Background => {
                if self.state == SessionState::Recording {
                    log::info!("Application moved to background, stopping session");
                    self.stop(StopReason::Backgrounded);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn toggle(&mut self) -> Result<Toggled, PreconditionError> {
        match self.state {
            SessionState::Recording => Ok(Toggled::Stopped(self.stop(StopReason::User))),
            SessionState::Idle => {
                // The user was pressing stop when a timer or lifecycle trigger
                // got there first.
                if let Some(stopped_at) = self.auto_stopped_at {
                    if stopped_at.elapsed() < self.config.toggle_debounce() {
                        log::debug!(
                            "Ignoring toggle {:?} after an automatic stop",
                            stopped_at.elapsed()
                        );
                        self.status.send_modify(|status| {
                            status.message = "Recording already stopped".to_string();
                        });
                        return Ok(Toggled::Ignored);
                    }
                }
                self.start().map(|()| Toggled::Started)
            }
        }
    }

    fn check_can_start(&self) -> Result<(), PreconditionError> {
        let kind = Self::kind();
        if self.state == SessionState::Recording {
            return Err(PreconditionError::AlreadyRecording);
        }
        if !self.source.is_available() {
            return Err(PreconditionError::CapabilityUnavailable(kind));
        }
        if self.source.authorization() != Authorization::Authorized {
            return Err(PreconditionError::PermissionDenied(kind));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), PreconditionError> {
        if let Err(e) = self.check_can_start() {
            log::warn!("Cannot start {} session: {}", Self::kind(), e);
            let message = e.to_string();
            self.status.send_modify(|status| status.message = message);
            return Err(e);
        }

        self.session_id += 1;
        self.buffer = SampleBuffer::new();
        self.state = SessionState::Recording;

        let now = Instant::now();
        let max_duration = self.config.max_duration();
        self.started_at = Some(now);
        self.last_sample_at = Some(now);
        // Durations too large to represent as an instant never expire.
        self.deadline = if max_duration.is_zero() {
            None
        } else {
            now.checked_add(max_duration)
        };

        self.status.send_modify(|status| {
            status.message = "Recording...".to_string();
            status.recording = true;
            status.recorded_count = 0;
            status.recent.clear();
        });
        self.source.start();

        log::info!(
            "Started {} session {} (auto-stop after {:?})",
            Self::kind(),
            self.session_id,
            max_duration
        );
        Ok(())
    }

    /// The single termination path shared by every trigger.
    fn stop(&mut self, reason: StopReason) -> StopOutcome {
        if self.state != SessionState::Recording {
            log::debug!("Ignoring {:?} stop: not recording", reason);
            return StopOutcome::NotRecording;
        }

        // Flip first: everything after this point sees Idle.
        self.state = SessionState::Idle;
        self.deadline = None;
        self.last_sample_at = None;
        self.auto_stopped_at = (reason != StopReason::User).then(Instant::now);
        self.source.stop();

        let samples = self.buffer.take();
        let count = samples.len();
        let elapsed = self.started_at.take().map(|t| t.elapsed()).unwrap_or_default();
        log::info!(
            "Stopped {} session {} ({:?}) after {:.1}s with {} samples",
            Self::kind(),
            self.session_id,
            reason,
            elapsed.as_secs_f64(),
            count
        );

        if samples.is_empty() {
            let message = match reason.describe() {
                Some(description) => format!("{} (no data)", description),
                None => "No data recorded".to_string(),
            };
            self.status.send_modify(|status| {
                status.recording = false;
                status.message = message;
            });
            return StopOutcome::NoData;
        }

        match self.worker.submit(self.session_id, reason, samples) {
            Ok(()) => {
                self.exports_in_flight += 1;
                let in_flight = self.exports_in_flight;
                self.status.send_modify(|status| {
                    status.recording = false;
                    status.message = format!("Saving {} samples...", count);
                    status.exports_in_flight = in_flight;
                });
                StopOutcome::Exporting { samples: count }
            }
            Err(lost) => {
                log::error!("Export thread unavailable, discarding {} samples", lost.len());
                self.status.send_modify(|status| {
                    status.recording = false;
                    status.message = "Save failed: export thread unavailable".to_string();
                });
                StopOutcome::ExportFailed { samples: count }
            }
        }
    }

    fn ingest(&mut self, sample: E::Sample) {
        if self.state != SessionState::Recording {
            log::trace!("Dropping {} sample outside of a session", Self::kind());
            return;
        }

        self.last_sample_at = Some(Instant::now());
        self.buffer.push(sample);

        let count = self.buffer.len();
        if logs_sample(Self::kind(), count) {
            if let Some(latest) = self.buffer.samples().last() {
                log::debug!("{} sample #{}: {}", Self::kind(), count, latest);
            }
        }

        let recent: Vec<E::Sample> = self.buffer.recent().cloned().collect();
        self.status.send_modify(|status| {
            status.recorded_count = count;
            status.recent = recent;
        });
    }

    fn report_source_error(&mut self, error: SourceError) {
        log::warn!("{} source error: {}", Self::kind(), error);
        let message = format!("Error: {}", error);
        self.status.send_modify(|status| status.message = message);
    }

    fn finish_export(&mut self, report: ExportReport) {
        self.exports_in_flight = self.exports_in_flight.saturating_sub(1);

        let message = match (&report.result, report.reason.describe()) {
            (Ok(_), Some(description)) => {
                format!("{} ({} samples saved)", description, report.count)
            }
            (Ok(path), None) => format!(
                "Saved {} samples to {}",
                report.count,
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ),
            (Err(e), _) => format!("Save failed: {}", e),
        };

        let summary = ExportSummary {
            reason: report.reason,
            samples: report.count,
            result: report.result.map_err(|e| e.to_string()),
        };
        let in_flight = self.exports_in_flight;
        // A newer session owns the message while it is recording.
        let recording = self.state == SessionState::Recording;

        self.status.send_modify(|status| {
            if !recording {
                status.message = message;
            }
            status.exports_in_flight = in_flight;
            status.exports_finished += 1;
            status.last_export = Some(summary);
        });
    }

    fn silence_deadline(&self) -> Option<Instant> {
        if self.state != SessionState::Recording {
            return None;
        }
        let timeout = self.config.liveness_timeout()?;
        self.last_sample_at.and_then(|last| last.checked_add(timeout))
    }
}

// Motion arrives ten times a second; only its first readings are logged.
fn logs_sample(kind: SensorKind, count: usize) -> bool {
    kind == SensorKind::Location || count <= DISPLAY_WINDOW
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::LocationSample;
    use crate::source::{ChannelSource, SourceEmitter};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        handle: SessionHandle<LocationSample>,
        emitter: SourceEmitter<LocationSample>,
        controls: std::sync::Arc<crate::source::SourceControls>,
        task: JoinHandle<()>,
        dir: TempDir,
    }

    fn harness(config: Config) -> Harness {
        let dir = tempdir().unwrap();
        let config = Config {
            output_dir: Some(dir.path().to_path_buf()),
            ..config
        };
        let source = ChannelSource::<LocationSample>::new();
        let emitter = source.emitter();
        let controls = source.controls();
        let (handle, task) = SessionController::spawn(source, config).unwrap();
        Harness {
            handle,
            emitter,
            controls,
            task,
            dir,
        }
    }

    fn fix(n: u32) -> LocationSample {
        LocationSample::at(Utc::now(), 35.0 + f64::from(n) * 0.001, 139.0)
    }

    fn csv_files(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "csv"))
            .collect()
    }

    async fn wait_for_exports(
        handle: &SessionHandle<LocationSample>,
        n: u64,
    ) -> Status<LocationSample> {
        let mut rx = handle.subscribe();
        let status = rx
            .wait_for(|s| s.exports_finished >= n)
            .await
            .expect("controller stopped");
        status.clone()
    }

    #[tokio::test]
    async fn test_counts_only_samples_inside_session() {
        let h = harness(Config::default());

        h.emitter.sample(fix(0));
        h.handle.start().await.unwrap();
        assert!(h.controls.is_producing());
        for n in 1..=4 {
            h.emitter.sample(fix(n));
        }
        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::Exporting { samples: 4 });
        assert!(!h.controls.is_producing());
        h.emitter.sample(fix(5));

        let status = wait_for_exports(&h.handle, 1).await;
        assert_eq!(status.recorded_count, 4);
        assert!(!status.recording);
        assert_eq!(status.last_export.unwrap().samples, 4);
    }

    #[tokio::test]
    async fn test_display_window_tracks_latest_ten() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        for n in 0..15 {
            h.emitter.sample(fix(n));
        }
        h.handle.stop().await.unwrap();

        let status = h.handle.status();
        assert_eq!(status.recorded_count, 15);
        assert_eq!(status.recent.len(), DISPLAY_WINDOW);
        assert!((status.recent[0].latitude - 35.005).abs() < 1e-9);
        assert!((status.recent[9].latitude - 35.014).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_double_stop_exports_once() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));

        let first = h.handle.stop().await.unwrap();
        let second = h.handle.stop().await.unwrap();
        h.handle.notify_background();

        assert_eq!(first, StopOutcome::Exporting { samples: 1 });
        assert_eq!(second, StopOutcome::NotRecording);

        wait_for_exports(&h.handle, 1).await;
        h.handle.shutdown();
        assert_eq!(csv_files(&h.dir).len(), 1);
    }

    #[tokio::test]
    async fn test_start_while_recording_is_rejected() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));
        h.emitter.sample(fix(2));

        let err = h.handle.start().await.unwrap_err();
        assert_eq!(err, SessionError::Precondition(PreconditionError::AlreadyRecording));

        let status = h.handle.status();
        assert!(status.recording);
        assert_eq!(status.recorded_count, 2);
        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::Exporting { samples: 2 });
    }

    #[tokio::test]
    async fn test_unavailable_or_denied_source_stays_idle() {
        let h = harness(Config::default());

        h.controls.set_available(false);
        let err = h.handle.start().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Precondition(PreconditionError::CapabilityUnavailable(_))
        ));
        assert!(!h.handle.is_recording());
        assert!(h.handle.status().message.contains("not available"));

        h.controls.set_available(true);
        h.controls.set_authorized(false);
        let err = h.handle.toggle().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Precondition(PreconditionError::PermissionDenied(_))
        ));
        assert!(!h.controls.is_producing());

        h.controls.set_authorized(true);
        assert_eq!(h.handle.toggle().await.unwrap(), Toggled::Started);
    }

    #[tokio::test]
    async fn test_empty_session_writes_nothing() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::NoData);

        let status = h.handle.status();
        assert!(status.message.contains("No data"));
        assert_eq!(status.exports_in_flight, 0);
        assert!(csv_files(&h.dir).is_empty());
    }

    #[tokio::test]
    async fn test_background_while_idle_changes_nothing() {
        let h = harness(Config::default());
        let before = h.handle.status();

        h.handle.notify_background();
        // Round-trip a command so the notification has been processed.
        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::NotRecording);

        let after = h.handle.status();
        assert_eq!(after.message, before.message);
        assert_eq!(after.exports_finished, 0);
        assert!(csv_files(&h.dir).is_empty());
    }

    #[tokio::test]
    async fn test_background_stops_recording() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));
        h.handle.notify_background();

        let status = wait_for_exports(&h.handle, 1).await;
        assert!(!status.recording);
        assert_eq!(status.last_export.unwrap().reason, StopReason::Backgrounded);
        assert!(status.message.contains("background"));
        assert!(status.message.contains('1'));
    }

    #[tokio::test]
    async fn test_source_error_keeps_recording() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        h.emitter.error(SourceError::Failed("signal lost".to_string()));
        h.emitter.sample(fix(1));
        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::Exporting { samples: 1 });
        wait_for_exports(&h.handle, 1).await;

        h.emitter.error(SourceError::Unavailable);
        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::NotRecording);
        assert!(h.handle.status().message.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_toggle_right_after_background_stop_is_ignored() {
        let h = harness(Config::default());
        assert_eq!(h.handle.toggle().await.unwrap(), Toggled::Started);
        h.handle.notify_background();

        assert_eq!(h.handle.toggle().await.unwrap(), Toggled::Ignored);
        let status = h.handle.status();
        assert!(!status.recording);
        assert_eq!(status.message, "Recording already stopped");
    }

    #[tokio::test]
    async fn test_toggle_after_user_stop_restarts() {
        let h = harness(Config::default());
        assert_eq!(h.handle.toggle().await.unwrap(), Toggled::Started);
        h.emitter.sample(fix(1));
        assert_eq!(
            h.handle.toggle().await.unwrap(),
            Toggled::Stopped(StopOutcome::Exporting { samples: 1 })
        );
        assert_eq!(h.handle.toggle().await.unwrap(), Toggled::Started);

        let status = h.handle.status();
        assert!(status.recording);
        assert_eq!(status.recorded_count, 0);
        assert!(status.recent.is_empty());
        h.handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_restarts_after_auto_stop_without_debounce() {
        let h = harness(Config {
            toggle_debounce_ms: 0,
            ..Config::default()
        });
        h.handle.toggle().await.unwrap();
        h.handle.notify_background();
        assert_eq!(h.handle.toggle().await.unwrap(), Toggled::Started);
        assert!(h.handle.is_recording());
    }

    #[tokio::test]
    async fn test_huge_durations_never_expire() {
        let h = harness(Config {
            max_duration_secs: u64::MAX,
            liveness_timeout_secs: Some(u64::MAX),
            ..Config::default()
        });
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));
        assert!(h.handle.is_recording());

        assert_eq!(h.handle.stop().await.unwrap(), StopOutcome::Exporting { samples: 1 });
        wait_for_exports(&h.handle, 1).await;
        h.handle.start().await.unwrap();
        assert!(h.handle.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stop_after_max_duration() {
        let h = harness(Config {
            max_duration_secs: 10,
            ..Config::default()
        });
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));
        h.emitter.sample(fix(2));

        let status = wait_for_exports(&h.handle, 1).await;
        assert!(!status.recording);
        let summary = status.last_export.unwrap();
        assert_eq!(summary.reason, StopReason::Timeout);
        assert_eq!(summary.samples, 2);
        assert!(status.message.contains("time limit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_racing_toggle_exports_once() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));

        tokio::time::advance(Duration::from_secs(10)).await;
        let toggled = h.handle.toggle().await.unwrap();
        assert!(matches!(toggled, Toggled::Stopped(_) | Toggled::Ignored));

        wait_for_exports(&h.handle, 1).await;
        assert!(!h.handle.is_recording());
        h.handle.shutdown();
        assert_eq!(csv_files(&h.dir).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_source_stops_session() {
        let h = harness(Config {
            max_duration_secs: 0,
            liveness_timeout_secs: Some(3),
            ..Config::default()
        });
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));

        let status = wait_for_exports(&h.handle, 1).await;
        assert_eq!(status.last_export.unwrap().reason, StopReason::SourceSilent);
    }

    #[tokio::test]
    async fn test_export_failure_is_reported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let source = ChannelSource::<LocationSample>::new();
        let emitter = source.emitter();
        let config = Config {
            output_dir: Some(blocker),
            ..Config::default()
        };
        let (handle, _task) = SessionController::spawn(source, config).unwrap();

        handle.start().await.unwrap();
        emitter.sample(fix(1));
        handle.stop().await.unwrap();

        let status = wait_for_exports(&handle, 1).await;
        assert!(status.message.starts_with("Save failed"));
        assert!(status.last_export.unwrap().result.is_err());
        assert!(!status.recording);

        // Still usable, and the failed session's data is gone.
        handle.start().await.unwrap();
        assert_eq!(handle.status().recorded_count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_exports_active_session() {
        let h = harness(Config::default());
        h.handle.start().await.unwrap();
        h.emitter.sample(fix(1));

        h.handle.shutdown();
        h.task.await.unwrap();

        assert_eq!(csv_files(&h.dir).len(), 1);
        assert_eq!(h.handle.status().exports_finished, 1);
        assert!(h.handle.start().await.is_err());
    }

    #[test]
    fn test_every_location_fix_is_logged() {
        assert!(logs_sample(SensorKind::Location, 1));
        assert!(logs_sample(SensorKind::Location, 500));
        assert!(logs_sample(SensorKind::Motion, DISPLAY_WINDOW));
        assert!(!logs_sample(SensorKind::Motion, DISPLAY_WINDOW + 1));
    }

    #[tokio::test]
    async fn test_streams_can_only_be_claimed_once() {
        let mut source = ChannelSource::<LocationSample>::new();
        let _ = source.streams();
        assert!(SessionController::new(source, Config::default()).is_err());
    }
}
