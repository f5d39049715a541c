//! # CSV Export Module
//!
//! Turns a finished session into a durable CSV file and runs those writes on a
//! dedicated thread so the session controller never blocks on disk I/O.
//!
//! ## File Format
//! ```text
//! location_20251103_103045.csv
//! timestamp,latitude,longitude,altitude,horizontalAccuracy,verticalAccuracy,speed,course
//! 2025-11-03T01:30:45Z,35.6812,139.7671,40,5,8,1.2,90
//! ...
//! ```
//! - Header columns come from `Sample::COLUMNS`, prefixed by `timestamp`
//! - Timestamps are RFC 3339 in UTC; numbers use Rust's locale-free `Display`
//! - Rows keep the order samples were accepted in
//!
//! ## Commit
//! Contents go to a temp file inside the output directory first and are then
//! linked to the final name without clobbering. If a file with the same
//! second-resolution name exists, `_1`, `_2`, ... is appended.

use crate::controller::StopReason;
use crate::error::ExportError;
use crate::sample::{Sample, SensorKind};
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tokio::sync::mpsc::UnboundedSender;

/// Header row (without trailing newline) for a sample kind
pub fn csv_header<S: Sample>() -> String {
    let mut header = String::from("timestamp");
    for column in S::COLUMNS {
        header.push(',');
        header.push_str(column);
    }
    header
}

/// Renders samples as CSV, header first, one row per sample
pub fn encode_csv<S: Sample>(samples: &[S]) -> String {
    let precision = S::KIND.timestamp_precision();
    let mut csv = csv_header::<S>();
    csv.push('\n');

    for sample in samples {
        csv.push_str(&sample.timestamp().to_rfc3339_opts(precision, true));
        for value in sample.fields() {
            let _ = write!(csv, ",{}", value);
        }
        csv.push('\n');
    }

    csv
}

/// `<kind>_<YYYYMMDD_HHmmss>.csv`
pub fn file_name(kind: SensorKind, at: DateTime<Local>) -> String {
    format!("{}_{}.csv", kind.file_prefix(), at.format("%Y%m%d_%H%M%S"))
}

fn numbered(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, attempt, ext),
        None => format!("{}_{}", name, attempt),
    }
}

/// Writes finished sessions into one output directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: Option<PathBuf>,
}

impl CsvExporter {
    /// `None` falls back to the platform documents directory
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self { output_dir }
    }

    /// Directory recordings end up in
    pub fn output_dir(&self) -> Result<PathBuf, ExportError> {
        if let Some(dir) = &self.output_dir {
            return Ok(dir.clone());
        }
        dirs::document_dir()
            .or_else(dirs::data_local_dir)
            .map(|dir| dir.join("sensor-log"))
            .ok_or(ExportError::OutputDirUnavailable)
    }

    /// Encodes and commits `samples`, returning the path of the new file
    pub fn write<S: Sample>(&self, samples: &[S]) -> Result<PathBuf, ExportError> {
        if samples.is_empty() {
            return Err(ExportError::EmptySession);
        }

        let dir = self.output_dir()?;
        std::fs::create_dir_all(&dir).map_err(|source| ExportError::Write {
            path: dir.clone(),
            source,
        })?;

        let contents = encode_csv(samples);
        let name = file_name(S::KIND, Local::now());
        Self::commit(&dir, &name, &contents)
    }

    fn stage(dir: &Path, contents: &str) -> io::Result<tempfile::NamedTempFile> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".sensor-log-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn commit(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, ExportError> {
        let mut tmp = Self::stage(dir, contents).map_err(|source| ExportError::Write {
            path: dir.join(name),
            source,
        })?;

        let mut attempt = 0;
        loop {
            let path = dir.join(numbered(name, attempt));
            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!("{} already exists, trying next name", path.display());
                    tmp = e.file;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ExportError::Write {
                        path,
                        source: e.error,
                    })
                }
            }
        }
    }
}

/// Outcome of one export job, sent back to the controller
#[derive(Debug)]
pub struct ExportReport {
    pub session: u64,
    pub reason: StopReason,
    pub count: usize,
    pub result: Result<PathBuf, ExportError>,
}

/// Command sent from the controller to the writer thread
enum WorkerCommand<S> {
    Export {
        session: u64,
        reason: StopReason,
        samples: Vec<S>,
    },
    Stop,
}

/// Background writer thread.
///
/// Jobs are processed in order and always run to completion; each one sends
/// exactly one `ExportReport`. Dropping the worker lets queued jobs finish
/// before the thread exits, and blocks the dropping thread until they have.
/// `SessionController::run` waits for every report before it returns, so the
/// join only blocks when the controller task is aborted mid-export.
pub struct ExportWorker<S> {
    command_tx: Sender<WorkerCommand<S>>,
    writer_thread: Option<thread::JoinHandle<()>>,
}

impl<S: Sample> ExportWorker<S> {
    pub fn spawn(exporter: CsvExporter, reports: UnboundedSender<ExportReport>) -> Self {
        let (command_tx, command_rx) = unbounded();

        let writer_thread = thread::Builder::new()
            .name(format!("{}-export", S::KIND))
            .spawn(move || Self::writer_loop(command_rx, exporter, reports))
            .map_err(|e| log::error!("Failed to spawn export thread: {}", e))
            .ok();

        Self {
            command_tx,
            writer_thread,
        }
    }

    /// Queues a frozen session for writing. Never blocks.
    pub fn submit(&self, session: u64, reason: StopReason, samples: Vec<S>) -> Result<(), Vec<S>> {
        if self.writer_thread.is_none() {
            return Err(samples);
        }
        self.command_tx
            .send(WorkerCommand::Export {
                session,
                reason,
                samples,
            })
            .map_err(|e| match e.into_inner() {
                WorkerCommand::Export { samples, .. } => samples,
                WorkerCommand::Stop => Vec::new(),
            })
    }

    fn writer_loop(
        command_rx: Receiver<WorkerCommand<S>>,
        exporter: CsvExporter,
        reports: UnboundedSender<ExportReport>,
    ) {
        loop {
            match command_rx.recv() {
                Ok(WorkerCommand::Export {
                    session,
                    reason,
                    samples,
                }) => {
                    let result = exporter.write(&samples);
                    match &result {
                        Ok(path) => log::info!(
                            "Saved {} {} samples to {}",
                            samples.len(),
                            S::KIND,
                            path.display()
                        ),
                        Err(e) => log::error!("Failed to export session {}: {}", session, e),
                    }

                    let report = ExportReport {
                        session,
                        reason,
                        count: samples.len(),
                        result,
                    };
                    if reports.send(report).is_err() {
                        log::debug!(
                            "Export report for session {} dropped: controller gone",
                            session
                        );
                    }
                }
                Ok(WorkerCommand::Stop) => {
                    log::debug!("Export thread stopped");
                    break;
                }
                Err(_) => {
                    log::debug!("Export thread: command channel closed");
                    break;
                }
            }
        }
    }
}

impl<S> Drop for ExportWorker<S> {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Stop);

        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }
}
