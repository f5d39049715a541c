//! # sensor-log
//!
//! Bounded-duration sensor recording sessions. A session subscribes to a live
//! stream of location or motion samples, keeps everything it accepts in
//! memory, shows the last few readings live, and writes the whole session to a
//! CSV file when it ends.
//!
//! ## Architecture
//! ```text
//!  EventSource ──samples/errors──▶ SessionController ──▶ SampleBuffer
//!                                   ▲        │
//!      toggle / timer / background ─┘        └─ on stop ─▶ ExportWorker ─▶ <kind>_<time>.csv
//! ```
//!
//! ## Example
//! ```no_run
//! use sensor_log::{Config, SessionController, SimulatedSource};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let source = SimulatedSource::location(config.update_interval());
//! let (handle, _task) = SessionController::spawn(source, config)?;
//!
//! handle.start().await?;
//! // ... later, from a button, a timer, or a lifecycle hook:
//! handle.toggle().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod sample;
pub mod source;

pub use buffer::{SampleBuffer, DISPLAY_WINDOW};
pub use config::Config;
pub use controller::{
    ExportSummary, SessionController, SessionHandle, SessionState, Status, StopOutcome,
    StopReason, Toggled,
};
pub use error::{ConfigError, ExportError, PreconditionError, SessionError, SourceError};
pub use export::{csv_header, encode_csv, CsvExporter};
pub use sample::{LocationSample, MotionSample, Sample, SensorKind};
pub use source::{
    source_channel, Authorization, ChannelSource, EventSource, SimulatedLocationSource,
    SimulatedMotionSource, SimulatedSource, SourceEmitter, SourceStreams,
};
