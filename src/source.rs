//! # Event Source Module
//!
//! Abstract producers of live sensor samples. A source hands its consumer two
//! independent push streams, one for samples and one for faults, and is told
//! when to start and stop producing.
//!
//! ## Key Components
//! - `EventSource`: trait the session controller consumes
//! - `SourceEmitter` / `SourceStreams`: the multi-producer, single-consumer channel pair
//! - `ChannelSource`: bridge for samples produced elsewhere (platform glue, tests)
//! - `SimulatedSource`: interval-driven fake location or motion readings

use crate::error::SourceError;
use crate::sample::{Attitude, LocationSample, MagneticFieldAccuracy, MotionSample, Sample, Vector3};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Whether the user allowed access to the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Denied,
    Authorized,
}

/// Producer side of a source's streams. Cheap to clone; every clone feeds the
/// same consumer.
pub struct SourceEmitter<S> {
    samples: UnboundedSender<S>,
    errors: UnboundedSender<SourceError>,
}

impl<S> Clone for SourceEmitter<S> {
    fn clone(&self) -> Self {
        Self {
            samples: self.samples.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl<S> SourceEmitter<S> {
    /// Returns false once the consumer is gone.
    pub fn sample(&self, sample: S) -> bool {
        if self.samples.send(sample).is_err() {
            log::debug!("Could not deliver sample: stream closed");
            return false;
        }
        true
    }

    /// Returns false once the consumer is gone.
    pub fn error(&self, error: SourceError) -> bool {
        if let Err(why) = self.errors.send(error) {
            log::debug!("Could not deliver source error: {}", why.0);
            return false;
        }
        true
    }
}

/// Consumer side of a source's streams
pub struct SourceStreams<S> {
    pub samples: UnboundedReceiver<S>,
    pub errors: UnboundedReceiver<SourceError>,
}

/// Creates a connected emitter/streams pair.
pub fn source_channel<S>() -> (SourceEmitter<S>, SourceStreams<S>) {
    let (sample_tx, sample_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    (
        SourceEmitter {
            samples: sample_tx,
            errors: error_tx,
        },
        SourceStreams {
            samples: sample_rx,
            errors: error_rx,
        },
    )
}

/// A live producer of samples of one kind.
///
/// The streams are lazy and restartable: they stay open across any number of
/// `start()`/`stop()` cycles and only deliver while the source is producing.
pub trait EventSource: Send + 'static {
    type Sample: Sample;

    /// Whether the sensor hardware can be used right now
    fn is_available(&self) -> bool;

    fn authorization(&self) -> Authorization {
        Authorization::Authorized
    }

    fn start(&mut self);

    fn stop(&mut self);

    /// Hands out the sample and error streams. Returns `None` once taken.
    fn streams(&mut self) -> Option<SourceStreams<Self::Sample>>;
}

/// Flags shared between a `ChannelSource` and whoever drives it
#[derive(Debug)]
pub struct SourceControls {
    available: AtomicBool,
    authorized: AtomicBool,
    producing: AtomicBool,
}

impl SourceControls {
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    /// Whether the controller currently wants samples
    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::SeqCst)
    }
}

/// Source whose samples are pushed in from outside through a `SourceEmitter`.
///
/// Platform glue (or a test) keeps an emitter and the shared controls; the
/// session controller owns the source itself. Samples pushed while not
/// producing are still delivered and left to the controller to drop.
pub struct ChannelSource<S> {
    emitter: SourceEmitter<S>,
    streams: Option<SourceStreams<S>>,
    controls: Arc<SourceControls>,
}

impl<S: Sample> ChannelSource<S> {
    pub fn new() -> Self {
        let (emitter, streams) = source_channel();
        Self {
            emitter,
            streams: Some(streams),
            controls: Arc::new(SourceControls {
                available: AtomicBool::new(true),
                authorized: AtomicBool::new(true),
                producing: AtomicBool::new(false),
            }),
        }
    }

    pub fn emitter(&self) -> SourceEmitter<S> {
        self.emitter.clone()
    }

    pub fn controls(&self) -> Arc<SourceControls> {
        self.controls.clone()
    }
}

impl<S: Sample> Default for ChannelSource<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sample> EventSource for ChannelSource<S> {
    type Sample = S;

    fn is_available(&self) -> bool {
        self.controls.available.load(Ordering::SeqCst)
    }

    fn authorization(&self) -> Authorization {
        if self.controls.authorized.load(Ordering::SeqCst) {
            Authorization::Authorized
        } else {
            Authorization::Denied
        }
    }

    fn start(&mut self) {
        self.controls.producing.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.controls.producing.store(false, Ordering::SeqCst);
    }

    fn streams(&mut self) -> Option<SourceStreams<S>> {
        self.streams.take()
    }
}

/// Produces a synthetic reading for the n-th tick
pub type Generator<S> = fn(u64) -> S;

/// Interval-driven fake sensor.
///
/// Must be started from within a Tokio runtime; otherwise it reports a
/// `SourceError` instead of producing.
pub struct SimulatedSource<S> {
    period: Duration,
    generate: Generator<S>,
    available: bool,
    emitter: SourceEmitter<S>,
    streams: Option<SourceStreams<S>>,
    task: Option<JoinHandle<()>>,
}

pub type SimulatedLocationSource = SimulatedSource<LocationSample>;
pub type SimulatedMotionSource = SimulatedSource<MotionSample>;

impl<S: Sample> SimulatedSource<S> {
    pub fn new(period: Duration, generate: Generator<S>) -> Self {
        let (emitter, streams) = source_channel();
        Self {
            period,
            generate,
            available: true,
            emitter,
            streams: Some(streams),
            task: None,
        }
    }

    /// Simulates a device without the sensor
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

impl SimulatedSource<LocationSample> {
    pub fn location(period: Duration) -> Self {
        Self::new(period, simulated_location)
    }
}

impl SimulatedSource<MotionSample> {
    pub fn motion(period: Duration) -> Self {
        Self::new(period, simulated_motion)
    }
}

impl<S: Sample> EventSource for SimulatedSource<S> {
    type Sample = S;

    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        if !self.available {
            self.emitter.error(SourceError::Unavailable);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.emitter.error(SourceError::Failed(e.to_string()));
                return;
            }
        };

        let emitter = self.emitter.clone();
        let generate = self.generate;
        let period = self.period;
        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut tick = 0u64;
            loop {
                ticker.tick().await;
                if !emitter.sample(generate(tick)) {
                    break;
                }
                tick += 1;
            }
        }));
        log::debug!("Simulated {} source started ({:?} period)", S::KIND, period);
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Simulated {} source stopped", S::KIND);
        }
    }

    fn streams(&mut self) -> Option<SourceStreams<S>> {
        self.streams.take()
    }
}

impl<S> Drop for SimulatedSource<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// Walks a small loop around Tokyo Station.
fn simulated_location(tick: u64) -> LocationSample {
    let t = tick as f64;
    LocationSample {
        timestamp: Utc::now(),
        latitude: 35.6812 + 0.001 * (t * 0.7).sin(),
        longitude: 139.7671 + 0.001 * (t * 1.3).cos(),
        altitude: 40.0 + (t * 0.1).sin(),
        horizontal_accuracy: 5.0,
        vertical_accuracy: 8.0,
        speed: 1.2,
        course: (t * 10.0) % 360.0,
    }
}

// Gentle rocking around the roll and pitch axes with a slow yaw drift.
fn simulated_motion(tick: u64) -> MotionSample {
    let t = tick as f64 * 0.1;
    let attitude = Attitude {
        roll: 0.2 * t.sin(),
        pitch: 0.1 * t.cos(),
        yaw: (0.05 * t) % std::f64::consts::TAU,
    };
    MotionSample {
        timestamp: Utc::now(),
        attitude,
        rotation_rate: Vector3::new(0.2 * t.cos(), -0.1 * t.sin(), 0.05),
        user_acceleration: Vector3::new(0.01 * (3.0 * t).sin(), 0.01 * (2.0 * t).cos(), 0.0),
        gravity: Vector3::new(
            -attitude.roll.sin() * attitude.pitch.cos(),
            attitude.pitch.sin(),
            -attitude.roll.cos() * attitude.pitch.cos(),
        ),
        magnetic_field: Vector3::new(25.0, -5.0, -40.0),
        magnetic_field_accuracy: MagneticFieldAccuracy::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_taken_once() {
        let mut source = ChannelSource::<LocationSample>::new();
        assert!(source.streams().is_some());
        assert!(source.streams().is_none());
    }

    #[test]
    fn test_channel_source_controls() {
        let mut source = ChannelSource::<LocationSample>::new();
        let controls = source.controls();

        assert!(source.is_available());
        assert_eq!(source.authorization(), Authorization::Authorized);

        controls.set_available(false);
        controls.set_authorized(false);
        assert!(!source.is_available());
        assert_eq!(source.authorization(), Authorization::Denied);

        source.start();
        assert!(controls.is_producing());
        source.stop();
        assert!(!controls.is_producing());
    }

    #[test]
    fn test_emitter_reports_closed_stream() {
        let (emitter, streams) = source_channel::<u32>();
        assert!(emitter.sample(1));
        drop(streams);
        assert!(!emitter.sample(2));
        assert!(!emitter.error(SourceError::Unavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_source_produces_until_stopped() {
        let mut source = SimulatedSource::location(Duration::from_millis(100));
        let mut streams = source.streams().unwrap();

        source.start();
        let first = streams.samples.recv().await.unwrap();
        assert!((first.latitude - 35.6812).abs() < 0.01);
        let _second = streams.samples.recv().await.unwrap();

        source.stop();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(streams.samples.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unavailable_simulated_source_reports_error() {
        let mut source = SimulatedSource::motion(Duration::from_millis(100)).unavailable();
        let mut streams = source.streams().unwrap();

        assert!(!source.is_available());
        source.start();
        assert_eq!(streams.errors.recv().await, Some(SourceError::Unavailable));
    }
}
