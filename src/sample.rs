//! # Sensor Sample Module
//!
//! Immutable sensor readings that a session records. Each sample kind knows its
//! CSV column names and produces its numeric fields in column order; the
//! exporter takes care of the timestamp column and row rendering.
//!
//! ## Key Types
//! - `Sample`: trait implemented by every recordable reading
//! - `LocationSample`: one position fix
//! - `MotionSample`: one device-motion reading (attitude, rates, acceleration, field)

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Which sensor a session records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Location,
    Motion,
}

impl SensorKind {
    /// Prefix used for exported file names
    pub fn file_prefix(&self) -> &'static str {
        match self {
            SensorKind::Location => "location",
            SensorKind::Motion => "motion",
        }
    }

    /// Human-readable name for status messages
    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Location => "Location",
            SensorKind::Motion => "Motion",
        }
    }

    /// Precision of the exported timestamp column.
    ///
    /// Motion runs at 10 Hz and needs sub-second resolution; location fixes don't.
    pub fn timestamp_precision(&self) -> SecondsFormat {
        match self {
            SensorKind::Location => SecondsFormat::Secs,
            SensorKind::Motion => SecondsFormat::Millis,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_prefix())
    }
}

/// A single timestamped reading accepted into a session.
///
/// `COLUMNS` lists the numeric columns that follow `timestamp` in the CSV
/// header, and `fields()` must return exactly that many values in that order.
pub trait Sample: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const KIND: SensorKind;
    const COLUMNS: &'static [&'static str];

    fn timestamp(&self) -> DateTime<Utc>;

    fn fields(&self) -> Vec<f64>;
}

/// Quality bucket for a horizontal accuracy radius in meters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyGrade {
    /// Negative radius: the platform marks the fix as invalid
    Invalid,
    VeryHigh,
    High,
    Medium,
    Low,
}

impl AccuracyGrade {
    pub fn from_radius(meters: f64) -> Self {
        if meters < 0.0 {
            AccuracyGrade::Invalid
        } else if meters < 10.0 {
            AccuracyGrade::VeryHigh
        } else if meters < 50.0 {
            AccuracyGrade::High
        } else if meters < 100.0 {
            AccuracyGrade::Medium
        } else {
            AccuracyGrade::Low
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            AccuracyGrade::Invalid => "no accuracy information",
            AccuracyGrade::VeryHigh => "very high (<10 m)",
            AccuracyGrade::High => "high (<50 m)",
            AccuracyGrade::Medium => "medium (<100 m)",
            AccuracyGrade::Low => "low (>=100 m)",
        }
    }
}

/// One position fix
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub timestamp: DateTime<Utc>,
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
    /// Meters above sea level
    pub altitude: f64,
    /// Meters; negative when invalid
    pub horizontal_accuracy: f64,
    /// Meters; negative when invalid
    pub vertical_accuracy: f64,
    /// Meters per second; negative when invalid
    pub speed: f64,
    /// Degrees from true north; negative when invalid
    pub course: f64,
}

impl LocationSample {
    /// A fix with only a position; every other measurement is marked invalid.
    pub fn at(timestamp: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: 0.0,
            horizontal_accuracy: -1.0,
            vertical_accuracy: -1.0,
            speed: -1.0,
            course: -1.0,
        }
    }

    pub fn accuracy_grade(&self) -> AccuracyGrade {
        AccuracyGrade::from_radius(self.horizontal_accuracy)
    }
}

impl Sample for LocationSample {
    const KIND: SensorKind = SensorKind::Location;
    const COLUMNS: &'static [&'static str] = &[
        "latitude",
        "longitude",
        "altitude",
        "horizontalAccuracy",
        "verticalAccuracy",
        "speed",
        "course",
    ];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn fields(&self) -> Vec<f64> {
        vec![
            self.latitude,
            self.longitude,
            self.altitude,
            self.horizontal_accuracy,
            self.vertical_accuracy,
            self.speed,
            self.course,
        ]
    }
}

impl fmt::Display for LocationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lat={:.6} lon={:.6} alt={:.1}m speed={:.1}m/s ({:.1}km/h) course={:.1} accuracy {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.latitude,
            self.longitude,
            self.altitude,
            self.speed,
            self.speed * 3.6,
            self.course,
            self.accuracy_grade().describe(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Attitude angles in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Calibration level of the magnetometer reading.
///
/// The discriminants are what ends up in the `magneticField_accuracy` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MagneticFieldAccuracy {
    #[default]
    Uncalibrated = -1,
    Low = 0,
    Medium = 1,
    High = 2,
}

impl MagneticFieldAccuracy {
    pub fn raw_value(&self) -> i32 {
        *self as i32
    }
}

/// One device-motion reading
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSample {
    pub timestamp: DateTime<Utc>,
    pub attitude: Attitude,
    /// Radians per second
    pub rotation_rate: Vector3,
    /// G, gravity removed
    pub user_acceleration: Vector3,
    /// G
    pub gravity: Vector3,
    /// Microtesla
    pub magnetic_field: Vector3,
    pub magnetic_field_accuracy: MagneticFieldAccuracy,
}

impl Sample for MotionSample {
    const KIND: SensorKind = SensorKind::Motion;
    const COLUMNS: &'static [&'static str] = &[
        "roll",
        "pitch",
        "yaw",
        "rotationRate_x",
        "rotationRate_y",
        "rotationRate_z",
        "userAcceleration_x",
        "userAcceleration_y",
        "userAcceleration_z",
        "gravity_x",
        "gravity_y",
        "gravity_z",
        "magneticField_x",
        "magneticField_y",
        "magneticField_z",
        "magneticField_accuracy",
    ];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn fields(&self) -> Vec<f64> {
        vec![
            self.attitude.roll,
            self.attitude.pitch,
            self.attitude.yaw,
            self.rotation_rate.x,
            self.rotation_rate.y,
            self.rotation_rate.z,
            self.user_acceleration.x,
            self.user_acceleration.y,
            self.user_acceleration.z,
            self.gravity.x,
            self.gravity.y,
            self.gravity.z,
            self.magnetic_field.x,
            self.magnetic_field.y,
            self.magnetic_field.z,
            f64::from(self.magnetic_field_accuracy.raw_value()),
        ]
    }
}

impl fmt::Display for MotionSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.attitude;
        let acc = &self.user_acceleration;
        write!(
            f,
            "{} roll={:.3}rad ({:.1}°) pitch={:.3}rad ({:.1}°) yaw={:.3}rad ({:.1}°) accel=({:.3}, {:.3}, {:.3})G",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            a.roll,
            a.roll.to_degrees(),
            a.pitch,
            a.pitch.to_degrees(),
            a.yaw,
            a.yaw.to_degrees(),
            acc.x,
            acc.y,
            acc.z,
        )
    }
}
