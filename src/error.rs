//! Error types for sensor acquisition

use core::fmt;

/// Which physical sensor an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl SensorKind {
    /// Return variant name as a static string (usable with defmt on embedded)
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Magnetometer => "magnetometer",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to produce a sensor reading for the current cycle
///
/// "No sample yet" is not an error: the aggregator waits for one. These
/// variants are the conditions the task loop turns into a raised alarm and a
/// skipped fusion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The driver reported a hard bus/read error
    #[error("{0} bus read failed")]
    Bus(SensorKind),
    /// The bounded wait for a first sample ran out
    #[error("no {sensor} sample after {waited_ms} ms")]
    NoSamples { sensor: SensorKind, waited_ms: u64 },
}

impl SensorError {
    /// Sensor the error originated from
    pub fn sensor(&self) -> SensorKind {
        match self {
            SensorError::Bus(sensor) => *sensor,
            SensorError::NoSamples { sensor, .. } => *sensor,
        }
    }
}
