//! Sensor driver interface and per-cycle oversampling aggregator
//!
//! Accelerometer and gyroscope sample faster than the fusion loop runs and
//! buffer their output in a FIFO. Each cycle the aggregator drains both FIFOs,
//! averages the raw counts and converts them to physical units in one step:
//! `sum * (scale / n)`. The integer sums never see a float until the very end.
//!
//! The magnetometer is polled only when its driver flags new data; otherwise
//! the previous reading is kept.

use embassy_futures::yield_now;
use nalgebra::Vector3;

use crate::calibration::CalibrationSnapshot;
use crate::error::{SensorError, SensorKind};
use crate::task::Clock;
use crate::types::{AggregatorConfig, SensorReading, Temperatures};

/// Hard bus or register read failure reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusFault;

/// One raw FIFO entry in sensor counts, sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    /// Raw die temperature counts
    pub temperature: i16,
}

impl RawSample {
    pub const fn new(x: i16, y: i16, z: i16, temperature: i16) -> Self {
        Self { x, y, z, temperature }
    }
}

/// Driver for a FIFO-buffered inertial sensor
pub trait FifoSensor {
    /// Pop one buffered sample
    ///
    /// `Ok(None)` means the FIFO is empty for now; `Err` is a hard fault.
    fn read_fifo(&mut self) -> Result<Option<RawSample>, BusFault>;

    /// Physical units per raw count (m/s² for accelerometers, deg/s for gyroscopes)
    fn scale(&self) -> f32;

    fn self_test(&mut self) -> Result<(), BusFault> {
        Ok(())
    }
}

/// Driver for a magnetometer with a data-ready flag
pub trait Magnetometer {
    fn new_data_available(&mut self) -> bool;

    /// Raw counts, sensor frame
    fn read(&mut self) -> Result<[i16; 3], BusFault>;

    fn self_test(&mut self) -> Result<(), BusFault> {
        Ok(())
    }
}

/// Accumulated FIFO contents for one cycle
struct Drained {
    sum: Vector3<i32>,
    count: u32,
    temperature: i16,
}

/// Drain a FIFO, cooperatively waiting for at least one sample
///
/// The wait is measured on `clock` from the first empty poll and gives up
/// once `max_wait_ms` have elapsed.
async fn drain<S: FifoSensor, C: Clock>(
    sensor: &mut S,
    kind: SensorKind,
    clock: &mut C,
    max_wait_ms: u32,
) -> Result<Drained, SensorError> {
    let mut sum = Vector3::<i32>::zeros();
    let mut count = 0u32;
    let mut temperature = 0;
    let mut wait_started_ms = None;

    loop {
        match sensor.read_fifo().map_err(|_| SensorError::Bus(kind))? {
            Some(sample) => {
                sum += Vector3::new(i32::from(sample.x), i32::from(sample.y), i32::from(sample.z));
                count += 1;
                temperature = sample.temperature;
            }
            None if count > 0 => break,
            None => {
                let now_ms = clock.now_ms();
                let waited_ms = now_ms.saturating_sub(*wait_started_ms.get_or_insert(now_ms));
                if waited_ms >= u64::from(max_wait_ms) {
                    return Err(SensorError::NoSamples {
                        sensor: kind,
                        waited_ms,
                    });
                }
                yield_now().await;
            }
        }
    }

    Ok(Drained {
        sum,
        count,
        temperature,
    })
}

/// Per-cycle sensor acquisition
///
/// Owns the three drivers and the retained magnetometer reading.
pub struct SensorAggregator<A, G, M> {
    accel: A,
    gyro: G,
    mag: M,
    config: AggregatorConfig,
    magnetometers: Vector3<f32>,
}

impl<A, G, M> SensorAggregator<A, G, M>
where
    A: FifoSensor,
    G: FifoSensor,
    M: Magnetometer,
{
    pub fn new(accel: A, gyro: G, mag: M, config: AggregatorConfig) -> Self {
        if !config.gyro_axes.is_proper_rotation() {
            log_warn!("gyroscope axis map is a reflection, rates will be mirrored");
        }

        Self {
            accel,
            gyro,
            mag,
            config,
            magnetometers: Vector3::zeros(),
        }
    }

    /// Most recent magnetometer reading (body frame, raw counts)
    pub fn magnetometers(&self) -> Vector3<f32> {
        self.magnetometers
    }

    /// Run each driver's self-test, reporting the first sensor that fails
    pub fn self_test(&mut self) -> Result<(), SensorKind> {
        self.accel
            .self_test()
            .map_err(|_| SensorKind::Accelerometer)?;
        self.gyro.self_test().map_err(|_| SensorKind::Gyroscope)?;
        self.mag.self_test().map_err(|_| SensorKind::Magnetometer)?;
        Ok(())
    }

    /// Acquire this cycle's sensor reading
    ///
    /// # Arguments
    /// * `calibration` - This cycle's calibration snapshot (accel bias, bias correction flag)
    /// * `gyro_bias` - Current gyro bias integral in deg/s, body frame
    /// * `clock` - Time source for the bounded wait
    ///
    /// Suspends (yielding to the executor) while a FIFO is empty, for at
    /// most `max_wait_ms` per sensor.
    pub async fn update<C: Clock>(
        &mut self,
        calibration: &CalibrationSnapshot,
        gyro_bias: &Vector3<f32>,
        clock: &mut C,
    ) -> Result<SensorReading, SensorError> {
        let max_wait_ms = self.config.max_wait_ms;
        let accel = drain(&mut self.accel, SensorKind::Accelerometer, clock, max_wait_ms).await?;
        let gyro = drain(&mut self.gyro, SensorKind::Gyroscope, clock, max_wait_ms).await?;

        let accel_counts = accel.sum - calibration.accel_bias * accel.count as i32;
        let accels = self
            .config
            .accel_axes
            .apply(accel_counts.map(|v| v as f32) * (self.accel.scale() / accel.count as f32));

        let mut gyros = self
            .config
            .gyro_axes
            .apply(gyro.sum.map(|v| v as f32) * (self.gyro.scale() / gyro.count as f32));
        if calibration.bias_correct_gyro {
            gyros += gyro_bias;
        }

        if self.mag.new_data_available() {
            let [x, y, z] = self
                .mag
                .read()
                .map_err(|_| SensorError::Bus(SensorKind::Magnetometer))?;
            self.magnetometers = self
                .config
                .mag_axes
                .apply(Vector3::new(f32::from(x), f32::from(y), f32::from(z)));
        }

        Ok(SensorReading {
            accels,
            gyros,
            magnetometers: self.magnetometers,
            temperature: Temperatures {
                gyro: self.config.gyro_temperature.celsius(gyro.temperature),
                accel: self.config.accel_temperature.celsius(accel.temperature),
            },
            accel_samples: accel.count,
            gyro_samples: gyro.count,
        })
    }
}
