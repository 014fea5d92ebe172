//! Periodic attitude task
//!
//! Drives one fusion cycle per tick: snapshot calibration, select gains,
//! acquire sensors, fuse, publish, heartbeat. Everything outside the core
//! (clock, flight status, alarms, watchdog, publication) is reached through
//! the small collaborator traits below, so the loop runs unchanged on an
//! embedded executor or in a host test.
//!
//! # Example (conceptual)
//!
//! ```ignore
//! #[embassy_executor::task]
//! async fn attitude_task(
//!     store: &'static CalibrationStore,
//!     accel: Bma180,
//!     gyro: Mpu6000,
//!     mag: Hmc5883,
//!     mut env: FlightEnvironment,
//! ) -> ! {
//!     let mut task = AttitudeTask::new(store, accel, gyro, mag, TaskConfig::default());
//!     task.run(&mut env, || Timer::after_millis(2)).await
//! }
//! ```

use core::future::Future;

use crate::calibration::CalibrationStore;
use crate::error::{SensorError, SensorKind};
use crate::estimator::FusionState;
use crate::scheduler::GainScheduler;
use crate::sensors::{FifoSensor, Magnetometer, SensorAggregator};
use crate::types::{
    AlarmSeverity, ArmedState, Attitude, GainMode, Gains, SensorReading, SystemAlarm, TaskConfig,
};

/// Monotonic time source
pub trait Clock {
    /// Milliseconds since boot
    fn now_ms(&mut self) -> u64;
}

/// Flight status object
pub trait FlightStatusSource {
    fn armed_state(&mut self) -> ArmedState;
}

/// System alarm/health interface
pub trait Alarms {
    fn set_alarm(&mut self, alarm: SystemAlarm, severity: AlarmSeverity);
    fn clear_alarm(&mut self, alarm: SystemAlarm);
}

/// Task supervision heartbeat
pub trait Watchdog {
    fn heartbeat(&mut self);
}

/// Output publication
pub trait AttitudePublisher {
    /// Scaled sensor reading for this cycle
    fn publish_reading(&mut self, reading: &SensorReading);
    /// Attitude estimate for this cycle
    fn publish_attitude(&mut self, attitude: &Attitude);
}

/// Everything the task needs from the rest of the system
pub trait TaskEnvironment: Clock + FlightStatusSource + Alarms + Watchdog + AttitudePublisher {}

impl<T> TaskEnvironment for T where T: Clock + FlightStatusSource + Alarms + Watchdog + AttitudePublisher {}

/// Result of one task cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Fusion ran and this attitude was published
    Updated(Attitude),
    /// Acquisition failed; fusion was skipped and the attitude left untouched
    SensorFault(SensorError),
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskStats {
    /// Completed cycles, faulted or not
    pub cycles: u32,
    pub sensor_faults: u32,
    /// Quaternion resets to identity
    pub degenerate_resets: u32,
}

/// Attitude estimation task
///
/// Owns the sensors, the gain scheduler and the filter state. The calibration
/// store is shared with whoever delivers settings updates.
pub struct AttitudeTask<'s, A, G, M> {
    store: &'s CalibrationStore,
    sensors: SensorAggregator<A, G, M>,
    scheduler: GainScheduler,
    fusion: FusionState,
    /// Calibration generation whose gyro bias seeded the integral
    adopted_generation: u32,
    /// Set by a failed start-up self-test, keeps the critical alarm standing
    self_test_failed: bool,
    stats: TaskStats,
}

impl<'s, A, G, M> AttitudeTask<'s, A, G, M>
where
    A: FifoSensor,
    G: FifoSensor,
    M: Magnetometer,
{
    pub fn new(store: &'s CalibrationStore, accel: A, gyro: G, mag: M, config: TaskConfig) -> Self {
        let calibration = store.snapshot();

        Self {
            store,
            sensors: SensorAggregator::new(accel, gyro, mag, config.aggregator),
            scheduler: GainScheduler::new(config.scheduler),
            fusion: FusionState::with_gyro_bias(calibration.gyro_bias),
            adopted_generation: calibration.generation,
            self_test_failed: false,
            stats: TaskStats::default(),
        }
    }

    /// Clear the attitude alarm and self-test the sensors
    ///
    /// A failing sensor raises a critical alarm that stays up for the life of
    /// the task; the loop still runs so the remaining outputs keep flowing.
    pub fn start<E: Alarms>(&mut self, env: &mut E) -> Result<(), SensorKind> {
        env.clear_alarm(SystemAlarm::Attitude);

        match self.sensors.self_test() {
            Ok(()) => {
                self.self_test_failed = false;
                log_info!("attitude task started");
                Ok(())
            }
            Err(sensor) => {
                self.self_test_failed = true;
                log_error!("{} self-test failed", sensor.as_str());
                env.set_alarm(SystemAlarm::Attitude, AlarmSeverity::Critical);
                Err(sensor)
            }
        }
    }

    /// Run one fusion cycle
    pub async fn run_cycle<E: TaskEnvironment>(&mut self, env: &mut E) -> CycleOutcome {
        let now_ms = env.now_ms();

        // One snapshot per cycle: gains, biases and rotation all come from it
        let calibration = self.store.snapshot();
        if calibration.generation != self.adopted_generation {
            self.fusion.set_gyro_bias(calibration.gyro_bias);
            self.adopted_generation = calibration.generation;
            log_info!("calibration generation {} adopted", calibration.generation);
        }

        let gains = self
            .scheduler
            .update(now_ms, env.armed_state(), &calibration);

        let gyro_bias = self.fusion.gyro_bias();
        let acquired = self.sensors.update(&calibration, &gyro_bias, &mut *env).await;

        let outcome = match acquired {
            Ok(reading) => {
                let delta_time = self.fusion.time_step(env.now_ms());
                self.fusion
                    .update(reading.gyros, reading.accels, &gains, delta_time);
                let attitude = self.fusion.attitude(&calibration.board_rotation);

                env.publish_reading(&reading);
                env.publish_attitude(&attitude);
                if !self.self_test_failed {
                    env.clear_alarm(SystemAlarm::Attitude);
                }
                CycleOutcome::Updated(attitude)
            }
            Err(error) => {
                // Attitude is held, but the next fused step covers one cycle only
                self.fusion.mark_tick(env.now_ms());
                self.stats.sensor_faults = self.stats.sensor_faults.wrapping_add(1);
                log_error!("attitude sensor fault: {}", error);
                if !self.self_test_failed {
                    env.set_alarm(SystemAlarm::Attitude, AlarmSeverity::Error);
                }
                CycleOutcome::SensorFault(error)
            }
        };

        self.stats.cycles = self.stats.cycles.wrapping_add(1);
        self.stats.degenerate_resets = self.fusion.degenerate_resets();
        env.heartbeat();

        outcome
    }

    /// Task body: start, then cycle forever with `delay` between cycles
    ///
    /// # Arguments
    /// * `env` - System collaborators
    /// * `delay` - Produces the fixed inter-cycle delay future
    pub async fn run<E, D, Fut>(&mut self, env: &mut E, mut delay: D) -> !
    where
        E: TaskEnvironment,
        D: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        // Failure is already alarmed and logged
        let _ = self.start(env);

        loop {
            self.run_cycle(env).await;
            delay().await;
        }
    }

    /// Gains used by the most recent cycle
    pub fn active_gains(&self) -> Gains {
        self.scheduler.gains()
    }

    pub fn mode(&self) -> GainMode {
        self.scheduler.mode()
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    pub fn fusion(&self) -> &FusionState {
        &self.fusion
    }

    pub fn fusion_mut(&mut self) -> &mut FusionState {
        &mut self.fusion
    }

    pub fn sensors(&self) -> &SensorAggregator<A, G, M> {
        &self.sensors
    }
}
