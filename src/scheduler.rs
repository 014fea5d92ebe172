//! Gain scheduling between fast convergence and steady-state filter gains

use crate::calibration::CalibrationSnapshot;
use crate::types::{ArmedState, GainMode, Gains, SchedulerConfig};

/// Gain scheduler state machine
///
/// FastConverge while inside the boot convergence window (after the settle
/// delay), or while arming when `zero_during_arming` is set. Steady otherwise,
/// with gains reloaded from the calibration snapshot on every transition into
/// Steady and whenever a newer snapshot generation shows up.
#[derive(Debug, Clone)]
pub struct GainScheduler {
    config: SchedulerConfig,
    mode: GainMode,
    gains: Gains,
    /// Generation of the snapshot the steady gains were loaded from
    loaded_generation: Option<u32>,
}

impl GainScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            mode: GainMode::FastConverge,
            gains: config.fast_gains,
            loaded_generation: None,
        }
    }

    /// Select the gains for this cycle
    ///
    /// # Arguments
    /// * `now_ms` - Time since boot in milliseconds
    /// * `armed` - Current arming status
    /// * `calibration` - This cycle's calibration snapshot
    pub fn update(
        &mut self,
        now_ms: u64,
        armed: ArmedState,
        calibration: &CalibrationSnapshot,
    ) -> Gains {
        if self.in_convergence_window(now_ms) || self.arming_reset(armed, calibration) {
            if self.mode != GainMode::FastConverge {
                log_info!(
                    "attitude gains: {} at {} ms",
                    GainMode::FastConverge.as_str(),
                    now_ms
                );
            }
            self.mode = GainMode::FastConverge;
            self.gains = self.config.fast_gains;
        } else if self.mode == GainMode::FastConverge
            || self.loaded_generation != Some(calibration.generation)
        {
            if self.mode == GainMode::FastConverge {
                log_info!("attitude gains: {} at {} ms", GainMode::Steady.as_str(), now_ms);
            }
            self.mode = GainMode::Steady;
            self.gains = calibration.gains;
            self.loaded_generation = Some(calibration.generation);
        }

        self.gains
    }

    pub fn mode(&self) -> GainMode {
        self.mode
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    fn in_convergence_window(&self, now_ms: u64) -> bool {
        now_ms > self.config.settle_ms && now_ms < self.config.fast_converge_until_ms
    }

    fn arming_reset(&self, armed: ArmedState, calibration: &CalibrationSnapshot) -> bool {
        calibration.zero_during_arming && armed == ArmedState::Arming
    }
}

impl Default for GainScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::AttitudeSettings;

    fn snapshot(settings: AttitudeSettings, generation: u32) -> CalibrationSnapshot {
        CalibrationSnapshot::from_settings(&settings, generation)
    }

    fn stored() -> AttitudeSettings {
        AttitudeSettings {
            accel_kp: 0.05,
            accel_ki: 0.0001,
            yaw_bias_rate: 0.00001,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_mode() {
        let scheduler = GainScheduler::default();
        assert_eq!(scheduler.mode(), GainMode::FastConverge);
        assert_eq!(scheduler.gains(), Gains::FAST_CONVERGE);
    }

    #[test]
    fn test_fast_gains_inside_window() {
        let mut scheduler = GainScheduler::default();

        // Whatever the store says, the window forces the fixed gains
        let wild = snapshot(
            AttitudeSettings {
                accel_kp: 123.0,
                accel_ki: 45.0,
                yaw_bias_rate: 6.0,
                ..Default::default()
            },
            0,
        );
        for now_ms in [1001, 2000, 5000, 6999] {
            let gains = scheduler.update(now_ms, ArmedState::Disarmed, &wild);
            assert_eq!(gains, Gains::FAST_CONVERGE, "at {} ms", now_ms);
            assert_eq!(scheduler.mode(), GainMode::FastConverge);
        }
    }

    #[test]
    fn test_window_bounds_are_exclusive() {
        let calibration = snapshot(stored(), 0);

        let mut scheduler = GainScheduler::default();
        assert_eq!(scheduler.update(1000, ArmedState::Disarmed, &calibration), calibration.gains);
        assert_eq!(scheduler.mode(), GainMode::Steady);

        assert_eq!(
            scheduler.update(1001, ArmedState::Disarmed, &calibration),
            Gains::FAST_CONVERGE
        );
        assert_eq!(scheduler.update(7000, ArmedState::Disarmed, &calibration), calibration.gains);
        assert_eq!(scheduler.mode(), GainMode::Steady);
    }

    #[test]
    fn test_settle_period_uses_stored_gains() {
        let calibration = snapshot(stored(), 0);
        let mut scheduler = GainScheduler::default();

        let gains = scheduler.update(10, ArmedState::Disarmed, &calibration);
        assert_eq!(gains, calibration.gains);
        assert_eq!(scheduler.mode(), GainMode::Steady);
    }

    #[test]
    fn test_steady_gains_outside_window() {
        let calibration = snapshot(stored(), 0);
        let mut scheduler = GainScheduler::default();

        scheduler.update(3000, ArmedState::Disarmed, &calibration);
        let gains = scheduler.update(8000, ArmedState::Disarmed, &calibration);
        assert_eq!(gains, calibration.gains);
        assert_eq!(scheduler.mode(), GainMode::Steady);
    }

    #[test]
    fn test_arming_forces_fast_converge() {
        let calibration = snapshot(
            AttitudeSettings {
                zero_during_arming: true,
                ..stored()
            },
            0,
        );
        let mut scheduler = GainScheduler::default();

        scheduler.update(10_000, ArmedState::Disarmed, &calibration);
        assert_eq!(scheduler.mode(), GainMode::Steady);

        // The very next cycle after arming starts flips the mode
        let gains = scheduler.update(10_002, ArmedState::Arming, &calibration);
        assert_eq!(scheduler.mode(), GainMode::FastConverge);
        assert_eq!(gains, Gains::FAST_CONVERGE);

        // And back to stored gains once armed
        let gains = scheduler.update(10_004, ArmedState::Armed, &calibration);
        assert_eq!(scheduler.mode(), GainMode::Steady);
        assert_eq!(gains, calibration.gains);
    }

    #[test]
    fn test_arming_ignored_without_zero_during_arming() {
        let calibration = snapshot(stored(), 0);
        let mut scheduler = GainScheduler::default();

        scheduler.update(10_000, ArmedState::Disarmed, &calibration);
        scheduler.update(10_002, ArmedState::Arming, &calibration);
        assert_eq!(scheduler.mode(), GainMode::Steady);
        assert_eq!(scheduler.gains(), calibration.gains);
    }

    #[test]
    fn test_new_generation_reloads_while_steady() {
        let mut scheduler = GainScheduler::default();
        let first = snapshot(stored(), 0);
        scheduler.update(10_000, ArmedState::Disarmed, &first);

        let second = snapshot(
            AttitudeSettings {
                accel_kp: 0.3,
                ..stored()
            },
            1,
        );
        assert_eq!(scheduler.update(10_002, ArmedState::Disarmed, &second).kp, 0.3);
    }

    #[test]
    fn test_new_generation_does_not_override_fast_converge() {
        let mut scheduler = GainScheduler::default();
        let updated = snapshot(
            AttitudeSettings {
                accel_kp: 0.3,
                ..stored()
            },
            5,
        );

        assert_eq!(
            scheduler.update(2000, ArmedState::Disarmed, &updated),
            Gains::FAST_CONVERGE
        );
    }
}
