#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use attitude_fusion::{
    AlarmSeverity, Alarms, ArmedState, Attitude, AttitudePublisher, BusFault, Clock, FifoSensor,
    FlightStatusSource, Magnetometer, RawSample, SensorReading, SystemAlarm, Watchdog,
};

pub const GRAVITY: f32 = 9.81;
/// 4096 counts per g
pub const ACCEL_SCALE: f32 = GRAVITY / 4096.0;
/// 32 counts per deg/s, keeps test biases exact
pub const GYRO_SCALE: f32 = 1.0 / 32.0;
/// Fusion loop period
pub const CYCLE_MS: u64 = 2;

/// Level and still accelerometer
pub const LEVEL: RawSample = RawSample::new(0, 0, -4096, 2);
/// Zero-rate gyroscope
pub const STILL: RawSample = RawSample::new(0, 0, 0, -13200);

/// FIFO that delivers the same sample `per_cycle` times, then reports empty once
#[derive(Clone)]
pub struct ConstantFifo {
    sample: Rc<Cell<RawSample>>,
    fault: Rc<Cell<bool>>,
    scale: f32,
    per_cycle: u32,
    delivered: u32,
}

impl ConstantFifo {
    pub fn new(sample: RawSample, scale: f32) -> Self {
        Self {
            sample: Rc::new(Cell::new(sample)),
            fault: Rc::new(Cell::new(false)),
            scale,
            per_cycle: 1,
            delivered: 0,
        }
    }

    pub fn per_cycle(mut self, per_cycle: u32) -> Self {
        self.per_cycle = per_cycle;
        self
    }

    /// Change the sample seen from the next read on (shared with clones)
    pub fn set_sample(&self, sample: RawSample) {
        self.sample.set(sample);
    }

    pub fn set_fault(&self, fault: bool) {
        self.fault.set(fault);
    }
}

impl FifoSensor for ConstantFifo {
    fn read_fifo(&mut self) -> Result<Option<RawSample>, BusFault> {
        if self.fault.get() {
            return Err(BusFault);
        }
        if self.delivered < self.per_cycle {
            self.delivered += 1;
            Ok(Some(self.sample.get()))
        } else {
            self.delivered = 0;
            Ok(None)
        }
    }

    fn scale(&self) -> f32 {
        self.scale
    }
}

/// FIFO fed sample by sample from the test
#[derive(Clone)]
pub struct QueueFifo {
    queue: Rc<RefCell<VecDeque<RawSample>>>,
    scale: f32,
}

impl QueueFifo {
    pub fn new(scale: f32) -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            scale,
        }
    }

    pub fn push(&self, sample: RawSample) {
        self.queue.borrow_mut().push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl FifoSensor for QueueFifo {
    fn read_fifo(&mut self) -> Result<Option<RawSample>, BusFault> {
        Ok(self.queue.borrow_mut().pop_front())
    }

    fn scale(&self) -> f32 {
        self.scale
    }
}

/// Magnetometer with a fixed field, flagging new data every `period` polls
pub struct PeriodicMag {
    field: [i16; 3],
    period: u32,
    polls: u32,
}

impl PeriodicMag {
    pub fn new(field: [i16; 3], period: u32) -> Self {
        Self {
            field,
            period,
            polls: 0,
        }
    }
}

impl Magnetometer for PeriodicMag {
    fn new_data_available(&mut self) -> bool {
        self.polls += 1;
        self.polls % self.period == 0
    }

    fn read(&mut self) -> Result<[i16; 3], BusFault> {
        Ok(self.field)
    }
}

/// Collaborators that record everything the task does
pub struct TestEnv {
    pub clock: Rc<Cell<u64>>,
    pub armed: ArmedState,
    pub alarm: Option<AlarmSeverity>,
    pub alarm_changes: u32,
    pub heartbeats: u32,
    pub readings: Vec<SensorReading>,
    pub attitudes: Vec<Attitude>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            clock: Rc::new(Cell::new(0)),
            armed: ArmedState::Disarmed,
            alarm: None,
            alarm_changes: 0,
            heartbeats: 0,
            readings: Vec::new(),
            attitudes: Vec::new(),
        }
    }

    pub fn at(now_ms: u64) -> Self {
        let env = Self::new();
        env.clock.set(now_ms);
        env
    }

    pub fn now(&self) -> u64 {
        self.clock.get()
    }

    pub fn advance(&self, ms: u64) {
        self.clock.set(self.clock.get() + ms);
    }

    pub fn last_attitude(&self) -> Attitude {
        self.attitudes.last().copied().unwrap_or_default()
    }
}

impl Clock for TestEnv {
    fn now_ms(&mut self) -> u64 {
        self.clock.get()
    }
}

impl FlightStatusSource for TestEnv {
    fn armed_state(&mut self) -> ArmedState {
        self.armed
    }
}

impl Alarms for TestEnv {
    fn set_alarm(&mut self, _alarm: SystemAlarm, severity: AlarmSeverity) {
        if self.alarm != Some(severity) {
            self.alarm_changes += 1;
        }
        self.alarm = Some(severity);
    }

    fn clear_alarm(&mut self, _alarm: SystemAlarm) {
        if self.alarm.is_some() {
            self.alarm_changes += 1;
        }
        self.alarm = None;
    }
}

impl Watchdog for TestEnv {
    fn heartbeat(&mut self) {
        self.heartbeats += 1;
    }
}

impl AttitudePublisher for TestEnv {
    fn publish_reading(&mut self, reading: &SensorReading) {
        self.readings.push(*reading);
    }

    fn publish_attitude(&mut self, attitude: &Attitude) {
        self.attitudes.push(*attitude);
    }
}

/// Gyroscope counts in the sensor frame for a body-frame rate given in counts
///
/// Inverse of the board map body = (-y, -x, -z).
pub fn gyro_sensor_counts(body: [i16; 3]) -> RawSample {
    RawSample::new(-body[1], -body[0], -body[2], -13200)
}
