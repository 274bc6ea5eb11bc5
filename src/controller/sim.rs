// In-process Phoenix controller
//
// Records every vendor call into a shared log, holds the configured
// parameters, and moves a simple mechanism one control period per `set`.
// Faults and bus latency can be injected to exercise the failure paths.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::phoenix::{
    DemandType, ErrorCode, InvertType, NativeControlMode, NeutralMode, PhoenixController,
};

/// Time covered by one `set` call (matches the runtime loop)
const CONTROL_PERIOD_S: f64 = 0.02;

/// Velocity units are sensor ticks per 100 ms
const VELOCITY_UNITS_PER_S: f64 = 10.0;

/// Free speed at full output, ticks per 100 ms
const FREE_SPEED: f64 = 2000.0;

/// Full-scale closed-loop output in firmware units
const FULL_SCALE: f64 = 1023.0;

/// A vendor call as seen by the device
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FactoryDefault,
    NeutralMode(NeutralMode),
    ForwardSoftLimitEnable(bool),
    ForwardSoftLimitThreshold(i32),
    ReverseSoftLimitEnable(bool),
    ReverseSoftLimitThreshold(i32),
    Inverted(InvertType),
    SensorPhase(bool),
    VoltageCompensationEnable(bool),
    VoltageCompSaturation(f64),
    OpenloopRamp(f64),
    ClosedloopRamp(f64),
    Kp { slot: u8, value: f64 },
    Ki { slot: u8, value: f64 },
    Kd { slot: u8, value: f64 },
    Kf { slot: u8, value: f64 },
    MaxIntegralAccumulator { slot: u8, value: f64 },
    IntegralZone { slot: u8, zone: i32 },
    PeakOutputForward(f64),
    PeakOutputReverse(f64),
    MotionSCurveStrength(i32),
    MotionCruiseVelocity(i32),
    MotionAcceleration(i32),
    AllowableClosedloopError { slot: u8, error: i32 },
    SelectedSensorPosition { position: i32, pid_idx: u8 },
    Follow { master: i32 },
    Set {
        mode: NativeControlMode,
        demand0: f64,
        demand_type: DemandType,
        demand1: f64,
    },
}

impl Call {
    /// Vendor method name, used to target injected faults
    pub fn name(&self) -> &'static str {
        match self {
            Call::FactoryDefault => "config_factory_default",
            Call::NeutralMode(_) => "set_neutral_mode",
            Call::ForwardSoftLimitEnable(_) => "config_forward_soft_limit_enable",
            Call::ForwardSoftLimitThreshold(_) => "config_forward_soft_limit_threshold",
            Call::ReverseSoftLimitEnable(_) => "config_reverse_soft_limit_enable",
            Call::ReverseSoftLimitThreshold(_) => "config_reverse_soft_limit_threshold",
            Call::Inverted(_) => "set_inverted",
            Call::SensorPhase(_) => "set_sensor_phase",
            Call::VoltageCompensationEnable(_) => "enable_voltage_compensation",
            Call::VoltageCompSaturation(_) => "config_voltage_comp_saturation",
            Call::OpenloopRamp(_) => "config_openloop_ramp",
            Call::ClosedloopRamp(_) => "config_closedloop_ramp",
            Call::Kp { .. } => "config_kp",
            Call::Ki { .. } => "config_ki",
            Call::Kd { .. } => "config_kd",
            Call::Kf { .. } => "config_kf",
            Call::MaxIntegralAccumulator { .. } => "config_max_integral_accumulator",
            Call::IntegralZone { .. } => "config_integral_zone",
            Call::PeakOutputForward(_) => "config_peak_output_forward",
            Call::PeakOutputReverse(_) => "config_peak_output_reverse",
            Call::MotionSCurveStrength(_) => "config_motion_s_curve_strength",
            Call::MotionCruiseVelocity(_) => "config_motion_cruise_velocity",
            Call::MotionAcceleration(_) => "config_motion_acceleration",
            Call::AllowableClosedloopError { .. } => "config_allowable_closedloop_error",
            Call::SelectedSensorPosition { .. } => "set_selected_sensor_position",
            Call::Follow { .. } => "follow",
            Call::Set { .. } => "set",
        }
    }
}

/// Call history shared between a test and the controllers it builds
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(i32, Call)>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: i32, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, call));
    }

    /// Every call, tagged with the device id that received it
    pub fn all(&self) -> Vec<(i32, Call)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls received by one device
    pub fn calls(&self, id: i32) -> Vec<Call> {
        self.all()
            .into_iter()
            .filter(|(device, _)| *device == id)
            .map(|(_, call)| call)
            .collect()
    }

    pub fn names(&self, id: i32) -> Vec<&'static str> {
        self.calls(id).iter().map(Call::name).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SimParams {
    neutral_mode: NeutralMode,
    forward_limit: Option<f64>,
    forward_limit_enabled: bool,
    reverse_limit: Option<f64>,
    reverse_limit_enabled: bool,
    invert: InvertType,
    sensor_phase: bool,
    voltage_compensation: bool,
    peak_forward: f64,
    peak_reverse: f64,
    kf: f64,
    cruise_velocity: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            neutral_mode: NeutralMode::Coast,
            forward_limit: None,
            forward_limit_enabled: false,
            reverse_limit: None,
            reverse_limit_enabled: false,
            invert: InvertType::None,
            sensor_phase: false,
            voltage_compensation: false,
            peak_forward: 1.0,
            peak_reverse: -1.0,
            kf: 0.0,
            cruise_velocity: 0.0,
        }
    }
}

/// Simulated Talon
#[derive(Debug)]
pub struct SimController {
    id: i32,
    log: CallLog,
    fault: Option<(&'static str, ErrorCode)>,
    latency: Duration,
    params: SimParams,
    master: Option<i32>,
    position: f64,
    velocity: f64,
    output: f64,
}

impl SimController {
    pub fn new(id: i32) -> Self {
        Self::with_log(id, CallLog::new())
    }

    pub fn with_log(id: i32, log: CallLog) -> Self {
        debug!("Creating simulated controller {}", id);
        Self {
            id,
            log,
            fault: None,
            latency: Duration::ZERO,
            params: SimParams::default(),
            master: None,
            position: 0.0,
            velocity: 0.0,
            output: 0.0,
        }
    }

    /// Make the named vendor call report `code` instead of succeeding
    pub fn fail_on(mut self, call: &'static str, code: ErrorCode) -> Self {
        self.fault = Some((call, code));
        self
    }

    /// Pretend every config round trip takes this long
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Device this controller follows, if any
    pub fn master(&self) -> Option<i32> {
        self.master
    }

    pub fn neutral_mode(&self) -> NeutralMode {
        self.params.neutral_mode
    }

    pub fn invert(&self) -> InvertType {
        self.params.invert
    }

    pub fn sensor_phase(&self) -> bool {
        self.params.sensor_phase
    }

    pub fn voltage_compensation(&self) -> bool {
        self.params.voltage_compensation
    }

    /// Record a status-returning call and decide its outcome
    fn exchange(&mut self, call: Call, timeout: Duration) -> ErrorCode {
        let name = call.name();
        self.log.record(self.id, call);
        if let Some((target, code)) = self.fault {
            if target == name {
                return code;
            }
        }
        if self.latency > timeout {
            return ErrorCode::RxTimeout;
        }
        ErrorCode::Ok
    }

    // Peaks are not validated and may cross
    fn clamp_output(&self, output: f64) -> f64 {
        output.max(self.params.peak_reverse).min(self.params.peak_forward)
    }

    /// Keep the sensor inside any enabled soft limits
    fn clamp_position(&self, position: f64) -> f64 {
        let mut position = position;
        if self.params.forward_limit_enabled {
            if let Some(limit) = self.params.forward_limit {
                position = position.min(limit);
            }
        }
        if self.params.reverse_limit_enabled {
            if let Some(limit) = self.params.reverse_limit {
                position = position.max(limit);
            }
        }
        position
    }

    fn advance(&mut self, velocity: f64) {
        let previous = self.position;
        let moved = velocity * VELOCITY_UNITS_PER_S * CONTROL_PERIOD_S;
        self.position = self.clamp_position(previous + moved);
        self.velocity = (self.position - previous) / (VELOCITY_UNITS_PER_S * CONTROL_PERIOD_S);
    }
}

impl PhoenixController for SimController {
    fn device_id(&self) -> i32 {
        self.id
    }

    fn config_factory_default(&mut self, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::FactoryDefault, timeout);
        if code.is_ok() {
            self.params = SimParams::default();
            self.master = None;
        }
        code
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) {
        self.log.record(self.id, Call::NeutralMode(mode));
        self.params.neutral_mode = mode;
    }

    fn config_forward_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::ForwardSoftLimitEnable(enable), timeout);
        if code.is_ok() {
            self.params.forward_limit_enabled = enable;
        }
        code
    }

    fn config_forward_soft_limit_threshold(
        &mut self,
        threshold: i32,
        timeout: Duration,
    ) -> ErrorCode {
        let code = self.exchange(Call::ForwardSoftLimitThreshold(threshold), timeout);
        if code.is_ok() {
            self.params.forward_limit = Some(f64::from(threshold));
        }
        code
    }

    fn config_reverse_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::ReverseSoftLimitEnable(enable), timeout);
        if code.is_ok() {
            self.params.reverse_limit_enabled = enable;
        }
        code
    }

    fn config_reverse_soft_limit_threshold(
        &mut self,
        threshold: i32,
        timeout: Duration,
    ) -> ErrorCode {
        let code = self.exchange(Call::ReverseSoftLimitThreshold(threshold), timeout);
        if code.is_ok() {
            self.params.reverse_limit = Some(f64::from(threshold));
        }
        code
    }

    fn set_inverted(&mut self, invert: InvertType) {
        self.log.record(self.id, Call::Inverted(invert));
        self.params.invert = invert;
    }

    fn set_sensor_phase(&mut self, phase: bool) {
        self.log.record(self.id, Call::SensorPhase(phase));
        self.params.sensor_phase = phase;
    }

    fn enable_voltage_compensation(&mut self, enable: bool) {
        self.log.record(self.id, Call::VoltageCompensationEnable(enable));
        self.params.voltage_compensation = enable;
    }

    fn config_voltage_comp_saturation(&mut self, volts: f64, timeout: Duration) -> ErrorCode {
        self.exchange(Call::VoltageCompSaturation(volts), timeout)
    }

    fn config_openloop_ramp(&mut self, seconds: f64, timeout: Duration) -> ErrorCode {
        self.exchange(Call::OpenloopRamp(seconds), timeout)
    }

    fn config_closedloop_ramp(&mut self, seconds: f64, timeout: Duration) -> ErrorCode {
        self.exchange(Call::ClosedloopRamp(seconds), timeout)
    }

    fn config_kp(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode {
        self.exchange(Call::Kp { slot, value }, timeout)
    }

    fn config_ki(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode {
        self.exchange(Call::Ki { slot, value }, timeout)
    }

    fn config_kd(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode {
        self.exchange(Call::Kd { slot, value }, timeout)
    }

    fn config_kf(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::Kf { slot, value }, timeout);
        if code.is_ok() {
            self.params.kf = value;
        }
        code
    }

    fn config_max_integral_accumulator(
        &mut self,
        slot: u8,
        value: f64,
        timeout: Duration,
    ) -> ErrorCode {
        self.exchange(Call::MaxIntegralAccumulator { slot, value }, timeout)
    }

    fn config_integral_zone(&mut self, slot: u8, zone: i32, timeout: Duration) -> ErrorCode {
        self.exchange(Call::IntegralZone { slot, zone }, timeout)
    }

    fn config_peak_output_forward(&mut self, percent: f64, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::PeakOutputForward(percent), timeout);
        if code.is_ok() {
            self.params.peak_forward = percent;
        }
        code
    }

    fn config_peak_output_reverse(&mut self, percent: f64, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::PeakOutputReverse(percent), timeout);
        if code.is_ok() {
            self.params.peak_reverse = percent;
        }
        code
    }

    fn config_motion_s_curve_strength(&mut self, strength: i32, timeout: Duration) -> ErrorCode {
        self.exchange(Call::MotionSCurveStrength(strength), timeout)
    }

    fn config_motion_cruise_velocity(&mut self, velocity: i32, timeout: Duration) -> ErrorCode {
        let code = self.exchange(Call::MotionCruiseVelocity(velocity), timeout);
        if code.is_ok() {
            self.params.cruise_velocity = f64::from(velocity);
        }
        code
    }

    fn config_motion_acceleration(&mut self, acceleration: i32, timeout: Duration) -> ErrorCode {
        self.exchange(Call::MotionAcceleration(acceleration), timeout)
    }

    fn config_allowable_closedloop_error(
        &mut self,
        slot: u8,
        error: i32,
        timeout: Duration,
    ) -> ErrorCode {
        self.exchange(Call::AllowableClosedloopError { slot, error }, timeout)
    }

    fn set_selected_sensor_position(
        &mut self,
        position: i32,
        pid_idx: u8,
        timeout: Duration,
    ) -> ErrorCode {
        let code = self.exchange(Call::SelectedSensorPosition { position, pid_idx }, timeout);
        if code.is_ok() {
            self.position = f64::from(position);
        }
        code
    }

    fn follow(&mut self, master: &Self) {
        self.log.record(self.id, Call::Follow { master: master.id });
        self.master = Some(master.id);
    }

    fn set(
        &mut self,
        mode: NativeControlMode,
        demand0: f64,
        demand_type: DemandType,
        demand1: f64,
    ) {
        self.log.record(
            self.id,
            Call::Set {
                mode,
                demand0,
                demand_type,
                demand1,
            },
        );
        let feed_forward = match demand_type {
            DemandType::ArbitraryFeedForward => demand1,
            DemandType::Neutral => 0.0,
        };

        match mode {
            NativeControlMode::Disabled => {
                self.output = 0.0;
                self.velocity = 0.0;
            }
            NativeControlMode::PercentOutput => {
                self.output = self.clamp_output(demand0 + feed_forward);
                self.advance(self.output * FREE_SPEED);
            }
            NativeControlMode::Velocity => {
                let output = self.params.kf * demand0 / FULL_SCALE + feed_forward;
                self.output = self.clamp_output(output);
                self.advance(demand0);
            }
            NativeControlMode::MotionMagic => {
                let max_step = self.params.cruise_velocity.abs();
                let error = (demand0 - self.position) / (VELOCITY_UNITS_PER_S * CONTROL_PERIOD_S);
                let velocity = error.max(-max_step).min(max_step);
                let output = self.params.kf * velocity / FULL_SCALE + feed_forward;
                self.output = self.clamp_output(output);
                self.advance(velocity);
            }
        }
    }

    fn selected_sensor_position(&self) -> f64 {
        self.position
    }

    fn selected_sensor_velocity(&self) -> f64 {
        self.velocity
    }

    fn motor_output_percent(&self) -> f64 {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_log_is_shared_per_device() {
        let log = CallLog::new();
        let mut a = SimController::with_log(1, log.clone());
        let mut b = SimController::with_log(2, log.clone());

        a.config_factory_default(TIMEOUT);
        b.set_neutral_mode(NeutralMode::Brake);
        b.follow(&a);

        assert_eq!(log.calls(1), vec![Call::FactoryDefault]);
        assert_eq!(log.names(2), vec!["set_neutral_mode", "follow"]);
        assert_eq!(log.all().len(), 3);
        assert_eq!(b.master(), Some(1));
    }

    #[test]
    fn test_fault_injection() {
        let mut sim = SimController::new(1).fail_on("config_kd", ErrorCode::TxFailed);
        assert_eq!(sim.config_kp(0, 1.0, TIMEOUT), ErrorCode::Ok);
        assert_eq!(sim.config_kd(0, 1.0, TIMEOUT), ErrorCode::TxFailed);
        // The failing call still reached the device
        assert_eq!(sim.log().names(1), vec!["config_kp", "config_kd"]);
    }

    #[test]
    fn test_latency_past_timeout() {
        let mut sim = SimController::new(1).with_latency(Duration::from_millis(150));
        assert_eq!(sim.config_factory_default(TIMEOUT), ErrorCode::RxTimeout);
        assert_eq!(
            sim.config_factory_default(Duration::from_millis(200)),
            ErrorCode::Ok
        );
    }

    #[test]
    fn test_percent_output_respects_peaks() {
        let mut sim = SimController::new(1);
        sim.config_peak_output_forward(0.5, TIMEOUT);
        sim.set(NativeControlMode::PercentOutput, 0.8, DemandType::ArbitraryFeedForward, 0.1);
        assert_eq!(sim.motor_output_percent(), 0.5);
        assert!(sim.selected_sensor_position() > 0.0);

        sim.set(NativeControlMode::Disabled, 0.8, DemandType::ArbitraryFeedForward, 0.0);
        assert_eq!(sim.motor_output_percent(), 0.0);
        assert_eq!(sim.selected_sensor_velocity(), 0.0);
    }

    #[test]
    fn test_soft_limit_stops_motion() {
        let mut sim = SimController::new(1);
        sim.config_forward_soft_limit_enable(true, TIMEOUT);
        sim.config_forward_soft_limit_threshold(10, TIMEOUT);
        for _ in 0..10 {
            sim.set(NativeControlMode::PercentOutput, 1.0, DemandType::Neutral, 0.0);
        }
        assert_eq!(sim.selected_sensor_position(), 10.0);
        assert_eq!(sim.selected_sensor_velocity(), 0.0);
    }

    #[test]
    fn test_motion_magic_reaches_target() {
        let mut sim = SimController::new(1);
        sim.config_motion_cruise_velocity(500, TIMEOUT);
        sim.set_selected_sensor_position(0, 0, TIMEOUT);
        for _ in 0..20 {
            sim.set(NativeControlMode::MotionMagic, 1000.0, DemandType::ArbitraryFeedForward, 0.0);
        }
        assert!((sim.selected_sensor_position() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_cruise_velocity_moves_toward_target() {
        let mut sim = SimController::new(1);
        sim.config_motion_cruise_velocity(-100, TIMEOUT);
        sim.set(NativeControlMode::MotionMagic, 10.0, DemandType::ArbitraryFeedForward, 0.0);
        assert!(sim.selected_sensor_position() > 0.0);
        assert!(sim.selected_sensor_position() <= 10.0 + 1e-9);
    }

    #[test]
    fn test_crossed_peak_outputs_do_not_panic() {
        let mut sim = SimController::new(1);
        sim.config_peak_output_forward(0.3, TIMEOUT);
        sim.config_peak_output_reverse(0.5, TIMEOUT);
        sim.set(NativeControlMode::PercentOutput, 0.1, DemandType::ArbitraryFeedForward, 0.0);
        assert_eq!(sim.motor_output_percent(), 0.3);
        sim.set(NativeControlMode::Velocity, 100.0, DemandType::ArbitraryFeedForward, 0.0);
        assert_eq!(sim.motor_output_percent(), 0.3);
    }

    #[test]
    fn test_factory_default_clears_params() {
        let mut sim = SimController::new(1);
        sim.config_peak_output_forward(0.2, TIMEOUT);
        sim.set_inverted(InvertType::InvertMotorOutput);
        sim.config_factory_default(TIMEOUT);
        assert_eq!(sim.invert(), InvertType::None);
        sim.set(NativeControlMode::PercentOutput, 0.9, DemandType::Neutral, 0.0);
        assert_eq!(sim.motor_output_percent(), 0.9);
    }
}
