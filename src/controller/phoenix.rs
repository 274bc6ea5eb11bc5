// Phoenix motor controller API surface
//
// The vendor firmware and its CAN framing are opaque to this crate. Anything
// that can answer these calls (a hardware binding, the simulator) is a
// controller handle.

use std::fmt;
use std::time::Duration;

/// Status code returned by every vendor config call.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    CanMsgStale = 1,
    TxFailed = -1,
    InvalidParamValue = -2,
    RxTimeout = -3,
    TxTimeout = -4,
    UnexpectedArbId = -5,
    BufferFull = 6,
    SensorNotPresent = -8,
    GeneralError = -100,
}

impl ErrorCode {
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    /// Vendor numeric value
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Idle behavior when no output is commanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeutralMode {
    Coast,
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvertType {
    None,
    InvertMotorOutput,
    /// Follower matches the master's direction
    FollowMaster,
    /// Follower drives opposite to the master
    OpposeMaster,
}

impl From<bool> for InvertType {
    fn from(inverted: bool) -> Self {
        if inverted {
            InvertType::InvertMotorOutput
        } else {
            InvertType::None
        }
    }
}

/// Control types understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeControlMode {
    Disabled,
    PercentOutput,
    Velocity,
    MotionMagic,
}

/// Meaning of the second demand channel of `set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandType {
    Neutral,
    ArbitraryFeedForward,
}

/// One vendor motor controller endpoint.
///
/// Config calls block for at most `timeout` waiting for the device to
/// acknowledge. Setters without a status code are fire-and-forget on the
/// vendor side.
pub trait PhoenixController {
    fn device_id(&self) -> i32;

    fn config_factory_default(&mut self, timeout: Duration) -> ErrorCode;
    fn set_neutral_mode(&mut self, mode: NeutralMode);

    fn config_forward_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> ErrorCode;
    fn config_forward_soft_limit_threshold(&mut self, threshold: i32, timeout: Duration)
    -> ErrorCode;
    fn config_reverse_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> ErrorCode;
    fn config_reverse_soft_limit_threshold(&mut self, threshold: i32, timeout: Duration)
    -> ErrorCode;

    fn set_inverted(&mut self, invert: InvertType);
    fn set_sensor_phase(&mut self, phase: bool);

    fn enable_voltage_compensation(&mut self, enable: bool);
    fn config_voltage_comp_saturation(&mut self, volts: f64, timeout: Duration) -> ErrorCode;

    fn config_openloop_ramp(&mut self, seconds: f64, timeout: Duration) -> ErrorCode;
    fn config_closedloop_ramp(&mut self, seconds: f64, timeout: Duration) -> ErrorCode;

    fn config_kp(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode;
    fn config_ki(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode;
    fn config_kd(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode;
    fn config_kf(&mut self, slot: u8, value: f64, timeout: Duration) -> ErrorCode;
    fn config_max_integral_accumulator(&mut self, slot: u8, value: f64, timeout: Duration)
    -> ErrorCode;
    fn config_integral_zone(&mut self, slot: u8, zone: i32, timeout: Duration) -> ErrorCode;

    fn config_peak_output_forward(&mut self, percent: f64, timeout: Duration) -> ErrorCode;
    fn config_peak_output_reverse(&mut self, percent: f64, timeout: Duration) -> ErrorCode;

    fn config_motion_s_curve_strength(&mut self, strength: i32, timeout: Duration) -> ErrorCode;
    fn config_motion_cruise_velocity(&mut self, velocity: i32, timeout: Duration) -> ErrorCode;
    fn config_motion_acceleration(&mut self, acceleration: i32, timeout: Duration) -> ErrorCode;
    fn config_allowable_closedloop_error(&mut self, slot: u8, error: i32, timeout: Duration)
    -> ErrorCode;

    fn set_selected_sensor_position(&mut self, position: i32, pid_idx: u8, timeout: Duration)
    -> ErrorCode;

    /// Mirror `master`'s output every firmware cycle
    fn follow(&mut self, master: &Self);

    fn set(&mut self, mode: NativeControlMode, demand0: f64, demand_type: DemandType, demand1: f64);

    fn selected_sensor_position(&self) -> f64;
    fn selected_sensor_velocity(&self) -> f64;
    fn motor_output_percent(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::RxTimeout.is_ok());
        assert_eq!(ErrorCode::RxTimeout.code(), -3);
        assert_eq!(ErrorCode::TxTimeout.to_string(), "TxTimeout (-4)");
    }

    #[test]
    fn test_invert_from_bool() {
        assert_eq!(InvertType::from(true), InvertType::InvertMotorOutput);
        assert_eq!(InvertType::from(false), InvertType::None);
    }
}
