// Applies a controller config to a fresh vendor handle
//
// Order matters: factory defaults first, then neutral mode, then the master
// parameter set. The first failing call aborts and nothing after it is sent.

use tracing::{debug, error, info};

use super::phoenix::{ErrorCode, InvertType, NeutralMode, PhoenixController};
use crate::config::{
    CONFIG_TIMEOUT, ControllerConfig, DEFAULT_PID_SLOT, MasterConfig, PRIMARY_PID_IDX,
    S_CURVE_STRENGTH,
};

/// Error types for controller setup and use
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Failed to set {parameter} on controller {id}! Error: {code}")]
    Config {
        id: i32,
        parameter: &'static str,
        code: ErrorCode,
    },

    #[error("Could not follow! Controller {id}: {reason}")]
    Follow { id: i32, reason: String },

    #[error("Unknown control mode: {0}")]
    UnknownControlMode(String),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Round half away from zero into vendor integer units
pub fn round(value: f64) -> i32 {
    value.round() as i32
}

/// Runs the configuration sequence against new controller handles
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfigurator {
    pid_slot: u8,
}

impl Default for ControllerConfigurator {
    fn default() -> Self {
        Self::new(DEFAULT_PID_SLOT)
    }
}

impl ControllerConfigurator {
    /// Write gains into `pid_slot`
    pub fn new(pid_slot: u8) -> Self {
        Self { pid_slot }
    }

    /// Create the handle for `config.id()` and configure it.
    ///
    /// On error the handle is dropped half-configured; the controller is
    /// unusable and the caller must not retry against it.
    pub fn configure<C, F>(&self, factory: F, config: &ControllerConfig) -> Result<C>
    where
        C: PhoenixController,
        F: FnOnce(i32) -> C,
    {
        let id = config.id();
        info!("Configuring controller {}", id);
        let mut controller = factory(id);

        check(id, controller.config_factory_default(CONFIG_TIMEOUT), "factory defaults")?;
        controller.set_neutral_mode(if config.is_braked() {
            NeutralMode::Brake
        } else {
            NeutralMode::Coast
        });

        if let ControllerConfig::Master(master) = config {
            self.apply_master(&mut controller, master)?;
        }

        info!("Controller {} configured", id);
        Ok(controller)
    }

    fn apply_master<C: PhoenixController>(&self, c: &mut C, config: &MasterConfig) -> Result<()> {
        let id = config.id;
        let slot = self.pid_slot;
        let t = CONFIG_TIMEOUT;
        let gains = &config.gains;
        debug!("Applying master parameters to controller {} (slot {})", id, slot);

        self.forward_soft_limit(c, config.forward_limit)?;
        self.reverse_soft_limit(c, config.reverse_limit)?;
        c.set_inverted(InvertType::from(config.is_inverted));
        c.set_sensor_phase(config.is_sensor_inverted);
        c.enable_voltage_compensation(true);
        check(
            id,
            c.config_voltage_comp_saturation(config.voltage_compensation, t),
            "voltage compensation",
        )?;
        check(id, c.config_openloop_ramp(config.ramp, t), "open loop ramp")?;
        check(id, c.config_closedloop_ramp(config.ramp, t), "closed loop ramp")?;
        check(id, c.config_kp(slot, gains.p, t), "p")?;
        check(id, c.config_ki(slot, gains.i, t), "i")?;
        check(id, c.config_kd(slot, gains.d, t), "d")?;
        check(id, c.config_kf(slot, gains.f, t), "f")?;
        check(id, c.config_max_integral_accumulator(slot, gains.i_max, t), "i max")?;
        check(id, c.config_integral_zone(slot, round(gains.i_zone), t), "i zone")?;
        check(
            id,
            c.config_peak_output_forward(config.maximum_output, t),
            "peak forward output",
        )?;
        check(
            id,
            c.config_peak_output_reverse(config.minimum_output, t),
            "peak reverse output",
        )?;
        check(id, c.config_motion_s_curve_strength(S_CURVE_STRENGTH, t), "s curve")?;
        check(id, c.config_motion_cruise_velocity(round(gains.v), t), "max velocity")?;
        check(id, c.config_motion_acceleration(round(gains.a), t), "max acceleration")?;
        check(
            id,
            c.config_allowable_closedloop_error(slot, round(gains.allowable_error), t),
            "allowable error",
        )?;
        check(
            id,
            c.set_selected_sensor_position(round(config.starting_position), PRIMARY_PID_IDX, t),
            "starting position",
        )
    }

    // The firmware only honors a threshold once its enable flag is set
    fn forward_soft_limit<C: PhoenixController>(
        &self,
        c: &mut C,
        limit: Option<f64>,
    ) -> Result<()> {
        let id = c.device_id();
        check(
            id,
            c.config_forward_soft_limit_enable(limit.is_some(), CONFIG_TIMEOUT),
            "enable forward soft limit",
        )?;
        if let Some(limit) = limit {
            check(
                id,
                c.config_forward_soft_limit_threshold(round(limit), CONFIG_TIMEOUT),
                "set forward soft limit",
            )?;
        }
        Ok(())
    }

    fn reverse_soft_limit<C: PhoenixController>(
        &self,
        c: &mut C,
        limit: Option<f64>,
    ) -> Result<()> {
        let id = c.device_id();
        check(
            id,
            c.config_reverse_soft_limit_enable(limit.is_some(), CONFIG_TIMEOUT),
            "enable reverse soft limit",
        )?;
        if let Some(limit) = limit {
            check(
                id,
                c.config_reverse_soft_limit_threshold(round(limit), CONFIG_TIMEOUT),
                "set reverse soft limit",
            )?;
        }
        Ok(())
    }
}

fn check(id: i32, code: ErrorCode, parameter: &'static str) -> Result<()> {
    if code.is_ok() {
        return Ok(());
    }
    error!("Failed to set {} on controller {}! Error: {}", parameter, id, code);
    Err(ControllerError::Config {
        id,
        parameter,
        code,
    })
}
