// Uniform controller surface over a configured Phoenix handle

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::configurator::{ControllerConfigurator, ControllerError, Result};
use super::phoenix::{DemandType, InvertType, NativeControlMode, PhoenixController};
use crate::config::ControllerConfig;

/// Caller-facing control modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMode {
    Disabled,
    PercentOutput,
    SmartMotion,
    SmartVelocity,
}

impl ControlMode {
    pub fn native(self) -> NativeControlMode {
        match self {
            ControlMode::Disabled => NativeControlMode::Disabled,
            ControlMode::PercentOutput => NativeControlMode::PercentOutput,
            ControlMode::SmartMotion => NativeControlMode::MotionMagic,
            ControlMode::SmartVelocity => NativeControlMode::Velocity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Disabled => "DISABLED",
            ControlMode::PercentOutput => "PERCENT_OUTPUT",
            ControlMode::SmartMotion => "SMART_MOTION",
            ControlMode::SmartVelocity => "SMART_VELOCITY",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ControlMode {
    type Error = ControllerError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ControlMode::Disabled),
            1 => Ok(ControlMode::PercentOutput),
            2 => Ok(ControlMode::SmartMotion),
            3 => Ok(ControlMode::SmartVelocity),
            other => Err(ControllerError::UnknownControlMode(other.to_string())),
        }
    }
}

impl FromStr for ControlMode {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DISABLED" => Ok(ControlMode::Disabled),
            "PERCENT_OUTPUT" => Ok(ControlMode::PercentOutput),
            "SMART_MOTION" => Ok(ControlMode::SmartMotion),
            "SMART_VELOCITY" => Ok(ControlMode::SmartVelocity),
            other => Err(ControllerError::UnknownControlMode(other.to_string())),
        }
    }
}

/// What the tuner needs from any motor controller
pub trait Controller: Any {
    fn id(&self) -> i32;

    /// Mirror `master` in firmware, optionally opposing it
    fn follow(&mut self, master: &dyn Controller, is_inverted: bool) -> Result<()>;

    fn set_output(&mut self, mode: ControlMode, reference: f64, arbitrary_feed_forward: f64);

    fn position(&self) -> f64;

    fn velocity(&self) -> f64;

    fn applied_percent_output(&self) -> f64;

    fn as_any(&self) -> &dyn Any;
}

/// A configured CTRE controller
#[derive(Debug)]
pub struct CtreController<C> {
    id: i32,
    controller: C,
}

impl<C: PhoenixController + 'static> CtreController<C> {
    /// Build the handle through `factory` and run the full config sequence
    pub fn new<F>(
        factory: F,
        config: &ControllerConfig,
        configurator: &ControllerConfigurator,
    ) -> Result<Self>
    where
        F: FnOnce(i32) -> C,
    {
        let controller = configurator.configure(factory, config)?;
        Ok(Self {
            id: config.id(),
            controller,
        })
    }

    /// Underlying vendor handle
    pub fn inner(&self) -> &C {
        &self.controller
    }
}

impl<C: PhoenixController + 'static> Controller for CtreController<C> {
    fn id(&self) -> i32 {
        self.id
    }

    fn follow(&mut self, master: &dyn Controller, is_inverted: bool) -> Result<()> {
        let Some(master) = master.as_any().downcast_ref::<CtreController<C>>() else {
            let err = ControllerError::Follow {
                id: self.id,
                reason: format!("controller {} is not the same kind of device", master.id()),
            };
            error!("{}", err);
            return Err(err);
        };

        debug!(
            "Controller {} following {} (inverted: {})",
            self.id, master.id, is_inverted
        );
        self.controller.follow(&master.controller);
        self.controller.set_inverted(if is_inverted {
            InvertType::OpposeMaster
        } else {
            InvertType::FollowMaster
        });
        Ok(())
    }

    fn set_output(&mut self, mode: ControlMode, reference: f64, arbitrary_feed_forward: f64) {
        self.controller.set(
            mode.native(),
            reference,
            DemandType::ArbitraryFeedForward,
            arbitrary_feed_forward,
        );
    }

    fn position(&self) -> f64 {
        self.controller.selected_sensor_position()
    }

    fn velocity(&self) -> f64 {
        self.controller.selected_sensor_velocity()
    }

    fn applied_percent_output(&self) -> f64 {
        self.controller.motor_output_percent()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimpleConfig;
    use crate::controller::sim::{Call, CallLog, SimController};

    fn simple(id: i32, log: &CallLog) -> CtreController<SimController> {
        let log = log.clone();
        CtreController::new(
            |id| SimController::with_log(id, log),
            &ControllerConfig::Simple(SimpleConfig {
                id,
                is_braked: false,
            }),
            &ControllerConfigurator::default(),
        )
        .unwrap()
    }

    /// A device of a different kind, for follow mismatches
    struct OtherController;

    impl Controller for OtherController {
        fn id(&self) -> i32 {
            42
        }

        fn follow(&mut self, _master: &dyn Controller, _is_inverted: bool) -> Result<()> {
            Ok(())
        }

        fn set_output(&mut self, _mode: ControlMode, _reference: f64, _ff: f64) {}

        fn position(&self) -> f64 {
            0.0
        }

        fn velocity(&self) -> f64 {
            0.0
        }

        fn applied_percent_output(&self) -> f64 {
            0.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_modes_map_one_to_one() {
        let modes = [
            ControlMode::Disabled,
            ControlMode::PercentOutput,
            ControlMode::SmartMotion,
            ControlMode::SmartVelocity,
        ];
        let native: Vec<_> = modes.iter().map(|m| m.native()).collect();
        assert_eq!(
            native,
            vec![
                NativeControlMode::Disabled,
                NativeControlMode::PercentOutput,
                NativeControlMode::MotionMagic,
                NativeControlMode::Velocity,
            ]
        );
        for mode in modes {
            assert_eq!(mode.as_str().parse::<ControlMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        assert_eq!(ControlMode::try_from(2u8).unwrap(), ControlMode::SmartMotion);
        assert!(matches!(
            ControlMode::try_from(4u8),
            Err(ControllerError::UnknownControlMode(v)) if v == "4"
        ));
        assert!(matches!(
            "POSITION".parse::<ControlMode>(),
            Err(ControllerError::UnknownControlMode(_))
        ));
        assert!(serde_json::from_str::<ControlMode>("\"POSITION\"").is_err());
        assert_eq!(
            serde_json::from_str::<ControlMode>("\"SMART_VELOCITY\"").unwrap(),
            ControlMode::SmartVelocity
        );
    }

    #[test]
    fn test_set_output_issues_one_command() {
        let log = CallLog::new();
        let mut controller = simple(1, &log);
        controller.set_output(ControlMode::SmartMotion, 1000.0, 0.1);

        assert_eq!(
            log.calls(1).last(),
            Some(&Call::Set {
                mode: NativeControlMode::MotionMagic,
                demand0: 1000.0,
                demand_type: DemandType::ArbitraryFeedForward,
                demand1: 0.1,
            })
        );
        assert_eq!(log.names(1).iter().filter(|n| **n == "set").count(), 1);
    }

    #[test]
    fn test_getters_read_the_device() {
        let log = CallLog::new();
        let mut controller = simple(1, &log);
        controller.set_output(ControlMode::PercentOutput, 0.5, 0.0);

        assert_eq!(controller.applied_percent_output(), 0.5);
        assert_eq!(controller.velocity(), controller.inner().selected_sensor_velocity());
        assert!(controller.position() > 0.0);

        let calls = log.calls(1).len();
        let _ = (controller.position(), controller.velocity());
        assert_eq!(log.calls(1).len(), calls);
    }

    #[test]
    fn test_follow_oppose_master() {
        let log = CallLog::new();
        let master = simple(1, &log);
        let mut slave = simple(2, &log);

        slave.follow(&master, true).unwrap();
        assert_eq!(slave.inner().master(), Some(1));
        assert_eq!(
            log.calls(2)[2..],
            [
                Call::Follow { master: 1 },
                Call::Inverted(InvertType::OpposeMaster)
            ]
        );
    }

    #[test]
    fn test_follow_with_master() {
        let log = CallLog::new();
        let master = simple(1, &log);
        let mut slave = simple(2, &log);

        slave.follow(&master, false).unwrap();
        assert_eq!(slave.inner().invert(), InvertType::FollowMaster);
        assert_eq!(log.calls(2).last(), Some(&Call::Inverted(InvertType::FollowMaster)));
    }

    #[test]
    fn test_follow_incompatible_master() {
        let log = CallLog::new();
        let mut slave = simple(2, &log);

        let err = slave.follow(&OtherController, false).unwrap_err();
        assert!(matches!(err, ControllerError::Follow { id: 2, .. }));
        assert!(err.to_string().starts_with("Could not follow!"));
        assert!(!log.names(2).contains(&"follow"));
    }
}
