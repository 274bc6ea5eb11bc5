// Motor controller layer for the tuner
//
// Provides:
// - Phoenix vendor API seam (status codes, native modes, controller trait)
// - Ordered configuration of new controller handles
// - Follow / output / sensor facade used by the runtime
// - Simulated controller for running without hardware

mod configurator;
mod ctre;
pub mod phoenix;
pub mod sim;

pub use configurator::{ControllerConfigurator, ControllerError, round};
pub use ctre::{ControlMode, Controller, CtreController};
pub use phoenix::{ErrorCode, PhoenixController};
pub use sim::SimController;
