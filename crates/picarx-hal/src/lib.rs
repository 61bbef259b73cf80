//! Hardware abstraction for the Picar-X: actuator and sensor gateways,
//! servo limits, ground classification and an in-process simulated robot.

pub mod actuator;
pub mod camera;
pub mod ground;
pub mod limits;
pub mod sensor;
pub mod sim;

pub use actuator::ActuatorGateway;
pub use camera::{ImageEncoding, Snapshot};
pub use ground::{GroundReference, GroundStatus};
pub use limits::{MAX_SPEED, ServoLimits, clamp_speed};
pub use sensor::SensorGateway;
pub use sim::{SimActuators, SimCommand, SimRobot, SimSensors};
