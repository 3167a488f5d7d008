// Serial port access: driver seam plus the single-session state machine.

pub mod driver;
pub mod session;

pub use driver::{
    PortDescriptor, SerialDriver, SerialError, SerialEvent, SerialLink, SystemSerialDriver,
};
pub use session::{SerialSessionManager, SerialStatus};
