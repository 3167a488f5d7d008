// Audio capture: platform seam, analysis graph, and the session machine.

pub mod analyser;
pub mod devices;
pub mod session;

pub use analyser::Analyser;
pub use devices::{
    AudioDeviceDescriptor, AudioError, CaptureStream, CpalMediaDevices, DeviceInfo, DeviceKind,
    MediaDevices,
};
pub use session::{AudioSessionManager, AudioStatus};
