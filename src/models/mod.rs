pub mod claim;
pub mod device;
pub mod fanout;
pub mod installation;
pub mod settings;

pub use claim::{ClaimOutcome, ClaimType, DeviceClaim};
pub use device::{Device, DeviceFamily, DeviceInfo};
pub use fanout::FanoutMessage;
pub use installation::{Installation, InstallationConfig, InstallationFlags};
pub use settings::{DeviceSettings, MatrxSettings};
