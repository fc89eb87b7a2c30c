mod device_identity;

pub use device_identity::DeviceIdentity;
