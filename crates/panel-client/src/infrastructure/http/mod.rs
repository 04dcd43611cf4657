//! HTTP access to the device's web server.

pub mod debounce;
pub mod device_api;

pub use debounce::{DebouncedControl, Debouncer};
pub use device_api::{DeviceApi, DeviceApiError, LogSource, StatusQuery};
