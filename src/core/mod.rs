pub mod assignment;
pub mod codec;
pub mod credentials;
pub mod polling;

pub use crate::domain::model::{RegistryRecord, ScanResult, TagHandle};
pub use crate::domain::ports::{AuthService, RegistryApi, RfidReader};
pub use crate::utils::error::Result;
