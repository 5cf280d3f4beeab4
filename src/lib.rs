pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};
pub use config::AppConfig;

pub use adapters::http::{HttpAuthService, HttpRegistry, RegistryClients};
pub use adapters::reader::{DriverReader, ReaderDriver};
pub use crate::core::assignment::{normalize_plate, AssignmentService, AssignmentSettings};
pub use crate::core::credentials::CredentialStore;
pub use utils::error::{Result, RfidError};
