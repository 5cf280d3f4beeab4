// Adapters layer: concrete implementations of the domain ports (registry over HTTP, vendor reader driver)

pub mod http;
pub mod reader;
