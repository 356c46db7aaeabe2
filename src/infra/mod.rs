//! Infrastructure adapters and runtime bootstrap.

pub mod cdn;
pub mod db;
pub mod error;
pub mod http;
pub mod platform;
pub mod revalidate;
pub mod telemetry;
pub mod websub;
