//! Application services and ports.

pub mod audit;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod retry;
pub mod subscription;
pub mod sync;
pub mod webhook;
