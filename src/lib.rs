//! vodsync: keeps a local video-metadata store synchronized with an external
//! video platform (periodic pull + WebSub push) and coordinates cache
//! invalidation across in-process, edge, and regenerated-page layers.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
