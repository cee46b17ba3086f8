//! IPTV channel-list and EPG aggregation pipeline.
//!
//! Fetches a playlist and program-guide data from remote sources, merges
//! alias-equivalent channels, resolves alternate stream URLs, and exposes
//! the result as an observable state machine with bounded retry around the
//! network steps.

pub mod config;
pub mod errors;
pub mod models;
pub mod notifications;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod utils;
