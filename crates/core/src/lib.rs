//! Core library: permission fixing, rescan pipeline, job waiting, polling.

pub mod config;
pub mod events;
pub mod jobs;
pub mod layout;
pub mod paths;
pub mod permissions;
pub mod pipeline;
pub mod poller;
pub mod rescan;
