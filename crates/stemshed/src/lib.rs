//! Stemshed - asynchronous audio source-separation job service
//!
//! Library exposing core modules for testing and reuse.

pub mod audio;
pub mod error;
pub mod job_system;
pub mod record;
pub mod separation;
pub mod telemetry;
pub mod web;
