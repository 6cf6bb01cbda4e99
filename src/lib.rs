#![forbid(unsafe_code)]

//! Shared library behind the PhewTube binaries: configuration, the video
//! catalog, YouTube channel/avatar resolution and the question assistant.

pub mod assistant;
pub mod catalog;
pub mod config;
pub mod format;
pub mod http;
pub mod logging;
pub mod security;
pub mod transcribe;
pub mod youtube;
