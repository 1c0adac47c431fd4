// gem2claude - OAuth-based Gemini API to Claude Code Compatible Proxy
// Author: kelexine (https://github.com/kelexine)

pub mod cli;
pub mod config;
pub mod error;
pub mod gemini;
pub mod metrics;
pub mod models;
pub mod oauth;
pub mod passthrough;
pub mod server;
pub mod translation;
pub mod utils;
pub mod vision;
