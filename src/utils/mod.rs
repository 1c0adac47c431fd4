//! Utility functions and helpers for the gateway.
//!
//! This module provides cross-cutting concerns like structured logging,
//! token sanitization, and intelligent retry logic with backoff.
//!
//! # Submodules
//!
//! - `ids`: Minting synthesized message/tool identifiers and signatures.
//! - `logging`: Tracing and logging initialization with security filters.
//! - `retry`: Robust retry mechanisms that respect upstream API hints.

pub mod filelog;
pub mod ids;
pub mod logging;
pub mod retry;
