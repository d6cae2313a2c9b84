//! Core domain + application logic for the Telegram → Drive relay.
//!
//! This crate is intentionally framework-agnostic. Telegram and Google Drive
//! live behind ports (traits) implemented in adapter crates.

pub mod audit;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod onboarding;
pub mod ports;
pub mod record;
pub mod staging;
pub mod transfer;

pub use errors::{Error, Result};
