//! waprovision: provisioning and authentication of tenant-scoped messaging
//! gateway sessions.
//!
//! A connect request creates or reuses a session on a remote WhatsApp-style
//! gateway, drives it through startup, returns a scannable QR code and keeps
//! the local connection tables in step with what the gateway reports.

pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod gateway;
pub mod provisioning;
pub mod server;
pub mod settings;

pub use config::Config;
pub use error::{ConnectError, Error, Result};
