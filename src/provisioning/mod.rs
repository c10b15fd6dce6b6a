//! Gateway session provisioning.
//!
//! A connect request either confirms an already-authenticated session, hands
//! back the QR code of a session waiting for a scan, or replaces the session
//! with a fresh one and waits for its QR code. Local tables are updated after
//! each of those outcomes.

pub mod envelope;
pub mod identity;
pub mod orchestrator;
pub mod qr;
pub mod readiness;
pub mod resolver;
pub mod sync;
pub mod validation;

pub use envelope::{ConnectOutcome, ConnectRequest, ConnectResponse, ConnectionView, SessionSummary};
pub use orchestrator::ConnectOrchestrator;
