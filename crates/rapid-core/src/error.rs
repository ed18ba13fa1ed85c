//! The error taxonomy, expressed as five independent `thiserror` enums plus
//! one crate-wide `RapidError` that every public entry point returns.
//!
//! A single hand-rolled catch-all enum with manual `From` impls does not
//! scale to five independently-propagated kinds with different crossing
//! rules (some never leave the process, some cross the wire as status codes,
//! some are absorbed silently) — `thiserror` is used here instead, one enum
//! per kind (see DESIGN.md).

use std::fmt;
use thiserror::Error;

/// Precondition violations: surfaced directly to the caller that misused the
/// API. Never serialized onto the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidityError {
    #[error("hostname must not be empty")]
    EmptyHostname,
    #[error("K (ring count) must be at least {min}, got {actual}")]
    RingCountTooSmall { min: u32, actual: u32 },
    #[error("H (high watermark) must be <= K ({k}), got {h}")]
    HighWatermarkExceedsK { k: u32, h: u32 },
    #[error("L (low watermark) must be <= H ({h}), got {l}")]
    LowWatermarkExceedsHigh { h: u32, l: u32 },
    #[error("L (low watermark) must be > 0")]
    LowWatermarkNotPositive,
    #[error("failure detector threshold must be > 0")]
    FailureDetectorThresholdNotPositive,
    #[error("failure detector max sample size must be > 0")]
    FailureDetectorSampleSizeNotPositive,
    #[error("failure detector scaling factor must be > 0")]
    FailureDetectorScalingFactorNotPositive,
}

/// Internal `MembershipView` invariant violations. Always internal: either
/// recorded and suppressed (stale/out-of-order alert) or, if raised while
/// applying a decided proposal, fatal for that view change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipViewError {
    #[error("endpoint is not present in the ring")]
    NodeNotInRing,
    #[error("endpoint is already present in the ring")]
    NodeAlreadyInRing,
    #[error("node id has already been seen by this view")]
    UuidAlreadySeen,
}

/// The status codes exchanged in a `JoinResponse` (§6). Not a Rust
/// `std::error::Error` in the panicking sense — it is the normal, expected
/// result of a join attempt, and the joiner's retry policy (§6) branches on
/// every variant including the success case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum JoinStatusCode {
    SafeToJoin,
    HostnameAlreadyInRing,
    UuidAlreadyInRing,
    SameNodeAlreadyInRing,
    ViewChangeInProgress,
}

impl fmt::Display for JoinStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinStatusCode::SafeToJoin => "SAFE_TO_JOIN",
            JoinStatusCode::HostnameAlreadyInRing => "HOSTNAME_ALREADY_IN_RING",
            JoinStatusCode::UuidAlreadyInRing => "UUID_ALREADY_IN_RING",
            JoinStatusCode::SameNodeAlreadyInRing => "SAME_NODE_ALREADY_IN_RING",
            JoinStatusCode::ViewChangeInProgress => "VIEW_CHANGE_IN_PROGRESS",
        };
        f.write_str(s)
    }
}

/// `JoinError` in the taxonomy of §7 names the same status codes as
/// `JoinResponse.statusCode` (§6) — one type serves both the in-process
/// decision and the wire representation, since they must always agree.
pub type JoinError = JoinStatusCode;

/// Transport-level failures. Best-effort messages absorb these silently;
/// guaranteed sends (e.g. a join request) retry a small bounded number of
/// times with a per-kind timeout.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("no connection could be established to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },
    #[error("request to {endpoint} timed out after {millis}ms")]
    Timeout { endpoint: String, millis: u64 },
    #[error("send to {endpoint} failed: {reason}")]
    SendFailed { endpoint: String, reason: String },
    #[error("connection to {endpoint} closed by peer")]
    ConnectionClosed { endpoint: String },
    #[error("malformed message on the wire: {0}")]
    Codec(String),
}

/// Receiving a message that the state machine's current state cannot act on
/// (e.g. a consensus message while `Leaving`). Surfaced to the local caller as
/// this error; peers instead see a plain empty `Response`, since a state
/// mismatch is a local concern, not something worth explaining over the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("message is invalid in the current state: {state}")]
pub struct StateError {
    pub state: String,
}

impl StateError {
    pub fn message_in_invalid_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }
}

/// The crate-wide error every public entry point returns. Internal code
/// matches on the specific kind it produces; only code at a crate boundary
/// (the facade) needs to see the unified type.
#[derive(Debug, Error, Clone)]
pub enum RapidError {
    #[error(transparent)]
    Validity(#[from] ValidityError),
    #[error(transparent)]
    MembershipView(#[from] MembershipViewError),
    #[error("join rejected: {0}")]
    Join(JoinError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<JoinError> for RapidError {
    fn from(e: JoinError) -> Self {
        RapidError::Join(e)
    }
}

pub type Result<T> = std::result::Result<T, RapidError>;
