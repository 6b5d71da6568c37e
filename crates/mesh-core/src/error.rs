//! Structured error types for the mesh/session/DKG/signing core.

use thiserror::Error;

/// Errors surfaced by the transport layer (one duplex channel per peer).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("channel to {0} is closed")]
    ChannelClosed(String),

    #[error("send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },

    #[error("unknown peer: {0}")]
    UnknownPeer(String),
}

/// Errors surfaced by the signal gateway (relay fan-out).
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("relay unavailable")]
    RelayUnavailable,

    #[error("malformed signaling envelope: {0}")]
    Malformed(String),
}

/// Errors surfaced by package routing and the DKG/signing wire protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("duplicate package from {from} for round {round}")]
    DuplicatePackage { from: String, round: u8 },

    #[error("package outside tolerance from {0}")]
    OutOfTolerance(String),

    #[error("unknown sender: {0}")]
    UnknownSender(String),

    #[error("unrecognized message tag: {0}")]
    UnknownTag(String),
}

/// Errors surfaced by the FROST primitive (fatal for the current session).
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("primitive rejected package: {0}")]
    PackageRejected(String),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("primitive error: {0}")]
    Primitive(String),
}

/// Errors surfaced by the session coordinator (fatal for the session).
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("parameters mismatch existing wallet: {0}")]
    ParameterMismatch(String),

    #[error("device {0} declined the session")]
    Declined(String),

    #[error("session acceptance timed out")]
    AcceptanceTimeout,

    #[error("no active session")]
    NoActiveSession,
}

/// Errors surfaced by the single-owner concurrency rules (§5).
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    #[error("a DKG session is already active")]
    DkgAlreadyActive,

    #[error("a signing session is already active")]
    SigningAlreadyActive,
}

/// Umbrella error type returned by the engines' public operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
