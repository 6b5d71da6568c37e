//! Node-wide configuration: ICE servers, timers, and the DKG auto-trigger flag.

use std::time::Duration;

/// Data-channel label used for the FROST mesh. Channels offered under any
/// other label are rejected by the connection manager (§4.3).
pub const FROST_CHANNEL_LABEL: &str = "frost-dkg";

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub ice_servers: Vec<String>,

    /// Session acceptance timer. Recommended 60s (§5).
    pub session_accept_timeout: Duration,

    /// Stall timer for a DKG round with no hard protocol timeout.
    /// Recommended 120s (§5).
    pub dkg_stall_timeout: Duration,

    /// Signing acceptance timer. Recommended 30s (§5).
    pub signing_accept_timeout: Duration,

    /// Gates DKG auto-trigger condition (c) from §4.6: initializing the
    /// engine purely because buffered round-1 packages exist from every
    /// other participant, without having been told to `initialize()`
    /// explicitly.
    ///
    /// Defaults to `false`. The source this protocol was distilled from
    /// fires this condition unconditionally, which is unsafe in the
    /// presence of slow joiners: a device that has not yet accepted the
    /// session can still have sent a round-1 package ahead of time (or a
    /// malformed/duplicated one can be replayed from a stale buffer), and
    /// auto-starting DKG from buffer contents alone skips the session's
    /// "every participant accepted" gate that the mesh barrier otherwise
    /// enforces. Flip this on only for deployments where every participant
    /// is known to join promptly and session acceptance is not a
    /// meaningful trust boundary.
    pub auto_trigger_dkg_from_buffer: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            session_accept_timeout: Duration::from_secs(60),
            dkg_stall_timeout: Duration::from_secs(120),
            signing_accept_timeout: Duration::from_secs(30),
            auto_trigger_dkg_from_buffer: false,
        }
    }
}
