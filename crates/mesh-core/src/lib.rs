//! Mesh networking, DKG, and threshold-signing state machines for a FROST
//! node: connection setup over WebRTC-shaped signaling, a one-shot
//! mesh-ready barrier, an out-of-order-tolerant DKG engine, and a
//! threshold signing engine, all curve-generic over `frost_primitives::FrostCurve`.

pub mod config;
pub mod connection;
pub mod dkg;
pub mod error;
pub mod keystore;
pub mod mesh;
pub mod node;
pub mod router;
pub mod session;
pub mod signal;
pub mod signing;
pub mod transport;
pub mod types;
pub mod webrtc_transport;

pub use config::NodeConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use dkg::{DkgEngine, DkgOutput};
pub use error::{CoreError, Result};
pub use mesh::{MeshReady, MeshSupervisor};
pub use node::{InternalCommand, NodeContext};
pub use router::{route, ApplicationMessage, Routed};
pub use session::{SessionCoordinator, SessionProposal, SessionResponse};
pub use signal::{SignalGateway, SignalEnvelope};
pub use signing::{SigningEngine, SigningOutput};
pub use transport::{InMemoryTransport, Transport, TransportEvent};
pub use types::{
    Curve, DeviceId, DkgState, KeyMaterial, MeshStatus, Session, SessionPurpose, SigningState,
    WalletRecord,
};
pub use webrtc_transport::WebRtcTransport;
