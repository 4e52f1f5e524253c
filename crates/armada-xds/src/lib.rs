//! armada-xds — the ADS protocol surface.
//!
//! One long-lived bidirectional gRPC stream per connected proxy, all
//! resource types aggregated. Each stream is owned by a single task that
//! funnels inbound requests and snapshot-cache updates through one
//! `select!` loop, so nothing else ever writes to the stream.
//!
//! # Architecture
//!
//! ```text
//! AdsServer (gRPC)
//!   └── one task per stream
//!       ├── Session — per-stream state machine
//!       │   ├── Connecting → Authenticated → Active
//!       │   ├── per-type subscription / sent / acked bookkeeping
//!       │   └── Stale (idle 120s) → Disconnected (idle 300s)
//!       ├── SnapshotCache watch — latest-wins snapshot updates
//!       └── StreamRegistry — instance table + AckEvent broadcast
//! ```

pub mod registry;
pub mod server;
pub mod session;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("armada.xds");
}

pub use registry::{AckEvent, AckOutcome, RegistryConfig, StreamRegistry};
pub use server::AdsServer;
pub use session::{Disposition, Session, SessionConfig, SessionState};

use thiserror::Error;

/// Errors surfaced by the ADS layer.
#[derive(Debug, Error)]
pub enum XdsError {
    #[error("stream closed before registration")]
    NoRegistration,

    #[error("response channel closed")]
    StreamClosed,

    #[error("transport error: {0}")]
    Transport(#[from] tonic::Status),
}

pub type XdsResult<T> = Result<T, XdsError>;
