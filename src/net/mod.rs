//! Host-to-host messaging: wire types, the remote call channel and the
//! simulated transport

pub mod channel;
pub mod protocol;
pub mod transport;

pub use channel::{CallContext, CallDescriptor, CallOutcome, Outgoing, RemoteCallChannel, Route};
pub use protocol::{MulticastEvent, NetMessage, ServerCall, SpawnInfo};
pub use transport::Transport;
