pub mod discovery;
pub mod error;
pub mod messenger;
pub mod node;
pub mod peers;

pub use discovery::{Discovery, ANNOUNCE_INTERVAL, DISCOVERY_PORT};
pub use error::{MeshError, Result};
pub use messenger::{Handler, Messenger, Payload, RequestContext};
pub use node::Node;
pub use peers::{PeerDescriptor, PeerTable};
