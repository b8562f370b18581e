pub mod addr;
pub mod error;
pub mod id;

pub use addr::{ephemeral_port, resolve_local_ip};
pub use error::{CoreError, Result};
pub use id::{NodeIdentity, PeerId};
