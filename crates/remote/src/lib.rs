pub mod error;
pub mod memory;
pub mod traits;

pub use error::RemoteError;
pub use memory::{ImportRequest, MemoryRemote, RemoteCall, RemoteFunction};
pub use traits::*;
