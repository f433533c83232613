//! Client handles and the session data that authorizes them.

pub mod blob;
pub mod handle;
pub mod storage;

pub use blob::SessionBlob;
pub use handle::{ClientFactory, ClientHandle};
pub use storage::{FileSessionStorage, SessionStorage};
