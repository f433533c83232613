pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod platform;
pub mod poll;
pub mod session;
pub mod store;
pub mod updates;

pub use auth::{AuthCoordinator, AuthSession, HandshakeStatus, LoginCompletion, LoginOutcome};
pub use config::{AuthConfig, GatewayConfig, PollConfig};
pub use errors::{GatewayError, PlatformError, StorageError};
pub use poll::{PollDispatcher, PollRequest, PollResult};
pub use session::{ClientFactory, ClientHandle, SessionBlob};
pub use updates::{UpdateFanout, UpdateListener};
