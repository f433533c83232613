//! Login handshakes: starting them, feeding them codes and passwords, and
//! turning a finished one into an exported session.

pub mod callbacks;
pub mod completion;
pub mod coordinator;
pub mod rendezvous;
pub mod state;

pub use callbacks::PhoneAuthenticator;
pub use completion::{LoginCompletion, LoginOutcome};
pub use coordinator::AuthCoordinator;
pub use rendezvous::{RendezvousChannels, SlotKind};
pub use state::{AuthSession, HandshakeStatus};
