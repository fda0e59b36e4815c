//! Session lifecycle: token pairs on top of a revocable session cache.

mod manager;
mod record;
mod store;

pub use manager::{IssuedSession, RotationPolicy, SessionError, SessionManager, TokenPair};
pub use record::{SessionRecord, SessionSnapshot};
pub use store::{MemorySessionBackend, SessionBackend, SessionStore, StoreError};
