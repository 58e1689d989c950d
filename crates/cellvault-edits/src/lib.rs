pub mod config;
pub mod error;
pub mod manager;
pub mod session;
pub mod snapshot;

pub use config::PendingEditConfig;
pub use error::{EditError, Result, SessionError};
pub use manager::{AcceptOutcome, EditId, PendingEditManager, RejectOutcome};
pub use session::{LiveSession, MemorySession, MemorySessionManager, SessionManager, SharedSession};
pub use snapshot::OriginalState;
