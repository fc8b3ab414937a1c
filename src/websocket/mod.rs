pub mod registry;
pub mod session;

pub use registry::{spawn_stats_task, ConnectionRegistry};
pub use session::{BroadcastSession, CloseReason, SessionLifecycle, SessionReport, SessionSettings, SessionState};
