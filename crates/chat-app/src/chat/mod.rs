pub mod copy;
pub mod message;
pub mod orchestrator;
pub mod persistence;
pub mod renderer;
pub mod session;

pub use message::{ChatContext, History, Message, Role};
pub use orchestrator::{ChatOrchestrator, SubmitOutcome};
pub use persistence::{DEFAULT_HISTORY_KEY, PersistenceError, PersistenceGateway};
pub use renderer::{AuthControl, ChatSurface, InputControls, MessageHandle, MessageRenderer, Sender};
pub use session::{SessionController, SessionState};
