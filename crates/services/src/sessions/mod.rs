mod controller;
mod events;
mod timers;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::SessionController;
pub use events::{Advance, AnswerFeedback, SessionEvent};
pub use workflow::SessionLoopService;
