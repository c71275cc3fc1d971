//! Session orchestration: persistence manager, audio and identity
//! capabilities, and the session controller.

#![forbid(unsafe_code)]

pub mod audio;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod sessions;

pub use learn_core::Clock;
pub use sessions as session;

pub use audio::{AudioPlayer, SilentAudio};
pub use error::{AudioError, SessionError};
pub use identity::{IdentityProvider, StaticIdentity};
pub use persistence::{
    CompletionOutcome, CompletionReport, OpenedSession, RetainReason, SessionPersistence,
};
pub use sessions::{Advance, AnswerFeedback, SessionController, SessionEvent, SessionLoopService};
