mod ids;
mod item;
mod media;
mod progress;
mod session;

pub use ids::{ItemId, LessonId, ParseIdError, UserId};
pub use item::{AudioChannel, Hint, Item, ItemAudio, ItemError, Lesson};
pub use media::{MediaUri, MediaValidationError};
pub use progress::{ItemProgress, SessionMode};
pub use session::{
    RemoteSync, SessionId, SessionIdError, SessionState, SessionStateError, SessionStats,
};
