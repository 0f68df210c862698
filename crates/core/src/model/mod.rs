mod checkpoint;
mod ids;
mod snapshot;

pub use checkpoint::{Checkpoint, elapsed_from_remaining};
pub use ids::{AttemptId, ExamInstanceRef, ExamModule, ParseIdError, QuestionId};
pub use snapshot::{AnswerValue, CursorPosition, PersistedSnapshot, Snapshot};
