//! Marathon workshop: the 14-day curriculum.
//!
//! A day is a theory topic followed by a practice topic. The flow per day is
//! lesson, comprehension question, optional bonus question, practice task.

mod bonus;
mod lesson;
mod question;
mod task;

pub use bonus::BonusState;
pub use lesson::LessonState;
pub use question::QuestionState;
pub use task::TaskState;
