//! Feed mode: weekly topics chosen by the user and a digest per day.

mod digest;
mod topics;

pub use digest::DigestState;
pub use topics::{TopicsState, parse_selection};
