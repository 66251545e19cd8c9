//! States shared by every mode.

mod consultation;
mod error;
mod mode_select;
mod start;

pub use consultation::ConsultationState;
pub use error::ErrorState;
pub use mode_select::ModeSelectState;
pub use start::StartState;
