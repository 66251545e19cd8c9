pub mod activity;
pub mod content;
pub mod curriculum;
pub mod i18n;
pub mod intent;
pub mod llm_client;
pub mod machine;
pub mod planner;
pub mod question;
pub mod retrieval;
pub mod search;
pub mod session;
pub mod states;
pub mod storage;
pub mod transport;

pub use machine::{StateMachine, TransitionOutcome};
pub use session::{IncomingMessage, StateName, UserSession};
