//! timebox-core: timed assessment attempt engine.
//!
//! This crate holds the in-process state machine a learner-facing UI drives
//! while taking a time-boxed exam: the answer store, autosave dispatcher,
//! countdown timer, navigation, the at-most-once submission coordinator and
//! the scoring/review engine. Transport lives behind [`traits::AssessmentService`].

pub mod answers;
pub mod autosave;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod navigation;
pub mod retry;
pub mod review;
pub mod session;
pub mod timer;
pub mod traits;

pub use config::EngineConfig;
pub use error::{EngineError, ServiceError};
pub use session::AttemptSession;
