//! timebox-client: assessment service implementations.
//!
//! Implements `AssessmentService` over HTTP and in memory, and loads the
//! `timebox.toml` configuration that wires a session to a backend.

pub mod config;
pub mod http;
pub mod mock;

pub use config::{create_service, load_config, load_config_from, TimeboxConfig};
pub use http::HttpAssessmentService;
pub use mock::MockAssessmentService;
