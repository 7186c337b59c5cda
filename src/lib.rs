//! Generates preview pages and server API routes for a tree of Vue email
//! templates, and carries preview data through URLs.
//!
//! The pipeline is: [`scanner::scan`] finds templates, [`paths::PathMapper`]
//! derives their identifiers and artifact locations,
//! [`generator::ArtifactGenerator`] renders the artifact text and
//! [`registry::RegistryBuilder`] writes it all out. [`watcher`] reruns the
//! build on change, and [`api::PreviewApi`] serves render requests behind a
//! [`gate::RequestGate`].

pub mod api;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod gate;
pub mod generator;
pub mod hooks;
pub mod paths;
pub mod registry;
pub mod scanner;
pub mod server;
pub mod watcher;

pub use api::{ApiRequest, ApiResponse, PreviewApi};
pub use config::MailgenConfig;
pub use engine::TemplateEngine;
pub use error::{ApiError, BuildError};
pub use gate::{AuthPolicy, GateRequest, RateLimitSettings, RequestGate};
pub use generator::{ArtifactGenerator, ArtifactParams};
pub use paths::PathMapper;
pub use registry::{BuildOptions, BuildReport, IdFilter, RegistryBuilder};
