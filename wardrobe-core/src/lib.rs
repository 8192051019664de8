pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod intake;
pub mod materializer;
pub mod models;
pub mod subprocess_agent;

pub use agent::{create_backend, AgentBackend, AgentError, EchoAgent, OutputCollector};
pub use config::WardrobeConfig;
pub use error::WardrobeError;
pub use intake::{FileIntake, IntakeBatch, IntakeError, IntakePolicy, StoredFile};
pub use materializer::{MaterializeError, UrlMaterializer};
pub use models::{Preferences, SuggestionRequest, SuggestionResponse, UploadedAsset};
pub use subprocess_agent::SubprocessAgent;
