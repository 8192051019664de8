use thiserror::Error;

use crate::agent::AgentError;
use crate::intake::IntakeError;
use crate::materializer::MaterializeError;

#[derive(Error, Debug)]
pub enum WardrobeError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Other error: {0}")]
    Other(String),
}
