// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::common::ErrorResponse;
use stratus_api::deployment::DeploymentError;
use stratus_api::image_builder::BuildError;
use stratus_api::persistence::PersistenceError;
use stratus_messenger::MessengerError;

/// Failures of the function manager operations.
///
/// Backend errors are flattened into messages: nothing backend-specific
/// crosses this boundary.
#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    #[error("invalid input: {}", .0.join("; "))]
    InvalidInput(Vec<String>),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    NotFound(String),
    #[error("version not acceptable: {0}")]
    VersionNotAcceptable(String),
    #[error("build failed: {0}")]
    BuildFailed(String),
    #[error("deployment backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("deployment rejected: {0}")]
    DeploymentRejected(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FunctionError {
    /// Stable tag of the failure.
    pub fn cause(&self) -> &'static str {
        match self {
            FunctionError::InvalidInput(_) => "validation-failed",
            FunctionError::AlreadyExists(_) => "already-exists",
            FunctionError::NotFound(_) => "not-found",
            FunctionError::VersionNotAcceptable(_) => "not-acceptable",
            FunctionError::BuildFailed(_) => "build-failed",
            FunctionError::BackendUnavailable(_) => "backend-unavailable",
            FunctionError::DeploymentRejected(_) => "deployment-rejected",
            FunctionError::Unsupported(_) => "unsupported",
            FunctionError::Persistence(_) => "persistence-failed",
            FunctionError::Timeout(_) => "timeout",
            FunctionError::Transport(_) => "transport-error",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            FunctionError::InvalidInput(_) => 400,
            FunctionError::AlreadyExists(_) => 409,
            FunctionError::NotFound(_) => 404,
            FunctionError::VersionNotAcceptable(_) => 406,
            FunctionError::BuildFailed(_) => 500,
            FunctionError::BackendUnavailable(_) => 503,
            FunctionError::DeploymentRejected(_) => 500,
            FunctionError::Unsupported(_) => 501,
            FunctionError::Persistence(_) => 500,
            FunctionError::Timeout(_) => 504,
            FunctionError::Transport(_) => 502,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        match self {
            FunctionError::InvalidInput(messages) => messages.clone(),
            FunctionError::AlreadyExists(msg)
            | FunctionError::NotFound(msg)
            | FunctionError::VersionNotAcceptable(msg)
            | FunctionError::BuildFailed(msg)
            | FunctionError::BackendUnavailable(msg)
            | FunctionError::DeploymentRejected(msg)
            | FunctionError::Unsupported(msg)
            | FunctionError::Persistence(msg)
            | FunctionError::Timeout(msg)
            | FunctionError::Transport(msg) => vec![msg.clone()],
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            cause: self.cause().to_string(),
            message: self.messages(),
            status: self.status(),
        }
    }
}

impl From<DeploymentError> for FunctionError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::BackendUnavailable(msg) => FunctionError::BackendUnavailable(msg),
            DeploymentError::Rejected(msg) => FunctionError::DeploymentRejected(msg),
            DeploymentError::NotFound(name) => FunctionError::NotFound(format!("workload not found: {}", name)),
            DeploymentError::Unsupported(msg) => FunctionError::Unsupported(msg),
        }
    }
}

impl From<PersistenceError> for FunctionError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound { kind, id } => FunctionError::NotFound(format!("{} not found: {}", kind, id)),
            PersistenceError::AlreadyExists { kind, id } => FunctionError::AlreadyExists(format!("{} is already exists: {}", kind, id)),
            PersistenceError::Backend(msg) => FunctionError::Persistence(msg),
        }
    }
}

impl From<BuildError> for FunctionError {
    fn from(err: BuildError) -> Self {
        FunctionError::BuildFailed(err.to_string())
    }
}

impl From<MessengerError> for FunctionError {
    fn from(err: MessengerError) -> Self {
        match err {
            MessengerError::Timeout(_) => FunctionError::Timeout(err.to_string()),
            err => FunctionError::Transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = FunctionError::InvalidInput(vec!["name field should not be empty".to_string(), "runtime not match".to_string()]);
        let response = err.to_response();
        assert_eq!("validation-failed", response.cause);
        assert_eq!(400, response.status);
        assert_eq!(2, response.message.len());

        let err: FunctionError = DeploymentError::Rejected("no such image".to_string()).into();
        assert_eq!("deployment-rejected", err.cause());
        assert_eq!(vec!["no such image".to_string()], err.messages());

        let err: FunctionError = PersistenceError::already_exists("function", "hello").into();
        assert_eq!("already-exists", err.cause());
        assert_eq!(409, err.status());

        let err: FunctionError = MessengerError::Timeout(std::time::Duration::from_secs(1)).into();
        assert_eq!("timeout", err.cause());
    }
}
