use thiserror::Error;

use crate::application::repos::{ClusterError, RepoError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Collect the error and its sources, outermost first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_convert_transparently() {
        let err: AppError = RepoError::NotFound.into();
        assert_eq!(err.to_string(), "resource not found");
        assert_eq!(err.messages(), vec!["resource not found".to_string()]);
    }
}
