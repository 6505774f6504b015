use std::error::Error as StdError;

use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{failed} of {total} keys failed to fetch")]
    FetchFailed { failed: usize, total: usize },
}

impl AppError {
    /// Messages for this error and every source below it, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            let message = inner.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        messages
    }
}
