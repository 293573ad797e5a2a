use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{
        export::ExportError, provision::ProvisioningError, template::TemplateError,
    },
    config::LoadError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// The error followed by its chain of sources, outermost first.
    pub fn messages(&self) -> Vec<String> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn messages_walk_the_source_chain() {
        let error = AppError::from(ExportError::Read {
            path: PathBuf::from("/docs/missing.md"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });

        let messages = error.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("/docs/missing.md"));
        assert_eq!(messages[1], "no such file");
    }
}
