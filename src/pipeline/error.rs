//! Pipeline error types.
//!
//! Setup errors abort the run before any document is streamed. Everything
//! that goes wrong afterwards is collected as a [`Failure`] so one broken
//! asset never hides the others.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::utils::plural_count;

use super::dispatch::StreamError;
use super::registry::RegistryError;
use super::resolve::ResolveError;

/// Pipeline run error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("source directory `{}` does not exist", path.display())]
    MissingSource { path: PathBuf },

    #[error("failed to scan `{}`: {message}", path.display())]
    Discovery { path: PathBuf, message: String },

    #[error("failed to create output directory `{}`", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Failed(#[from] BuildFailure),
}

/// One thing that went wrong after streaming started.
#[derive(Debug)]
pub enum Failure {
    /// Document could not be read, rewritten or written.
    Document { path: PathBuf, error: StreamError },
    /// A transform task returned an error or panicked.
    Asset {
        path: PathBuf,
        requester: PathBuf,
        plugin: String,
        error: anyhow::Error,
    },
    /// Reference that has no place in the output tree.
    Reference {
        document: PathBuf,
        reference: String,
        error: ResolveError,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document { path, error } => {
                write!(f, "document `{}`: {error}", path.display())
            }
            Self::Asset {
                path,
                requester,
                plugin,
                error,
            } => write!(
                f,
                "[{plugin}] `{}` (from `{}`): {error:#}",
                path.display(),
                requester.display()
            ),
            Self::Reference {
                document,
                reference,
                error,
            } => write!(
                f,
                "reference `{reference}` in `{}`: {error}",
                document.display()
            ),
        }
    }
}

/// All failures of a run that otherwise completed.
#[derive(Debug)]
pub struct BuildFailure {
    pub failures: Vec<Failure>,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build failed with {}",
            plural_count(self.failures.len(), "error")
        )
    }
}

impl std::error::Error for BuildFailure {}
