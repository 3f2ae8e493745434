use std::fmt;

use thiserror::Error;

/// Failures that abort a generate call. Stage failures (an empty caption or
/// empty completion) are not errors; they collapse into the sentinel result.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{0} is not configured")]
    MissingCredential(&'static str),
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{service} response malformed: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },
    #[error("unknown completion provider: {0}")]
    UnknownProvider(String),
    #[error("completion provider error: {0}")]
    Provider(String),
}

/// The pipeline stage that produced nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Caption,
    Analysis,
    Suggestion,
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailedStage::Caption => "caption",
            FailedStage::Analysis => "analysis",
            FailedStage::Suggestion => "suggestion",
        })
    }
}
