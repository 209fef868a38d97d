use crate::analysis::RunReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Codewiki error types
///
/// Only fatal conditions travel through `Result`. Per-file parse failures,
/// enrichment fallbacks and unknown-key annotations are recorded in the
/// run report instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("No language adapters available for {0}")]
    NoAdapters(String),

    #[error("Resource limit exceeded during {stage}: {limit} ({count} diagnostics gathered)", count = .report.len())]
    ResourceExhausted {
        stage: String,
        limit: String,
        /// Recoverable problems recorded before the limit was hit
        report: Box<RunReport>,
    },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for codewiki operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RecoverablePerFile,
    RecoverableEnrichment,
    RecoverableAnnotation,
    FatalConfiguration,
    FatalResourceExhaustion,
    FatalInternal,
}

impl ErrorClass {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorClass::FatalConfiguration
                | ErrorClass::FatalResourceExhaustion
                | ErrorClass::FatalInternal
        )
    }
}

impl Error {
    /// Create a config validation error
    pub fn config_validation(msg: impl Into<String>) -> Self {
        Error::ConfigValidation(msg.into())
    }

    /// Create a parser error
    pub fn parser(msg: impl Into<String>) -> Self {
        Error::Parser(msg.into())
    }

    /// Create a resource exhaustion error carrying the partial report
    pub fn exhausted(stage: impl Into<String>, limit: impl Into<String>, report: RunReport) -> Self {
        Error::ResourceExhausted {
            stage: stage.into(),
            limit: limit.into(),
            report: Box::new(report),
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Classify this error within the run taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ConfigParse(_)
            | Error::ConfigValidation(_)
            | Error::PathNotFound(_)
            | Error::NotADirectory(_)
            | Error::NoAdapters(_)
            | Error::GlobPattern(_) => ErrorClass::FatalConfiguration,
            Error::ResourceExhausted { .. } => ErrorClass::FatalResourceExhaustion,
            _ => ErrorClass::FatalInternal,
        }
    }

    /// Diagnostics gathered before the run aborted, when the error keeps them
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Error::ResourceExhausted { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }

    /// Every error that reaches the caller stops the run
    pub fn is_fatal(&self) -> bool {
        self.class().is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_path_not_found_display() {
        let err = Error::PathNotFound(PathBuf::from("/some/path"));
        assert_eq!(err.to_string(), "Path not found: /some/path");
        assert_eq!(err.class(), ErrorClass::FatalConfiguration);
    }

    #[test]
    fn test_config_validation_display() {
        let err = Error::config_validation("budget_chars must be at least 64");
        assert_eq!(
            err.to_string(),
            "Config validation error: budget_chars must be at least 64"
        );
    }

    #[test]
    fn test_resource_exhausted() {
        let mut report = RunReport::new();
        report.annotation("edge:1", "no such edge");
        report.enrichment("file:a.py", "timed out");
        let err = Error::exhausted("graph", "max_edges = 10", report.clone());
        assert!(err.to_string().contains("graph"));
        assert!(err.to_string().contains("2 diagnostics"));
        assert_eq!(err.class(), ErrorClass::FatalResourceExhaustion);
        assert!(err.is_fatal());
        assert_eq!(err.report(), Some(&report));
        assert!(Error::other("x").report().is_none());
    }

    #[test]
    fn test_recoverable_classes_are_not_fatal() {
        assert!(!ErrorClass::RecoverablePerFile.is_fatal());
        assert!(!ErrorClass::RecoverableEnrichment.is_fatal());
        assert!(!ErrorClass::RecoverableAnnotation.is_fatal());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
