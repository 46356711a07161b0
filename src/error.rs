use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RefsError {
    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("invalid scheme request: {0}")]
    InvalidSchemeRequest(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    #[diagnostic(help("fix or remove the file; the updater will not guess at a malformed config"))]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("scheme catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("scheme catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to parse scheme catalog: {0}")]
    CatalogParse(String),

    #[error("no scheme in catalog matches {0}")]
    UnknownScheme(String),

    #[error("scheme name {alias} is ambiguous: {candidates}")]
    AmbiguousScheme { alias: String, candidates: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("authenticated download failed: {0}")]
    AuthScript(String),

    #[error("malformed FASTA input: {0}")]
    FastaParse(String),
}
