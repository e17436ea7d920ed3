//! kpipe core types: configuration documents, bookkeeping annotations and errors.

#![forbid(unsafe_code)]

mod document;

pub use document::Document;

/// Position of a document within the collection handed to a function, base-10.
pub const INDEX_ANNOTATION: &str = "kyaml.kustomize.dev/kio/index";

/// Explicit container image backing a function config, regardless of apiVersion.
pub const CONTAINER_ANNOTATION: &str = "kyaml.kustomize.dev/container";

/// Errors produced by the document model, the ResourceList codec and function runs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("format: {0}")]
    Format(String),
    #[error("spawn: failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("exec: {program} exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("output: function output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
