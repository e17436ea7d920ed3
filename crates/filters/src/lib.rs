//! kpipe filters: function stages that run outside the process.

#![forbid(unsafe_code)]

use kpipe_core::{Document, CONTAINER_ANNOTATION};

mod container;
mod exec;
mod runner;

pub use container::{ContainerFilter, Invocation};
pub use exec::ExecFilter;

/// Container runtime used to launch function images.
pub fn container_runtime() -> String {
    std::env::var("KPIPE_CONTAINER_RUNTIME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "docker".to_string())
}

/// Optional cap on the bytes a function may write to stdout.
pub fn max_fn_output_bytes() -> Option<usize> {
    std::env::var("KPIPE_MAX_FN_OUTPUT_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
}

/// Image backing a function config, or `None` for an ordinary document.
///
/// A non-empty container annotation wins. Otherwise an apiVersion whose first segment
/// contains a dot is taken as an image reference: API groups never have dots in
/// that position, registry hosts always do.
pub fn container_name(doc: &Document) -> Option<String> {
    if let Some(image) = doc.annotation(CONTAINER_ANNOTATION).filter(|s| !s.is_empty()) {
        return Some(image);
    }
    let api_version = doc.api_version()?;
    let head = api_version.split('/').next().unwrap_or("");
    if head.contains('.') {
        Some(api_version.to_string())
    } else {
        None
    }
}
