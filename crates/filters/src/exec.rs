use std::process::Command;

use anyhow::Result;
use kpipe_core::Document;
use kpipe_kio::Filter;

use crate::{max_fn_output_bytes, runner};

/// Runs a local program as a function. Same envelope protocol as
/// [`ContainerFilter`](crate::ContainerFilter), without the sandbox; the program
/// inherits the host environment.
#[derive(Debug, Clone)]
pub struct ExecFilter {
    pub path: String,
    pub args: Vec<String>,
    pub config: Option<Document>,
    pub max_output_bytes: Option<usize>,
}

impl ExecFilter {
    pub fn new<I, S>(path: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            args: args.into_iter().map(Into::into).collect(),
            config: None,
            max_output_bytes: max_fn_output_bytes(),
        }
    }

    pub fn with_config(mut self, config: Document) -> Self {
        self.config = Some(config);
        self
    }
}

impl Filter for ExecFilter {
    fn filter(&mut self, input: Vec<Document>) -> Result<Vec<Document>> {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args);
        Ok(runner::run_function(cmd, &self.path, input, self.config.as_ref(), self.max_output_bytes)?)
    }
}
