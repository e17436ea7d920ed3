use std::ffi::OsString;
use std::process::Command;

use anyhow::Result;
use kpipe_core::Document;
use kpipe_kio::Filter;
use tracing::warn;

use crate::{container_name, container_runtime, max_fn_output_bytes, runner};

/// Runtime flags placed before the forwarded environment and the image.
#[rustfmt::skip]
const SANDBOX_ARGS: [&str; 14] = [
    "run", "--rm",
    "-i", "-a", "STDIN", "-a", "STDOUT", "-a", "STDERR",
    "--network", "none",
    "--user", "nobody",
    "--security-opt=no-new-privileges",
];

/// Runs a function packaged as a container image under a fixed least-privilege
/// profile: no network, user `nobody`, no privilege escalation. Every host
/// environment variable is forwarded by name.
#[derive(Debug, Clone)]
pub struct ContainerFilter {
    image: String,
    config: Option<Document>,
    args: Option<Vec<String>>,
    runtime: String,
    max_output_bytes: Option<usize>,
}

/// A fully built runtime invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Snapshot of the host environment handed to the runtime process.
    pub env: Vec<(String, OsString)>,
}

impl Invocation {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

impl ContainerFilter {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            config: None,
            args: None,
            runtime: container_runtime(),
            max_output_bytes: max_fn_output_bytes(),
        }
    }

    /// Filter for a document that is itself a function config, or `None` when the
    /// document does not name a container.
    pub fn from_function_config(doc: Document) -> Option<Self> {
        let image = container_name(&doc)?;
        Some(Self::new(image).with_config(doc))
    }

    pub fn with_config(mut self, config: Document) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the image's default command.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_max_output_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn config(&self) -> Option<&Document> {
        self.config.as_ref()
    }

    pub fn invocation(&self) -> Invocation {
        let env = host_environment();
        let mut args: Vec<String> = SANDBOX_ARGS.iter().map(|s| s.to_string()).collect();
        for (name, _) in &env {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        args.push(self.image.clone());
        if let Some(extra) = &self.args {
            args.extend(extra.iter().cloned());
        }
        Invocation { program: self.runtime.clone(), args, env }
    }
}

impl Filter for ContainerFilter {
    fn filter(&mut self, input: Vec<Document>) -> Result<Vec<Document>> {
        let cmd = self.invocation().command();
        let label = format!("{} {}", self.runtime, self.image);
        Ok(runner::run_function(cmd, &label, input, self.config.as_ref(), self.max_output_bytes)?)
    }
}

fn host_environment() -> Vec<(String, OsString)> {
    std::env::vars_os()
        .filter_map(|(k, v)| match k.into_string() {
            Ok(k) => Some((k, v)),
            Err(k) => {
                warn!(name = ?k, "not forwarding environment variable with a non UTF-8 name");
                None
            }
        })
        .collect()
}
