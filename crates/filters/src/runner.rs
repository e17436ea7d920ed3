//! Shared function protocol: envelope in on stdin, envelope out on stdout.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Instant;

use kpipe_core::{Document, Error, Result};
use kpipe_kio::resource_list;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

/// Run one function over `input`. `label` names the function in logs and errors.
pub(crate) fn run_function(
    cmd: Command,
    label: &str,
    input: Vec<Document>,
    function_config: Option<&Document>,
    max_output: Option<usize>,
) -> Result<Vec<Document>> {
    let t0 = Instant::now();
    counter!("fn_runs_total", 1u64);
    info!(function = %label, items = input.len(), "running function");
    let res = run(cmd, label, input, function_config, max_output);
    histogram!("fn_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
    match &res {
        Ok(out) => debug!(function = %label, items = out.len(), "function finished"),
        Err(e) => {
            counter!("fn_errors_total", 1u64);
            warn!(function = %label, error = %e, "function failed");
        }
    }
    res
}

fn run(
    mut cmd: Command,
    label: &str,
    mut input: Vec<Document>,
    function_config: Option<&Document>,
    max_output: Option<usize>,
) -> Result<Vec<Document>> {
    let envelope = resource_list::encode(&mut input, function_config)?;
    drop(input);

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| Error::Spawn { program: label.to_string(), source })?;
    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "function stdio not captured")));
    };

    // stdin is fed from its own thread so a function that writes while it reads
    // cannot fill both pipes and stall.
    let (read, wrote) = std::thread::scope(|s| {
        let feeder = s.spawn(move || stdin.write_all(envelope.as_bytes()));
        let read = read_output(&mut stdout, &mut child, max_output);
        let wrote = feeder
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "stdin writer panicked")));
        (read, wrote)
    });
    let status = child.wait()?;
    let out = read?;
    match wrote {
        // the function may exit without consuming all of its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => debug!(function = %label, "function closed stdin early"),
        Err(e) => return Err(Error::Io(e)),
        Ok(()) => {}
    }
    if !status.success() {
        return Err(Error::Exit { program: label.to_string(), status });
    }

    let text = String::from_utf8(out)
        .map_err(|_| Error::Format(format!("output of {} is not valid UTF-8", label)))?;
    resource_list::decode(&text)
}

fn read_output(stdout: &mut ChildStdout, child: &mut Child, max_output: Option<usize>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let res = match max_output {
        Some(limit) => stdout.take((limit as u64).saturating_add(1)).read_to_end(&mut buf).map(|_| ()),
        None => stdout.read_to_end(&mut buf).map(|_| ()),
    };
    let err = match (res, max_output) {
        (Err(e), _) => Error::Io(e),
        (Ok(()), Some(limit)) if buf.len() > limit => Error::OutputTooLarge { limit },
        (Ok(()), _) => return Ok(buf),
    };
    // unblock the stdin feeder before it is joined
    let _ = child.kill();
    Err(err)
}
