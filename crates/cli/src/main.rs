use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kpipe_core::Document;
use kpipe_filters::{container_name, ContainerFilter, ExecFilter};
use kpipe_kio::{resource_list, ByteReader, ByteWriter, Pipeline, Reader};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "kpipectl", version, about = "Run configuration functions over manifest streams")]
struct Cli {
    /// Output format for reports (documents are always YAML)
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one function over the input documents and print the resulting stream
    Run {
        /// Input files (stdin when none are given)
        files: Vec<PathBuf>,
        /// Container image implementing the function
        #[arg(long, conflicts_with = "exec")]
        image: Option<String>,
        /// Function config document; names the image when --image is absent
        #[arg(long = "fn-config")]
        fn_config: Option<PathBuf>,
        /// Run a local program instead of a container
        #[arg(long)]
        exec: Option<String>,
        /// Argument replacing the image command (or passed to --exec); repeatable
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        /// Container runtime program
        #[arg(long, env = "KPIPE_CONTAINER_RUNTIME", default_value = "docker")]
        runtime: String,
        /// Keep bookkeeping annotations (kio/index) in the output
        #[arg(long = "keep-annotations", action = ArgAction::SetTrue)]
        keep_annotations: bool,
        /// Fail when a function writes more than this many bytes
        #[arg(long = "max-output-bytes", env = "KPIPE_MAX_FN_OUTPUT_BYTES")]
        max_output_bytes: Option<usize>,
    },
    /// Show which container image each document resolves to
    Resolve {
        /// Input files (stdin when none are given)
        files: Vec<PathBuf>,
    },
    /// Print the ResourceList a function would receive for the inputs
    Wrap {
        /// Input files (stdin when none are given)
        files: Vec<PathBuf>,
        /// Function config document
        #[arg(long = "fn-config")]
        fn_config: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("KPIPE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries documents
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KPIPE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KPIPE_METRICS_ADDR; expected host:port");
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { files, image, fn_config, exec, args, runtime, keep_annotations, max_output_bytes } => {
            let config = fn_config.as_deref().map(load_document).transpose()?;
            let mut pipeline = Pipeline::new();
            for reader in input_readers(&files)? {
                pipeline.inputs.push(reader);
            }
            if let Some(program) = exec {
                info!(program = %program, "run invoked (exec)");
                let mut f = ExecFilter::new(program, args);
                f.config = config;
                f.max_output_bytes = max_output_bytes;
                pipeline = pipeline.with_filter(f);
            } else {
                let image = image
                    .or_else(|| config.as_ref().and_then(container_name))
                    .ok_or_else(|| anyhow!("no function to run: pass --image, --exec, or a --fn-config that names a container"))?;
                info!(image = %image, runtime = %runtime, "run invoked");
                let mut f = ContainerFilter::new(image).with_runtime(runtime).with_max_output_bytes(max_output_bytes);
                if let Some(cfg) = config {
                    f = f.with_config(cfg);
                }
                if !args.is_empty() {
                    f = f.with_args(args);
                }
                pipeline = pipeline.with_filter(f);
            }
            pipeline = pipeline.with_output(ByteWriter::new(std::io::stdout()).keep_reader_annotations(keep_annotations));
            if let Err(e) = pipeline.execute() {
                error!(error = %e, "run failed");
                return Err(e);
            }
        }
        Commands::Resolve { files } => {
            let docs = load_documents(&files)?;
            let rows = resolve_rows(&docs);
            match cli.output {
                Output::Human => {
                    for r in rows {
                        println!("{}/{} • {}", r.kind, r.name, r.image.as_deref().unwrap_or("-"));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Wrap { files, fn_config } => {
            let config = fn_config.as_deref().map(load_document).transpose()?;
            let mut docs = load_documents(&files)?;
            print!("{}", resource_list::encode(&mut docs, config.as_ref())?);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ResolvedRow {
    kind: String,
    name: String,
    image: Option<String>,
}

fn resolve_rows(docs: &[Document]) -> Vec<ResolvedRow> {
    docs.iter()
        .map(|d| ResolvedRow {
            kind: d.kind().unwrap_or("-").to_string(),
            name: d.name().unwrap_or("-").to_string(),
            image: container_name(d),
        })
        .collect()
}

fn input_readers(files: &[PathBuf]) -> Result<Vec<Box<dyn Reader>>> {
    if files.is_empty() {
        return Ok(vec![Box::new(ByteReader::new(std::io::stdin()))]);
    }
    let mut out: Vec<Box<dyn Reader>> = Vec::with_capacity(files.len());
    for path in files {
        let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        out.push(Box::new(ByteReader::new(f)));
    }
    Ok(out)
}

fn load_documents(files: &[PathBuf]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for mut reader in input_readers(files)? {
        docs.extend(reader.read()?);
    }
    Ok(docs)
}

fn load_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Document::parse(&text).with_context(|| format!("parsing function config {}", path.display()))
}
