//! kpipe kio: read, filter and write collections of configuration documents.

#![forbid(unsafe_code)]

use anyhow::Result;
use kpipe_core::Document;
use metrics::counter;
use tracing::debug;

mod byteio;
pub mod resource_list;

pub use byteio::{ByteReader, ByteWriter};
pub use resource_list::ResourceList;

/// Source of documents.
pub trait Reader {
    fn read(&mut self) -> Result<Vec<Document>>;
}

/// Documents already in memory act as their own reader.
impl Reader for Vec<Document> {
    fn read(&mut self) -> Result<Vec<Document>> {
        Ok(self.clone())
    }
}

/// Transforms a collection and returns the new one. Implementations hold
/// configuration only; each call stands on its own.
pub trait Filter {
    fn filter(&mut self, input: Vec<Document>) -> Result<Vec<Document>>;
}

/// Sink for the final collection.
pub trait Writer {
    fn write(&mut self, docs: &[Document]) -> Result<()>;
}

/// Adapts a closure into a [`Filter`].
pub struct FilterFunc<F>(pub F);

impl<F> Filter for FilterFunc<F>
where
    F: FnMut(Vec<Document>) -> Result<Vec<Document>>,
{
    fn filter(&mut self, input: Vec<Document>) -> Result<Vec<Document>> {
        (self.0)(input)
    }
}

/// Adapts a closure into a [`Writer`].
pub struct WriterFunc<F>(pub F);

impl<F> Writer for WriterFunc<F>
where
    F: FnMut(&[Document]) -> Result<()>,
{
    fn write(&mut self, docs: &[Document]) -> Result<()> {
        (self.0)(docs)
    }
}

/// Reads from every input, threads the result through the filters in order and
/// writes it to every output.
///
/// Execution stops quietly when the inputs yield nothing or a filter returns an
/// empty collection. The first error from any stage is returned as is and the
/// remaining stages are skipped; writes that already happened stay written.
#[derive(Default)]
pub struct Pipeline {
    pub inputs: Vec<Box<dyn Reader>>,
    pub filters: Vec<Box<dyn Filter>>,
    pub outputs: Vec<Box<dyn Writer>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: impl Reader + 'static) -> Self {
        self.inputs.push(Box::new(input));
        self
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn with_output(mut self, output: impl Writer + 'static) -> Self {
        self.outputs.push(Box::new(output));
        self
    }

    pub fn execute(&mut self) -> Result<()> {
        counter!("pipeline_runs_total", 1u64);
        let mut result = Vec::new();
        for input in self.inputs.iter_mut() {
            result.extend(input.read()?);
        }
        if result.is_empty() {
            debug!("no input documents; nothing to do");
            counter!("pipeline_short_circuit_total", 1u64);
            return Ok(());
        }

        for (i, f) in self.filters.iter_mut().enumerate() {
            result = f.filter(result)?;
            if result.is_empty() {
                debug!(stage = i, "filter returned no documents; stopping");
                counter!("pipeline_short_circuit_total", 1u64);
                return Ok(());
            }
            debug!(stage = i, docs = result.len(), "filter applied");
        }

        for output in self.outputs.iter_mut() {
            output.write(&result)?;
        }
        Ok(())
    }
}
