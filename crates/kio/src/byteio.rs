//! Multi-document YAML streams.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use kpipe_core::{Document, INDEX_ANNOTATION};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::resource_list::{self, RESOURCE_LIST_KIND};
use crate::{Reader, Writer};

/// Reads a `---` separated stream of documents. A stream holding a single
/// ResourceList is unwrapped to its items and its function config is retained.
pub struct ByteReader<R> {
    reader: R,
    function_config: Option<Document>,
}

impl<R: Read> ByteReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, function_config: None }
    }

    /// Function config of the last unwrapped ResourceList, if any.
    pub fn function_config(&self) -> Option<&Document> {
        self.function_config.as_ref()
    }
}

impl<R: Read> Reader for ByteReader<R> {
    fn read(&mut self) -> Result<Vec<Document>> {
        let mut text = String::new();
        self.reader
            .read_to_string(&mut text)
            .context("reading document stream")?;
        let mut values = Vec::new();
        for de in serde_yaml::Deserializer::from_str(&text) {
            let v = Value::deserialize(de).context("parsing document stream")?;
            if !v.is_null() {
                values.push(v);
            }
        }
        if values.len() == 1 && values[0].get("kind").and_then(Value::as_str) == Some(RESOURCE_LIST_KIND) {
            let list = resource_list::from_value(values.remove(0))?;
            debug!(items = list.items.len(), "unwrapped ResourceList");
            self.function_config = list.function_config;
            return Ok(list.items);
        }
        let docs = values
            .into_iter()
            .map(Document::from_value)
            .collect::<kpipe_core::Result<Vec<_>>>()?;
        Ok(docs)
    }
}

/// Writes documents as a `---` separated stream, or as one ResourceList when
/// wrapping is enabled. The index annotation is stripped from the written copies
/// unless `keep_reader_annotations` is set.
pub struct ByteWriter<W> {
    writer: W,
    keep_reader_annotations: bool,
    wrap: bool,
    function_config: Option<Document>,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, keep_reader_annotations: false, wrap: false, function_config: None }
    }

    pub fn keep_reader_annotations(mut self, keep: bool) -> Self {
        self.keep_reader_annotations = keep;
        self
    }

    pub fn wrap_resource_list(mut self, function_config: Option<Document>) -> Self {
        self.wrap = true;
        self.function_config = function_config;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Writer for ByteWriter<W> {
    fn write(&mut self, docs: &[Document]) -> Result<()> {
        let mut docs = docs.to_vec();
        if !self.keep_reader_annotations {
            for d in docs.iter_mut() {
                d.remove_annotation(INDEX_ANNOTATION);
            }
        }
        let text = if self.wrap {
            resource_list::wrap(&docs, self.function_config.as_ref())?
        } else {
            let mut parts = Vec::with_capacity(docs.len());
            for d in &docs {
                parts.push(d.to_yaml_string()?);
            }
            parts.join("---\n")
        };
        self.writer.write_all(text.as_bytes()).context("writing document stream")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: deployment-foo\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: service-foo\n";

    #[test]
    fn reader_splits_stream_in_order() {
        let docs = ByteReader::new(STREAM.as_bytes()).read().unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.name().unwrap()).collect();
        assert_eq!(names, vec!["deployment-foo", "service-foo"]);
    }

    #[test]
    fn reader_unwraps_resource_list() {
        let text = "apiVersion: kyaml.kustomize.dev/v1alpha1\nkind: ResourceList\nitems:\n- kind: A\n- kind: B\nfunctionConfig:\n  kind: Cfg\n";
        let mut r = ByteReader::new(text.as_bytes());
        let docs = r.read().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(r.function_config().and_then(|c| c.kind()), Some("Cfg"));
    }

    #[test]
    fn writer_round_trips_stream_and_strips_index() {
        let mut docs = ByteReader::new(STREAM.as_bytes()).read().unwrap();
        for (i, d) in docs.iter_mut().enumerate() {
            d.set_annotation(INDEX_ANNOTATION, &i.to_string()).unwrap();
        }
        let mut w = ByteWriter::new(Vec::new());
        w.write(&docs).unwrap();
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), STREAM);
        // the caller's documents are untouched
        assert_eq!(docs[1].annotation(INDEX_ANNOTATION).as_deref(), Some("1"));
    }

    #[test]
    fn writer_keeps_index_when_asked() {
        let mut docs = ByteReader::new(STREAM.as_bytes()).read().unwrap();
        docs[0].set_annotation(INDEX_ANNOTATION, "0").unwrap();
        let mut w = ByteWriter::new(Vec::new()).keep_reader_annotations(true);
        w.write(&docs[..1]).unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert!(out.contains("kyaml.kustomize.dev/kio/index: '0'"), "out={}", out);
    }

    #[test]
    fn writer_wraps_resource_list() {
        let docs = ByteReader::new(STREAM.as_bytes()).read().unwrap();
        let cfg = Document::parse("kind: Cfg\n").unwrap();
        let mut w = ByteWriter::new(Vec::new()).wrap_resource_list(Some(cfg));
        w.write(&docs).unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        let list = resource_list::decode_envelope(&out).unwrap();
        assert_eq!(list.items, docs);
        assert_eq!(list.function_config.and_then(|c| c.kind().map(str::to_string)).as_deref(), Some("Cfg"));
    }
}
