//! ResourceList envelope: the framing exchanged with out-of-process functions.
//!
//! ```yaml
//! apiVersion: kyaml.kustomize.dev/v1alpha1
//! kind: ResourceList
//! items:
//! - ...            # each stamped with kyaml.kustomize.dev/kio/index
//! functionConfig:  # omitted when the function has no config
//!   ...
//! ```

use kpipe_core::{Document, Error, Result, INDEX_ANNOTATION};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

pub const RESOURCE_LIST_API_VERSION: &str = "kyaml.kustomize.dev/v1alpha1";
pub const RESOURCE_LIST_KIND: &str = "ResourceList";

/// A decoded envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceList {
    pub items: Vec<Document>,
    pub function_config: Option<Document>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a> {
    api_version: &'a str,
    kind: &'a str,
    items: &'a [Document],
    #[serde(skip_serializing_if = "Option::is_none")]
    function_config: Option<&'a Document>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    items: Option<Vec<Document>>,
    #[serde(default)]
    function_config: Option<Document>,
}

/// Stamp each item with its position, then wrap and serialize. The returned text is
/// exactly what a function receives on stdin.
pub fn encode(items: &mut [Document], function_config: Option<&Document>) -> Result<String> {
    for (i, item) in items.iter_mut().enumerate() {
        item.set_annotation(INDEX_ANNOTATION, &i.to_string())?;
    }
    wrap(items, function_config)
}

/// Serialize an envelope without touching the items.
pub fn wrap(items: &[Document], function_config: Option<&Document>) -> Result<String> {
    let env = EnvelopeRef {
        api_version: RESOURCE_LIST_API_VERSION,
        kind: RESOURCE_LIST_KIND,
        items,
        function_config,
    };
    Ok(serde_yaml::to_string(&env)?)
}

/// Items of an envelope, in text order. Index annotations are left as found.
pub fn decode(text: &str) -> Result<Vec<Document>> {
    Ok(decode_envelope(text)?.items)
}

/// Decode the envelope. Empty documents around it (a leading or trailing `---`)
/// are ignored; a second non-empty document is an error.
pub fn decode_envelope(text: &str) -> Result<ResourceList> {
    let mut found = None;
    for de in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(de)?;
        if value.is_null() {
            continue;
        }
        if found.replace(value).is_some() {
            return Err(Error::Format("expected a single ResourceList document, found several".into()));
        }
    }
    match found {
        Some(value) => from_value(value),
        None => Err(Error::Format("expected a ResourceList document, found none".into())),
    }
}

pub(crate) fn from_value(value: Value) -> Result<ResourceList> {
    let kind = value.get("kind").and_then(Value::as_str);
    if kind != Some(RESOURCE_LIST_KIND) {
        return Err(Error::Format(format!(
            "expected kind {}, got {}",
            RESOURCE_LIST_KIND,
            kind.unwrap_or("<none>")
        )));
    }
    let raw: RawEnvelope = serde_yaml::from_value(value)?;
    Ok(ResourceList {
        items: raw.items.unwrap_or_default(),
        function_config: raw.function_config,
    })
}
