use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{Error, Result};

/// One configuration document (a YAML mapping such as a Kubernetes manifest).
///
/// Mapping keys keep their original order through parse, edit and serialize, so a
/// document that nobody touched serializes back to the same structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Mapping,
}

impl Document {
    /// Parse a single YAML document. Anything other than a mapping is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    /// Parse a `---` separated stream. Empty documents are skipped.
    pub fn parse_stream(text: &str) -> Result<Vec<Self>> {
        let mut out = Vec::new();
        for de in serde_yaml::Deserializer::from_str(text) {
            let value = Value::deserialize(de)?;
            if value.is_null() {
                continue;
            }
            out.push(Self::from_value(value)?);
        }
        Ok(out)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(Error::Format(format!(
                "document must be a mapping, found {}",
                type_name(&other)
            ))),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    pub fn api_version(&self) -> Option<&str> {
        self.root.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.root.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.field(&["metadata", "name"]).and_then(Value::as_str)
    }

    /// Read a nested field by mapping keys, e.g. `["metadata", "name"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.root.get(*first)?;
        for seg in rest {
            cur = cur.as_mapping()?.get(*seg)?;
        }
        Some(cur)
    }

    /// Write a nested field, creating intermediate mappings (null counts as absent).
    /// Existing keys keep their position.
    pub fn set_field(&mut self, path: &[&str], value: Value) -> Result<()> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| Error::Format("empty field path".into()))?;
        let mut cur = &mut self.root;
        for seg in parents {
            let missing = match cur.get(*seg) {
                None | Some(Value::Null) => true,
                Some(Value::Mapping(_)) => false,
                Some(other) => {
                    return Err(Error::Format(format!(
                        "field {} is a {}, not a mapping",
                        seg,
                        type_name(other)
                    )))
                }
            };
            if missing {
                cur.insert(Value::from(*seg), Value::Mapping(Mapping::new()));
            }
            cur = match cur.get_mut(*seg) {
                Some(Value::Mapping(m)) => m,
                _ => return Err(Error::Format(format!("field {} is not a mapping", seg))),
            };
        }
        cur.insert(Value::from(*last), value);
        Ok(())
    }

    /// Annotation value by key. Numbers and bools are rendered as strings since
    /// functions written against other YAML libraries may emit them unquoted.
    pub fn annotation(&self, key: &str) -> Option<String> {
        self.annotation_map()?.get(key).and_then(scalar_string)
    }

    /// All annotations in document order. Non-scalar values are skipped.
    pub fn annotations(&self) -> Vec<(String, String)> {
        let Some(map) = self.annotation_map() else { return Vec::new() };
        map.iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), scalar_string(v)?)))
            .collect()
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_field(&["metadata", "annotations", key], Value::from(value))
    }

    /// Remove an annotation. An annotations map left empty is removed as well.
    pub fn remove_annotation(&mut self, key: &str) -> Option<String> {
        let meta = self.root.get_mut("metadata")?.as_mapping_mut()?;
        let annos = meta.get_mut("annotations")?.as_mapping_mut()?;
        let removed = annos.shift_remove(key)?;
        if annos.is_empty() {
            meta.shift_remove("annotations");
        }
        scalar_string(&removed)
    }

    fn annotation_map(&self) -> Option<&Mapping> {
        self.field(&["metadata", "annotations"])?.as_mapping()
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
