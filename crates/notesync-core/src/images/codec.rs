//! Rich-text document access for image embeds.

use serde_json::Value;

use crate::Result;

/// Reads and rewrites image embeds inside a serialized rich-text document.
///
/// Implementations must leave text they cannot parse untouched.
pub trait RichTextCodec: Send + Sync {
    /// Image sources in document order, duplicates included.
    fn image_sources(&self, text: &str) -> Vec<String>;

    /// Point the first embed whose source equals `from` at `to`.
    fn replace_first_image(&self, text: &str, from: &str, to: &str) -> Result<String>;

    /// Drop every embed whose source equals `source`.
    fn remove_image(&self, text: &str, source: &str) -> Result<String>;
}

/// Quill-style delta documents: `[{"insert": {"image": "<src>"}}, ...]` or `{"ops": [...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaCodec;

impl DeltaCodec {
    fn parse(text: &str) -> Option<Value> {
        let document: Value = serde_json::from_str(text).ok()?;
        ops(&document)?;
        Some(document)
    }
}

fn ops(document: &Value) -> Option<&Vec<Value>> {
    match document {
        Value::Array(ops) => Some(ops),
        Value::Object(map) => map.get("ops").and_then(Value::as_array),
        _ => None,
    }
}

fn ops_mut(document: &mut Value) -> Option<&mut Vec<Value>> {
    match document {
        Value::Array(ops) => Some(ops),
        Value::Object(map) => map.get_mut("ops").and_then(Value::as_array_mut),
        _ => None,
    }
}

fn embed_source(op: &Value) -> Option<&str> {
    op.get("insert")?.get("image")?.as_str()
}

impl RichTextCodec for DeltaCodec {
    fn image_sources(&self, text: &str) -> Vec<String> {
        let Some(document) = Self::parse(text) else {
            return Vec::new();
        };
        ops(&document)
            .map(|ops| {
                ops.iter()
                    .filter_map(embed_source)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn replace_first_image(&self, text: &str, from: &str, to: &str) -> Result<String> {
        let Some(mut document) = Self::parse(text) else {
            return Ok(text.to_string());
        };
        let Some(ops) = ops_mut(&mut document) else {
            return Ok(text.to_string());
        };

        let target = ops
            .iter_mut()
            .filter_map(|op| op.get_mut("insert")?.get_mut("image"))
            .find(|image| image.as_str() == Some(from));
        match target {
            Some(image) => {
                *image = Value::String(to.to_string());
                Ok(serde_json::to_string(&document)?)
            }
            None => Ok(text.to_string()),
        }
    }

    fn remove_image(&self, text: &str, source: &str) -> Result<String> {
        let Some(mut document) = Self::parse(text) else {
            return Ok(text.to_string());
        };
        let Some(ops) = ops_mut(&mut document) else {
            return Ok(text.to_string());
        };

        let before = ops.len();
        ops.retain(|op| embed_source(op) != Some(source));
        if ops.len() == before {
            return Ok(text.to_string());
        }
        Ok(serde_json::to_string(&document)?)
    }
}
