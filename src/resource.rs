//! Resource records
//!
//! A resource is a typed record whose fields are partitioned into sheets.
//! Sheet contents stay dynamic JSON; the schema registry gives them meaning.

use crate::meta_api::MetaApi;
use crate::path::ResourcePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sheet content: field name to value.
pub type Sheet = serde_json::Map<String, Value>;

/// Sheet names the HTTP layer itself depends on.
pub mod sheets {
    pub const VERSIONABLE: &str = "adhocracy_core.sheets.versions.IVersionable";
    pub const TAG: &str = "adhocracy_core.sheets.tags.ITag";
    pub const POOL: &str = "adhocracy_core.sheets.pool.IPool";
    pub const METADATA: &str = "adhocracy_core.sheets.metadata.IMetadata";
}

/// A versioned, typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ResourcePath>,
    #[serde(default)]
    pub data: BTreeMap<String, Sheet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ResourcePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_version_path: Option<ResourcePath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_versions: Vec<String>,
}

impl Resource {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            path: None,
            data: BTreeMap::new(),
            parent: None,
            first_version_path: None,
            root_versions: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: ResourcePath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_parent(mut self, parent: ResourcePath) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_first_version_path(mut self, path: ResourcePath) -> Self {
        self.first_version_path = Some(path);
        self
    }

    pub fn with_field(mut self, sheet: &str, field: &str, value: Value) -> Self {
        self.set_field(sheet, field, value);
        self
    }

    pub fn sheet(&self, sheet: &str) -> Option<&Sheet> {
        self.data.get(sheet)
    }

    pub fn sheet_mut(&mut self, sheet: &str) -> &mut Sheet {
        self.data.entry(sheet.to_string()).or_default()
    }

    pub fn field(&self, sheet: &str, field: &str) -> Option<&Value> {
        self.data.get(sheet).and_then(|s| s.get(field))
    }

    pub fn set_field(&mut self, sheet: &str, field: &str, value: Value) {
        self.sheet_mut(sheet).insert(field.to_string(), value);
    }

    /// Wire string of the path, if any.
    pub fn path_str(&self) -> Option<String> {
        self.path.as_ref().map(ResourcePath::to_wire)
    }

    /// Every path this resource points at: reference-typed fields plus `parent`.
    ///
    /// Fields or sheets unknown to the registry are skipped.
    pub fn references(&self, meta: &MetaApi) -> Vec<String> {
        let mut refs = Vec::new();
        for (sheet_name, sheet) in &self.data {
            for (field_name, value) in sheet {
                let is_reference = meta
                    .field(sheet_name, field_name)
                    .map(|f| f.valuetype.is_reference())
                    .unwrap_or(false);
                if is_reference {
                    collect_paths(value, &mut refs);
                }
            }
        }
        if let Some(parent) = &self.parent {
            refs.push(parent.to_wire());
        }
        refs
    }
}

fn collect_paths(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_paths(v, out)),
        _ => {}
    }
}
