//! Schema registry
//!
//! The backend publishes its resource and sheet schema at `/meta_api`.
//! Resources keep their fields as dynamic JSON; this registry is what
//! decides which fields are references, which need coercion and which
//! may be sent back to the server.

use crate::error::{HttpError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value type of a field, derived from the backend's `valuetype` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    Point,
    Polygon,
    /// A path pointing at another resource
    Reference,
    /// Any type that is passed through unchanged
    Other(String),
}

impl ValueType {
    /// Classify a backend type name such as `adhocracy_core.schema.Integer`.
    pub fn from_name(name: &str) -> Self {
        let short = name.rsplit('.').next().unwrap_or(name);
        match short {
            "Boolean" => ValueType::Boolean,
            "Integer" | "Int" | "Rate" => ValueType::Integer,
            "Float" | "Decimal" => ValueType::Float,
            "Point" => ValueType::Point,
            "Polygon" => ValueType::Polygon,
            "AbsolutePath" | "Reference" | "ResourcePath" => ValueType::Reference,
            s if s.ends_with("Reference") => ValueType::Reference,
            _ => ValueType::Other(name.to_string()),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Reference)
    }
}

/// Metadata of a single sheet field.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub valuetype: ValueType,
    /// `Some("list")` for list-valued fields
    pub containertype: Option<String>,
    pub editable: bool,
    pub creatable: bool,
    pub create_mandatory: bool,
    pub readable: bool,
}

impl FieldMeta {
    pub fn is_list(&self) -> bool {
        self.containertype.is_some()
    }

    /// Whether the field may appear in a request body.
    pub fn is_writable(&self) -> bool {
        self.editable || self.creatable || self.create_mandatory
    }
}

/// Metadata of a resource type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMeta {
    #[serde(default)]
    pub sheets: Vec<String>,
    #[serde(default)]
    pub element_types: Vec<String>,
    /// Version type for item resources
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub super_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetaApiDocument {
    #[serde(default)]
    resources: HashMap<String, ResourceMeta>,
    #[serde(default)]
    sheets: HashMap<String, SheetDocument>,
}

#[derive(Debug, Deserialize)]
struct SheetDocument {
    #[serde(default)]
    fields: Vec<FieldDocument>,
}

#[derive(Debug, Deserialize)]
struct FieldDocument {
    name: String,
    valuetype: String,
    #[serde(default)]
    containertype: Option<String>,
    #[serde(default)]
    editable: bool,
    #[serde(default)]
    creatable: bool,
    #[serde(default)]
    create_mandatory: bool,
    #[serde(default = "default_true")]
    readable: bool,
}

fn default_true() -> bool {
    true
}

/// Statically loaded schema registry.
#[derive(Debug, Clone, Default)]
pub struct MetaApi {
    resources: HashMap<String, ResourceMeta>,
    sheets: HashMap<String, HashMap<String, FieldMeta>>,
}

impl MetaApi {
    /// Build the registry from the `/meta_api` document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let doc: MetaApiDocument = serde_json::from_value(value)?;

        let sheets = doc
            .sheets
            .into_iter()
            .map(|(sheet_name, sheet)| {
                let fields = sheet
                    .fields
                    .into_iter()
                    .map(|f| {
                        let meta = FieldMeta {
                            valuetype: ValueType::from_name(&f.valuetype),
                            name: f.name.clone(),
                            containertype: f.containertype,
                            editable: f.editable,
                            creatable: f.creatable,
                            create_mandatory: f.create_mandatory,
                            readable: f.readable,
                        };
                        (f.name, meta)
                    })
                    .collect();
                (sheet_name, fields)
            })
            .collect();

        Ok(Self {
            resources: doc.resources,
            sheets,
        })
    }

    pub fn resource_exists(&self, content_type: &str) -> bool {
        self.resources.contains_key(content_type)
    }

    pub fn resource(&self, content_type: &str) -> Option<&ResourceMeta> {
        self.resources.get(content_type)
    }

    /// Version content type of an item type, `None` for non-items.
    pub fn item_type(&self, content_type: &str) -> Option<&str> {
        self.resources
            .get(content_type)
            .and_then(|r| r.item_type.as_deref())
    }

    pub fn sheet_exists(&self, sheet: &str) -> bool {
        self.sheets.contains_key(sheet)
    }

    pub fn field_exists(&self, sheet: &str, field: &str) -> bool {
        self.sheets
            .get(sheet)
            .map(|fields| fields.contains_key(field))
            .unwrap_or(false)
    }

    pub fn field(&self, sheet: &str, field: &str) -> Result<&FieldMeta> {
        let fields = self
            .sheets
            .get(sheet)
            .ok_or_else(|| HttpError::UnknownSheet(sheet.to_string()))?;
        fields.get(field).ok_or_else(|| HttpError::UnknownField {
            sheet: sheet.to_string(),
            field: field.to_string(),
        })
    }
}
