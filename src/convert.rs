//! Import and export of resources at the wire boundary
//!
//! Import validates a wire object against the schema registry and coerces
//! field values (the backend sends many scalars as strings). Export strips
//! everything the server would refuse in a request body.

use crate::cache::Cache;
use crate::error::{BackendErrorItem, HttpError, Result};
use crate::meta_api::{FieldMeta, MetaApi, ValueType};
use crate::path::ResourcePath;
use crate::resource::{sheets, Resource, Sheet};
use crate::transport::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// What to leave in a pool's `elements` field after warming the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginalElements {
    /// Replace element objects by their paths
    #[default]
    Paths,
    /// Keep the imported element content
    Content,
    /// Remove the field
    Omit,
}

impl OriginalElements {
    /// Policy for the `elements` query parameter value.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("content") => OriginalElements::Content,
            Some("omit") => OriginalElements::Omit,
            _ => OriginalElements::Paths,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Import nested pool elements and seed them into the cache
    pub warmup_pool_cache: bool,
    pub original_elements: OriginalElements,
}

/// Outcome of one batch request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Imported(Resource),
    /// DELETE responses carry no body
    Deleted(ResourcePath),
}

impl BatchOutcome {
    pub fn path(&self) -> Option<&ResourcePath> {
        match self {
            BatchOutcome::Imported(resource) => resource.path.as_ref(),
            BatchOutcome::Deleted(path) => Some(path),
        }
    }

    pub fn into_resource(self) -> Option<Resource> {
        match self {
            BatchOutcome::Imported(resource) => Some(resource),
            BatchOutcome::Deleted(_) => None,
        }
    }
}

/// Methods allowed on a resource, as reported by OPTIONS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ResourceOptions {
    pub options: bool,
    pub put: bool,
    pub get: bool,
    pub post: bool,
    pub head: bool,
}

/// Build a `Resource` from a wire object, coercing field values.
pub fn import_resource(
    wire: &Value,
    meta: &MetaApi,
    options: &ImportOptions,
    cache: Option<&Cache>,
) -> Result<Resource> {
    let obj = wire
        .as_object()
        .ok_or_else(|| HttpError::MalformedResource(format!("not an object: {}", wire)))?;

    let content_type = obj
        .get("content_type")
        .and_then(Value::as_str)
        .ok_or_else(|| HttpError::MalformedResource(format!("resource has no content_type field: {}", wire)))?;
    if !meta.resource_exists(content_type) {
        return Err(HttpError::MalformedResource(format!("unknown content_type: {}", content_type)));
    }
    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| HttpError::MalformedResource(format!("resource has no path field: {}", wire)))?;

    let mut resource = Resource::new(content_type).with_path(ResourcePath::parse(path)?);
    resource.parent = optional_path(obj, "parent")?;
    resource.first_version_path = optional_path(obj, "first_version_path")?;
    if let Some(roots) = obj.get("root_versions") {
        resource.root_versions = serde_json::from_value(roots.clone())?;
    }

    if let Some(data) = obj.get("data") {
        let data = data
            .as_object()
            .ok_or_else(|| HttpError::MalformedResource("data is not an object".into()))?;
        resource.data = import_sheets(data, meta)?;
    }

    if options.warmup_pool_cache {
        warmup_pool(&mut resource, meta, options.original_elements, cache)?;
    }

    Ok(resource)
}

fn optional_path(obj: &Map<String, Value>, key: &str) -> Result<Option<ResourcePath>> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(Some(ResourcePath::parse(s)?)),
        _ => Ok(None),
    }
}

fn import_sheets(data: &Map<String, Value>, meta: &MetaApi) -> Result<BTreeMap<String, Sheet>> {
    let mut out = BTreeMap::new();
    for (sheet_name, sheet) in data {
        if !meta.sheet_exists(sheet_name) {
            return Err(HttpError::UnknownSheet(sheet_name.clone()));
        }
        let fields = sheet
            .as_object()
            .ok_or_else(|| HttpError::MalformedResource(format!("sheet {} is not an object", sheet_name)))?;
        let mut imported = Sheet::new();
        for (field_name, value) in fields {
            let value = match meta.field(sheet_name, field_name) {
                Ok(field) => coerce_field(field, value).map_err(|reason| HttpError::Coercion {
                    sheet: sheet_name.clone(),
                    field: field_name.clone(),
                    reason,
                })?,
                // unknown fields are tolerated and kept as they are
                Err(_) => value.clone(),
            };
            imported.insert(field_name.clone(), value);
        }
        out.insert(sheet_name.clone(), imported);
    }
    Ok(out)
}

fn coerce_field(field: &FieldMeta, value: &Value) -> std::result::Result<Value, String> {
    if field.is_list() {
        return match value {
            Value::Array(items) => items
                .iter()
                .map(|v| coerce_value(&field.valuetype, v))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Null => Ok(Value::Null),
            other => Err(format!("expected a list, got {}", other)),
        };
    }
    coerce_value(&field.valuetype, value)
}

fn coerce_value(valuetype: &ValueType, value: &Value) -> std::result::Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match valuetype {
        ValueType::Boolean => parse_boolean(value).map(Value::Bool),
        ValueType::Integer => parse_integer(value).map(|i| Value::Number(i.into())),
        ValueType::Float => parse_float(value).and_then(float_value),
        ValueType::Point => parse_point(value),
        ValueType::Polygon => parse_polygon(value),
        ValueType::Reference | ValueType::Other(_) => Ok(value.clone()),
    }
}

fn parse_boolean(value: &Value) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(format!("not a boolean: {}", other)),
    }
}

fn parse_integer(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| format!("not an integer: {}", n)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|e| format!("{}: {:?}", e, s)),
        other => Err(format!("not an integer: {}", other)),
    }
}

fn parse_float(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("not a float: {}", n)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|e| format!("{}: {:?}", e, s)),
        other => Err(format!("not a float: {}", other)),
    }
}

fn float_value(f: f64) -> std::result::Result<Value, String> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("not a finite float: {}", f))
}

fn parse_point(value: &Value) -> std::result::Result<Value, String> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y]) => Ok(Value::Array(vec![
            float_value(parse_float(x)?)?,
            float_value(parse_float(y)?)?,
        ])),
        _ => Err(format!("not a point: {}", value)),
    }
}

fn parse_polygon(value: &Value) -> std::result::Result<Value, String> {
    let rings = value
        .as_array()
        .ok_or_else(|| format!("not a polygon: {}", value))?;
    rings
        .iter()
        .map(|ring| {
            ring.as_array()
                .ok_or_else(|| format!("not a polygon ring: {}", ring))?
                .iter()
                .map(parse_point)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array)
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn warmup_pool(
    resource: &mut Resource,
    meta: &MetaApi,
    policy: OriginalElements,
    cache: Option<&Cache>,
) -> Result<()> {
    let elements = match resource.field(sheets::POOL, "elements") {
        Some(Value::Array(items)) if items.iter().any(Value::is_object) => items.clone(),
        _ => return Ok(()),
    };

    let mut replaced = Vec::with_capacity(elements.len());
    for element in elements {
        if !element.is_object() {
            replaced.push(element);
            continue;
        }
        let imported = import_resource(&element, meta, &ImportOptions::default(), None)?;
        let path = imported.path_str().unwrap_or_default();
        if let Some(cache) = cache {
            cache.put_cached(&path, "", element);
        }
        replaced.push(match policy {
            OriginalElements::Content => serde_json::to_value(&imported)?,
            _ => Value::String(path),
        });
    }

    let pool = resource.sheet_mut(sheets::POOL);
    match policy {
        OriginalElements::Omit => {
            pool.remove("elements");
        }
        _ => {
            pool.insert("elements".into(), Value::Array(replaced));
        }
    }
    Ok(())
}

/// Request body for `resource`: only writable fields, no `path`.
///
/// The metadata sheet's `hidden` flag is only sent with `keep_metadata`.
pub fn export_resource(resource: &Resource, meta: &MetaApi, keep_metadata: bool) -> Result<Value> {
    let mut exported = resource.clone();
    exported.path = None;

    for (sheet_name, sheet) in exported.data.iter_mut() {
        if !meta.sheet_exists(sheet_name) {
            return Err(HttpError::UnknownSheet(sheet_name.clone()));
        }
        let mut keep = Vec::new();
        for field_name in sheet.keys() {
            if meta.field(sheet_name, field_name)?.is_writable() {
                keep.push(field_name.clone());
            }
        }
        sheet.retain(|name, _| keep.contains(name));
    }

    if !keep_metadata {
        if let Some(metadata) = exported.data.get_mut(sheets::METADATA) {
            metadata.remove("hidden");
        }
    }
    exported.data.retain(|_, sheet| !sheet.is_empty());

    Ok(serde_json::to_value(&exported)?)
}

/// One entry of a batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_first_version_path: Option<String>,
}

/// One entry of a batch response. Batch entries use `body`, not `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseItem {
    pub code: u16,
    #[serde(default)]
    pub body: Value,
}

/// Zip batch responses with their requests and import them in order.
pub fn import_batch_resources(
    requests: &[BatchRequest],
    responses: &[BatchResponseItem],
    meta: &MetaApi,
) -> Result<Vec<BatchOutcome>> {
    if requests.len() != responses.len() {
        return Err(HttpError::InvalidResponse(format!(
            "batch returned {} responses for {} requests",
            responses.len(),
            requests.len()
        )));
    }
    requests
        .iter()
        .zip(responses)
        .map(|(request, response)| match request.method {
            Method::Delete => Ok(BatchOutcome::Deleted(ResourcePath::parse(&request.path)?)),
            _ => import_resource(&response.body, meta, &ImportOptions::default(), None)
                .map(BatchOutcome::Imported),
        })
        .collect()
}

/// Import an OPTIONS body. Each method is allowed iff its entry is truthy.
pub fn import_options(wire: &Value) -> ResourceOptions {
    let allowed = |key: &str| wire.get(key).map(is_truthy).unwrap_or(false);
    ResourceOptions {
        options: allowed("OPTIONS"),
        put: allowed("PUT"),
        get: allowed("GET"),
        post: allowed("POST"),
        head: allowed("HEAD"),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    status: String,
    #[serde(default)]
    errors: Vec<BackendErrorItem>,
}

/// Turn a failed response into a structured `Backend` error.
pub fn parse_backend_error(status: u16, body: &Value) -> HttpError {
    let errors = if status == 410 {
        let reason = body
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("gone");
        vec![BackendErrorItem::new("", "", reason)]
    } else {
        match serde_json::from_value::<ErrorBody>(body.clone()) {
            Ok(parsed) if parsed.status == "error" && !parsed.errors.is_empty() => parsed.errors,
            _ => {
                let description = match body {
                    Value::Null => format!("HTTP {}", status),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                vec![BackendErrorItem::new("", "", description)]
            }
        }
    };
    HttpError::Backend { status, errors }
}
