//! Dependency ordering for deep posts
//!
//! Resources posted in one batch may reference each other through
//! preliminary paths. The server resolves those references in request
//! order, so every referenced resource has to be posted before its
//! referrer.

use crate::error::{HttpError, Result};
use crate::meta_api::MetaApi;
use crate::path::is_preliminary;
use crate::resource::Resource;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug)]
struct Vertex {
    index: usize,
    incoming: HashSet<String>,
    outgoing: Vec<String>,
    done: bool,
}

/// Order `resources` so that every preliminary reference target comes
/// before its referrer. Returns indices into `resources`.
///
/// Only references to preliminary paths of other resources in the same
/// slice are dependencies; persisted paths already exist. Co-ready
/// resources keep their input order.
pub fn sort_resources_topologically(resources: &[Resource], meta: &MetaApi) -> Result<Vec<usize>> {
    let mut keys = Vec::with_capacity(resources.len());
    let mut dag: HashMap<String, Vertex> = HashMap::with_capacity(resources.len());

    for (index, resource) in resources.iter().enumerate() {
        let key = resource.path_str().ok_or_else(|| {
            HttpError::MalformedResource(format!(
                "resource of type {} has no path",
                resource.content_type
            ))
        })?;
        let vertex = Vertex {
            index,
            incoming: HashSet::new(),
            outgoing: Vec::new(),
            done: false,
        };
        if dag.insert(key.clone(), vertex).is_some() {
            return Err(HttpError::MalformedResource(format!("duplicate path {}", key)));
        }
        keys.push(key);
    }

    // A new item's first version is created by the same request as the item.
    let aliases: HashMap<String, String> = resources
        .iter()
        .zip(&keys)
        .filter_map(|(r, key)| {
            r.first_version_path
                .as_ref()
                .filter(|p| p.is_preliminary())
                .map(|p| (p.to_wire(), key.clone()))
        })
        .collect();

    for (resource, key) in resources.iter().zip(&keys) {
        for target in resource.references(meta) {
            let target = aliases.get(&target).cloned().unwrap_or(target);
            if !is_preliminary(&target) || !dag.contains_key(&target) {
                continue;
            }
            let newly_added = dag
                .get_mut(key)
                .map(|v| v.incoming.insert(target.clone()))
                .unwrap_or(false);
            if newly_added {
                if let Some(source) = dag.get_mut(&target) {
                    source.outgoing.push(key.clone());
                }
            }
        }
    }

    let mut ready: VecDeque<String> = keys
        .iter()
        .filter(|k| dag.get(*k).map(|v| v.incoming.is_empty()).unwrap_or(false))
        .cloned()
        .collect();
    let mut order = Vec::with_capacity(resources.len());

    while let Some(key) = ready.pop_front() {
        let outgoing = match dag.get_mut(&key) {
            Some(vertex) => {
                vertex.done = true;
                order.push(vertex.index);
                std::mem::take(&mut vertex.outgoing)
            }
            None => continue,
        };
        for target in outgoing {
            if let Some(dependent) = dag.get_mut(&target) {
                dependent.incoming.remove(&key);
                if dependent.incoming.is_empty() && !dependent.done {
                    ready.push_back(target);
                }
            }
        }
    }

    if order.len() < resources.len() {
        let mut remaining: Vec<String> = dag
            .into_iter()
            .filter(|(_, v)| !v.done)
            .map(|(k, _)| k)
            .collect();
        remaining.sort();
        return Err(HttpError::CycleDetected(remaining));
    }

    Ok(order)
}
