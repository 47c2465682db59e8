use super::HttpService;
use crate::error::{HttpError, Result};
use crate::resource::Resource;
use crate::resource_util::sort_resources_topologically;
use tracing::info;

impl HttpService {
    /// Create a set of interdependent resources in one batch.
    ///
    /// Resources may reference each other, and their parents, by preliminary
    /// path. Missing paths are assigned here. Each resource is posted to its
    /// parent after everything it references. The created resources are
    /// returned in input order.
    pub async fn deep_post(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let names = self.preliminary_names();
        let mut resources = resources;
        for resource in resources.iter_mut() {
            if resource.path.is_none() {
                resource.path = Some(names.next_preliminary());
            }
            if resource.first_version_path.is_none()
                && self.meta_api().item_type(&resource.content_type).is_some()
            {
                resource.first_version_path = Some(names.next_preliminary());
            }
        }

        let order = sort_resources_topologically(&resources, self.meta_api())?;

        let mut transaction = self.transaction();
        for &index in &order {
            let resource = &resources[index];
            let parent = resource.parent.clone().ok_or_else(|| {
                HttpError::MalformedResource(format!(
                    "resource {} has no parent to post to",
                    resource.path_str().unwrap_or_default()
                ))
            })?;
            transaction.post(parent, resource.clone())?;
        }
        let outcomes = transaction.commit().await?;

        let mut posted: Vec<Option<Resource>> = vec![None; resources.len()];
        for (&index, outcome) in order.iter().zip(outcomes) {
            posted[index] = outcome.into_resource();
        }

        for parent in resources.iter().filter_map(|r| r.parent.as_ref()) {
            if let Some(path) = parent.as_real() {
                self.cache().invalidate(path);
            }
        }

        info!(resources = resources.len(), "deep post committed");
        posted
            .into_iter()
            .map(|r| {
                r.ok_or_else(|| HttpError::InvalidResponse("batch response is missing a resource".into()))
            })
            .collect()
    }
}
