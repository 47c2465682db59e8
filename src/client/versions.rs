//! No-fork versioning
//!
//! Items of a no-fork type keep a single linear version history. A new
//! version must follow the current head; when another client got there
//! first the backend rejects the POST and we retry against the new head.

use super::{check_real, HttpService};
use crate::backoff::Backoff;
use crate::error::{HttpError, Result};
use crate::path::parent_path;
use crate::resource::{sheets, Resource};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Result of posting a version through the no-fork protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct NoForkPosted {
    pub value: Resource,
    /// The head moved while posting and the version was rebased onto it
    pub parent_changed: bool,
}

fn last_tag_path(item_path: &str) -> String {
    format!("{}/LAST/", item_path.trim_end_matches('/'))
}

impl HttpService {
    /// Path of the single head version of a no-fork item.
    pub async fn get_newest_version_path_no_fork(&self, item_path: &str) -> Result<String> {
        let tag = self.get(&last_tag_path(item_path)).await?;
        let heads: Vec<&Value> = tag
            .field(sheets::TAG, "elements")
            .and_then(Value::as_array)
            .map(|elements| elements.iter().collect())
            .unwrap_or_default();

        match heads.as_slice() {
            [Value::String(head)] => Ok(head.clone()),
            [other] => Err(HttpError::MalformedResource(format!(
                "LAST tag element is not a path: {}",
                other
            ))),
            _ => Err(HttpError::AmbiguousOrMissingHead {
                path: item_path.to_string(),
                count: heads.len(),
            }),
        }
    }

    /// Post `resource` as the successor of `old_version_path`.
    ///
    /// On a "no fork allowed" rejection the loop waits, re-reads the head
    /// and tries again, up to `no_fork.max_attempts` POSTs in total. Any
    /// other error is returned as is. Dropping the future stops the loop.
    pub async fn post_new_version_no_fork(
        &self,
        old_version_path: &str,
        resource: &Resource,
        root_versions: Option<Vec<String>>,
    ) -> Result<NoForkPosted> {
        check_real(old_version_path)?;
        let item_path = parent_path(old_version_path);
        if item_path.is_empty() {
            return Err(HttpError::MalformedResource(format!(
                "version path has no item: {}",
                old_version_path
            )));
        }
        let max_attempts = self.config().no_fork.max_attempts;
        let mut backoff = Backoff::from_config(&self.config().no_fork);

        let mut version = resource.clone();
        if let Some(root_versions) = root_versions {
            version.root_versions = root_versions;
        }
        let mut head = old_version_path.to_string();

        for attempt in 1..=max_attempts {
            version.set_field(sheets::VERSIONABLE, "follows", json!([head]));

            match self.post(&item_path, &version).await {
                Ok(value) => {
                    info!(item = %item_path, attempt, "posted new version");
                    return Ok(NoForkPosted {
                        value,
                        parent_changed: attempt > 1,
                    });
                }
                Err(e) if e.is_no_fork_conflict() => {
                    warn!(item = %item_path, head = %head, attempt, "no fork allowed, head moved");
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = backoff.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "waiting before retry");
                    self.sleeper().sleep(delay).await;

                    self.cache().invalidate(&last_tag_path(&item_path));
                    head = self.get_newest_version_path_no_fork(&item_path).await?;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(item = %item_path, attempts = max_attempts, "giving up on new version");
        Err(HttpError::RetryBudgetExhausted {
            path: item_path,
            attempts: max_attempts,
        })
    }
}
