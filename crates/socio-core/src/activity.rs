use tracing::{debug, warn};
use uuid::Uuid;

use socio_types::models::{Activity, ActivityKind};

use crate::error::{SocioError, SocioResult};
use crate::{SharedStore, blocking, now};

/// Keeps each user's activity feed bounded to the `limit` newest records.
///
/// Compaction runs after every insert. Concurrent inserts for one user may
/// briefly exceed the window; the next compaction trims it back.
#[derive(Clone)]
pub struct ActivityCompactor {
    store: SharedStore,
    limit: usize,
}

impl ActivityCompactor {
    pub fn new(store: SharedStore, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Insert an activity, then trim the user's feed.
    ///
    /// A failed trim does not undo the insert; it is logged and the next
    /// successful call re-trims.
    pub async fn record_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
        target: Option<&str>,
    ) -> SocioResult<Activity> {
        if user_id.trim().is_empty() {
            return Err(SocioError::Validation("user id is required".into()));
        }

        let activity = Activity {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            target: target.map(str::to_string),
            created_at: now(),
        };

        let stored = activity.clone();
        blocking(&self.store, move |store| Ok(store.insert_activity(&stored)?)).await?;

        if let Err(e) = self.compact(user_id).await {
            warn!("Activity compaction for {} failed, will retry on next insert: {}", user_id, e);
        }

        Ok(activity)
    }

    /// Delete every record past the newest `limit`. Returns how many were removed.
    pub async fn compact(&self, user_id: &str) -> SocioResult<usize> {
        let owner = user_id.to_string();
        let limit = self.limit;
        let removed = blocking(&self.store, move |store| {
            // Newest first, ties broken by insertion order
            let activities = store.activities_for(&owner)?;
            if activities.len() <= limit {
                return Ok(0);
            }

            let excess: Vec<Uuid> = activities[limit..].iter().map(|a| a.id).collect();
            Ok(store.delete_activities(&excess)?)
        })
        .await?;

        if removed > 0 {
            debug!("Compacted {} old activities for {}", removed, user_id);
        }
        Ok(removed)
    }

    /// The retained window, newest first.
    pub async fn recent(&self, user_id: &str) -> SocioResult<Vec<Activity>> {
        let owner = user_id.to_string();
        let limit = self.limit;
        blocking(&self.store, move |store| {
            let mut activities = store.activities_for(&owner)?;
            // A concurrent insert may not be compacted yet
            activities.truncate(limit);
            Ok(activities)
        })
        .await
    }
}
