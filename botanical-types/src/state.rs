use crate::folder::FolderRecord;
use crate::{FolderStatus, Platforms};
use async_trait::async_trait;
use std::collections::HashSet;
use typesafe_repository::async_ops::{Get, List, Save};
use typesafe_repository::{IdentityOf, Repository};

/// Durable mapping from folder id to [`FolderRecord`].
///
/// `save` replaces the whole record, it never merges with what was stored before.
/// Callers that want to keep `platforms` across a retry must read and re-supply it.
#[async_trait]
pub trait StateRepository:
    Repository<FolderRecord, Error = anyhow::Error>
    + Get<FolderRecord>
    + List<FolderRecord>
    + Save<FolderRecord>
    + Send
    + Sync
{
    /// Every id that has a record, regardless of status.
    async fn processed_ids(&self) -> Result<HashSet<IdentityOf<FolderRecord>>, anyhow::Error>;

    /// Records whose status is in `filter`, in document order.
    async fn unfinished(&self, filter: &[FolderStatus]) -> Result<Vec<FolderRecord>, anyhow::Error> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| filter.contains(&r.status))
            .collect())
    }

    async fn mark(
        &self,
        id: IdentityOf<FolderRecord>,
        name: String,
        status: FolderStatus,
        platforms: Platforms,
    ) -> Result<(), anyhow::Error> {
        log::debug!("Marking folder {id} ({name}) as {status}");
        self.save(FolderRecord::new(id, name, status, platforms)).await
    }
}
