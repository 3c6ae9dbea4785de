use crate::drive::DriveSource;
use crate::folder_context::FolderMeta;
use anyhow::Context as AnyhowContext;
use botanical_types::folder::FolderRecord;
use botanical_types::state::StateRepository;
use botanical_types::{FolderStatus, Platforms};
use serde_json::Value;
use typesafe_repository::async_ops::Save;

/// Key under which the Drive creation time is kept in a state record.
pub const CREATED_TIME_KEY: &str = "createdTime";

/// Inbox subfolders that have no state record yet, oldest first.
pub async fn find_new_folders(
    drive: &dyn DriveSource,
    state: &dyn StateRepository,
    inbox_folder_id: &str,
) -> Result<Vec<FolderMeta>, anyhow::Error> {
    let folders = drive
        .list_subfolders(inbox_folder_id)
        .await
        .with_context(|| format!("Unable to list inbox folder {inbox_folder_id}"))?;
    let processed = state.processed_ids().await?;
    log::debug!(
        "Drive returned {} folders, {} already have a state record",
        folders.len(),
        processed.len()
    );
    Ok(folders
        .into_iter()
        .filter(|f| !processed.contains(&f.id))
        .map(|f| FolderMeta {
            id: f.id,
            name: f.name,
            created_time: f.created_time,
        })
        .collect())
}

/// Records every new folder as pending and returns them.
pub async fn discover(
    drive: &dyn DriveSource,
    state: &dyn StateRepository,
    inbox_folder_id: &str,
) -> Result<Vec<FolderMeta>, anyhow::Error> {
    let folders = find_new_folders(drive, state, inbox_folder_id).await?;
    for folder in &folders {
        let mut record = FolderRecord::new(
            folder.id.clone(),
            folder.name.clone(),
            FolderStatus::Pending,
            Platforms::new(),
        );
        if !folder.created_time.is_empty() {
            record.extra.insert(
                CREATED_TIME_KEY.to_string(),
                Value::String(folder.created_time.clone()),
            );
        }
        state.save(record).await?;
        log::info!("New folder {} ({}) marked pending", folder.name, folder.id);
    }
    log::info!("Discovered {} new folders", folders.len());
    Ok(folders)
}
