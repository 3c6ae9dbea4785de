use derive_more::Display;
use serde::{Deserialize, Serialize};

pub mod folder;
pub mod product;
pub mod state;

/// Processing status of a Drive folder as recorded in the state document.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
    #[display("pending")]
    Pending,
    #[display("success")]
    Success,
    #[display("failed")]
    Failed,
}

impl FolderStatus {
    /// Statuses that still need work.
    pub const UNFINISHED: [FolderStatus; 2] = [FolderStatus::Pending, FolderStatus::Failed];

    pub fn try_from<S: AsRef<str>>(s: S) -> Option<Self> {
        match s.as_ref().trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Platform name to arbitrary platform metadata, e.g. `{"etsy": {"listing_id": 1}}`.
pub type Platforms = serde_json::Map<String, serde_json::Value>;
