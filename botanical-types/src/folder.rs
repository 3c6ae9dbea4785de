use crate::{FolderStatus, Platforms};
use serde::{Deserialize, Serialize};
use typesafe_repository::macros::Id;
use typesafe_repository::{GetIdentity, Identity, IdentityOf, RefIdentity};

/// File metadata as returned by the Drive listing endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub created_time: String,
}

impl DriveFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Everything known about one product folder before the AI step.
///
/// Built fresh for every processing attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FolderContext {
    pub folder_id: String,
    pub folder_name: String,
    pub created_time: String,

    pub product_type: String,
    pub raw_materials_str: String,
    pub series: String,
    pub price_from_name: Option<f64>,
    /// Only filled by the `sku-price-name` folder naming convention.
    pub sku: Option<String>,

    pub image_files: Vec<DriveFile>,
    pub other_files: Vec<DriveFile>,
    pub note_file: Option<DriveFile>,
    pub note_text: String,
}

/// One entry of the state document.
///
/// `id` is the key under `folders` and is not serialized into the record body.
/// Keys this version doesn't know about survive a load/save cycle through `extra`.
#[derive(Id, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[Id(ref_id, get_id)]
pub struct FolderRecord {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: FolderStatus,
    #[serde(default)]
    pub platforms: Platforms,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FolderRecord {
    pub fn new(id: IdentityOf<Self>, name: String, status: FolderStatus, platforms: Platforms) -> Self {
        Self {
            id,
            name,
            status,
            platforms,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_id(self, id: IdentityOf<Self>) -> Self {
        Self { id, ..self }
    }
}
