use crate::drive::DriveSource;
use crate::folder_name::NamingConvention;
use botanical_types::folder::{DriveFile, FolderContext};
use derive_more::{Display, Error};
use log_error::LogError;
use std::path::{Path, PathBuf};

/// Folder contents that make a folder impossible to list.
#[derive(Debug, Display, Error)]
pub enum FolderError {
    #[display("folder {name} ({id}) has no files")]
    NoFiles { id: String, name: String },
    #[display("folder {name} ({id}) has no image files")]
    NoImages { id: String, name: String },
}

const NOTE_FILE_NAMES: [&str; 3] = ["note.txt", "notes.txt", "note"];

/// Identity of a folder as known before any of its files are listed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FolderMeta {
    pub id: String,
    pub name: String,
    pub created_time: String,
}

pub fn is_note_file(file: &DriveFile) -> bool {
    let name = file.name.trim().to_lowercase();
    NOTE_FILE_NAMES.contains(&name.as_str())
}

pub fn classify_files(files: Vec<DriveFile>) -> (Vec<DriveFile>, Vec<DriveFile>) {
    files.into_iter().partition(DriveFile::is_image)
}

/// Extension of a Drive file name, `jpg` when it has none.
fn image_extension(name: &str) -> &str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("jpg")
}

/// Local path for the main image, keeping the original extension.
pub fn main_image_path(temp_dir: &Path, folder_id: &str, original_name: &str) -> PathBuf {
    let ext = image_extension(original_name);
    temp_dir
        .join("images")
        .join(format!("{folder_id}_main.{ext}"))
}

/// Lists the folder, downloads its first image and optional note, and parses its name.
///
/// Returns the context together with the local path of the downloaded main image.
pub async fn build_folder_context(
    meta: &FolderMeta,
    drive: &dyn DriveSource,
    temp_dir: &Path,
    convention: NamingConvention,
) -> Result<(FolderContext, PathBuf), anyhow::Error> {
    let files = drive.list_files(&meta.id).await?;
    if files.is_empty() {
        return Err(FolderError::NoFiles {
            id: meta.id.clone(),
            name: meta.name.clone(),
        }
        .into());
    }
    let (image_files, other_files) = classify_files(files);
    let main_image = image_files.first().ok_or_else(|| FolderError::NoImages {
        id: meta.id.clone(),
        name: meta.name.clone(),
    })?;

    let dest = main_image_path(temp_dir, &meta.id, &main_image.name);
    log::info!("Downloading main image {} -> {dest:?}", main_image.name);
    let main_image_path = drive.download(&main_image.id, &dest).await?;

    let parsed = convention.parse(&meta.name);

    let note_file = other_files.iter().find(|f| is_note_file(f)).cloned();
    let note_text = match &note_file {
        Some(note) => read_note(drive, note, &temp_dir.join("images").join(format!("{}_note.txt", meta.id)))
            .await
            .log_error("Unable to read note file")
            .unwrap_or_default(),
        None => String::new(),
    };

    let ctx = FolderContext {
        folder_id: meta.id.clone(),
        folder_name: meta.name.clone(),
        created_time: meta.created_time.clone(),
        product_type: parsed.product_type,
        raw_materials_str: parsed.materials_raw,
        series: parsed.series,
        price_from_name: parsed.price,
        sku: parsed.sku,
        image_files,
        other_files,
        note_file,
        note_text,
    };
    log::debug!(
        "Folder {} parsed as type={:?} materials={:?} series={:?} price={:?}, {} images",
        ctx.folder_id,
        ctx.product_type,
        ctx.raw_materials_str,
        ctx.series,
        ctx.price_from_name,
        ctx.image_files.len()
    );
    Ok((ctx, main_image_path))
}

/// Local copies of up to `limit` folder images in listing order, reusing the main image.
pub async fn download_images(
    ctx: &FolderContext,
    main_image: &Path,
    drive: &dyn DriveSource,
    temp_dir: &Path,
    limit: usize,
) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut paths = vec![main_image.to_path_buf()];
    for (i, image) in ctx.image_files.iter().enumerate().skip(1).take(limit.saturating_sub(1)) {
        let ext = image_extension(&image.name);
        let dest = temp_dir
            .join("images")
            .join(format!("{}_{}.{ext}", ctx.folder_id, i + 1));
        paths.push(drive.download(&image.id, &dest).await?);
    }
    Ok(paths)
}

async fn read_note(
    drive: &dyn DriveSource,
    note: &DriveFile,
    dest: &Path,
) -> Result<String, anyhow::Error> {
    let path = drive.download(&note.id, dest).await?;
    let bytes = tokio::fs::read(&path).await?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory Drive: folder id -> files, file id -> content.
    #[derive(Default)]
    pub struct FakeDrive {
        pub folders: Vec<DriveFile>,
        pub files: HashMap<String, Vec<DriveFile>>,
        pub contents: HashMap<String, Vec<u8>>,
        pub downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DriveSource for FakeDrive {
        async fn list_subfolders(&self, _parent_id: &str) -> Result<Vec<DriveFile>, anyhow::Error> {
            Ok(self.folders.clone())
        }

        async fn list_files(&self, folder_id: &str) -> Result<Vec<DriveFile>, anyhow::Error> {
            Ok(self.files.get(folder_id).cloned().unwrap_or_default())
        }

        async fn download(&self, file_id: &str, dest: &Path) -> Result<PathBuf, anyhow::Error> {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = self.contents.get(file_id).cloned().unwrap_or_default();
            tokio::fs::write(dest, content).await?;
            self.downloads.lock().unwrap().push(file_id.to_string());
            Ok(dest.to_path_buf())
        }
    }

    pub fn file(id: &str, name: &str, mime: &str) -> DriveFile {
        DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime.to_string(),
            created_time: String::new(),
        }
    }

    pub fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("botanical-{}", uuid::Uuid::new_v4()))
    }

    fn meta(id: &str, name: &str) -> FolderMeta {
        FolderMeta {
            id: id.to_string(),
            name: name.to_string(),
            created_time: "2024-05-01T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn recognizes_note_files() {
        assert!(is_note_file(&file("1", "Note.TXT", "text/plain")));
        assert!(is_note_file(&file("1", "notes.txt", "text/plain")));
        assert!(is_note_file(&file("1", "NOTE", "application/octet-stream")));
        assert!(!is_note_file(&file("1", "my note.txt", "text/plain")));
    }

    #[test]
    fn builds_main_image_path() {
        let dir = Path::new("tmp");
        assert_eq!(
            Path::new("tmp/images/f1_main.png"),
            main_image_path(dir, "f1", "front.png")
        );
        assert_eq!(
            Path::new("tmp/images/f1_main.jpg"),
            main_image_path(dir, "f1", "front")
        );
        assert_eq!(
            Path::new("tmp/images/f1_main.jpg"),
            main_image_path(dir, "f1", "front.")
        );
    }

    #[tokio::test]
    async fn builds_context_with_note() {
        let mut drive = FakeDrive::default();
        drive.files.insert(
            "f1".to_string(),
            vec![
                file("n1", "note.txt", "text/plain"),
                file("i1", "front.png", "image/png"),
                file("i2", "back.jpg", "image/jpeg"),
            ],
        );
        drive.contents.insert("n1".to_string(), "made with moss".as_bytes().to_vec());
        let dir = temp_dir();

        let (ctx, main_image) = build_folder_context(
            &meta("f1", "earring-driedflower-forestseries_25"),
            &drive,
            &dir,
            NamingConvention::TypeMaterialsSeries,
        )
        .await
        .unwrap();

        assert_eq!(dir.join("images").join("f1_main.png"), main_image);
        assert!(main_image.exists());
        assert_eq!("earring", ctx.product_type);
        assert_eq!("driedflower", ctx.raw_materials_str);
        assert_eq!("forestseries", ctx.series);
        assert_eq!(Some(25.), ctx.price_from_name);
        assert_eq!(vec!["i1", "i2"], ctx.image_files.iter().map(|f| f.id.as_str()).collect::<Vec<_>>());
        assert_eq!(Some("n1".to_string()), ctx.note_file.map(|f| f.id));
        assert_eq!("made with moss", ctx.note_text);
        assert_eq!("2024-05-01T10:00:00Z", ctx.created_time);
        assert_eq!(vec!["i1", "n1"], *drive.downloads.lock().unwrap());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn undecodable_note_is_empty() {
        let mut drive = FakeDrive::default();
        drive.files.insert(
            "f1".to_string(),
            vec![file("i1", "a.jpg", "image/jpeg"), file("n1", "notes.txt", "text/plain")],
        );
        drive.contents.insert("n1".to_string(), vec![0xff, 0xfe, 0xfd]);
        let dir = temp_dir();
        let (ctx, _) = build_folder_context(&meta("f1", "x"), &drive, &dir, NamingConvention::default())
            .await
            .unwrap();
        assert!(ctx.note_file.is_some());
        assert_eq!("", ctx.note_text);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn downloads_remaining_images_up_to_limit() {
        let drive = FakeDrive::default();
        let dir = temp_dir();
        let ctx = FolderContext {
            folder_id: "f1".to_string(),
            image_files: vec![
                file("i1", "a.jpg", "image/jpeg"),
                file("i2", "b.png", "image/png"),
                file("i3", "c", "image/jpeg"),
                file("i4", "d.", "image/jpeg"),
            ],
            ..Default::default()
        };
        let main = dir.join("images").join("f1_main.jpg");

        let paths = download_images(&ctx, &main, &drive, &dir, 10).await.unwrap();
        assert_eq!(
            vec![
                main.clone(),
                dir.join("images").join("f1_2.png"),
                dir.join("images").join("f1_3.jpg"),
                dir.join("images").join("f1_4.jpg"),
            ],
            paths
        );
        assert_eq!(vec!["i2", "i3", "i4"], *drive.downloads.lock().unwrap());

        let paths = download_images(&ctx, &main, &drive, &dir, 2).await.unwrap();
        assert_eq!(2, paths.len());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn fails_without_files_or_images() {
        let mut drive = FakeDrive::default();
        drive.files.insert("f2".to_string(), vec![file("n1", "note.txt", "text/plain")]);
        let dir = temp_dir();

        let err = build_folder_context(&meta("f1", "empty"), &drive, &dir, NamingConvention::default())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<FolderError>(), Some(FolderError::NoFiles { .. })));

        let err = build_folder_context(&meta("f2", "notes only"), &drive, &dir, NamingConvention::default())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<FolderError>(), Some(FolderError::NoImages { .. })));
        assert!(drive.downloads.lock().unwrap().is_empty());
    }
}
