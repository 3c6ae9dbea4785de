use crate::ai::DraftRequester;
use crate::drive::DriveSource;
use crate::etsy::ListingPublisher;
use crate::export::{export_batch, ExportItem, MAX_IMAGES};
use crate::folder_context::{build_folder_context, download_images, FolderMeta};
use crate::folder_name::NamingConvention;
use crate::loader::CREATED_TIME_KEY;
use crate::normalizer::normalize_product;
use anyhow::Context as AnyhowContext;
use botanical_types::folder::{FolderContext, FolderRecord};
use botanical_types::product::ProductDraft;
use botanical_types::state::StateRepository;
use botanical_types::FolderStatus;
use log_error::LogError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use typesafe_repository::async_ops::Save;

pub const ETSY_PLATFORM: &str = "etsy";

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub temp_dir: PathBuf,
    pub ai_results_dir: PathBuf,
    pub export_dir: PathBuf,
    pub naming_convention: NamingConvention,
    pub default_taxonomy_id: u64,
    pub export: bool,
}

#[derive(Debug, Default)]
pub struct ProcessReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Drafted but not exported, still pending.
    pub deferred: Vec<String>,
    pub exported: Option<(PathBuf, PathBuf)>,
}

/// Status a folder ends the run with, written once the batch is exported.
struct Outcome {
    record: FolderRecord,
    status: FolderStatus,
    listing: Option<Value>,
}

impl Outcome {
    fn new(record: FolderRecord, status: FolderStatus, listing: Option<Value>) -> Self {
        Self {
            record,
            status,
            listing,
        }
    }
}

struct Drafted {
    product: ProductDraft,
    ctx: FolderContext,
    main_image: PathBuf,
}

/// Runs pending folders through context, AI, normalization and optional upload,
/// then exports every product that made it through.
pub struct Processor {
    drive: Arc<dyn DriveSource>,
    ai: Arc<dyn DraftRequester>,
    state: Arc<dyn StateRepository>,
    publisher: Option<Arc<dyn ListingPublisher>>,
    options: ProcessOptions,
}

impl Processor {
    pub fn new(
        drive: Arc<dyn DriveSource>,
        ai: Arc<dyn DraftRequester>,
        state: Arc<dyn StateRepository>,
        publisher: Option<Arc<dyn ListingPublisher>>,
        options: ProcessOptions,
    ) -> Self {
        Self {
            drive,
            ai,
            state,
            publisher,
            options,
        }
    }

    pub async fn process_pending(&self) -> Result<ProcessReport, anyhow::Error> {
        let pending = self.state.unfinished(&[FolderStatus::Pending]).await?;
        let mut report = ProcessReport::default();
        if pending.is_empty() {
            log::info!("No pending folders");
            return Ok(report);
        }
        log::info!("Processing {} pending folders", pending.len());

        let mut items = vec![];
        let mut outcomes = vec![];
        for record in pending {
            log::info!("Processing folder {} ({})", record.name, record.id);
            let drafted = match self.draft_product(&record).await {
                Ok(drafted) => drafted,
                Err(err) => {
                    log::error!("Folder {} ({}) failed: {err:#}", record.name, record.id);
                    outcomes.push(Outcome::new(record, FolderStatus::Failed, None));
                    continue;
                }
            };
            let outcome = match &self.publisher {
                Some(publisher) => match self.publish(publisher.as_ref(), &drafted).await {
                    Ok(listing) => Outcome::new(record, FolderStatus::Success, Some(listing)),
                    Err(err) => {
                        log::error!(
                            "Etsy upload for folder {} ({}) failed: {err:#}",
                            record.name,
                            record.id
                        );
                        Outcome::new(record, FolderStatus::Failed, None)
                    }
                },
                None => Outcome::new(record, FolderStatus::Success, None),
            };
            outcomes.push(outcome);
            items.push(ExportItem {
                product: drafted.product,
                images: drafted.ctx.image_files,
            });
        }

        let export_ok = if !self.options.export {
            log::info!("Export disabled, {} products not written", items.len());
            true
        } else if items.is_empty() {
            log::warn!("No product was processed successfully, nothing to export");
            true
        } else {
            report.exported = export_batch(&items, &self.options.export_dir)
                .log_error("Unable to export products");
            report.exported.is_some()
        };

        for outcome in outcomes {
            let Outcome {
                record,
                status,
                listing,
            } = outcome;
            let id = record.id.clone();
            let name = record.name.clone();
            // Without a listing the folder can be drafted again, keep it for the next run.
            if !export_ok && status == FolderStatus::Success && listing.is_none() {
                log::warn!("Folder {name} ({id}) stays pending until its product is exported");
                report.deferred.push(id);
                continue;
            }
            match self.finish(record, status, listing).await {
                Ok(()) if status == FolderStatus::Success => report.succeeded.push(id),
                Ok(()) => report.failed.push(id),
                Err(err) => {
                    log::error!("Unable to record status {status} for folder {name} ({id}): {err:#}");
                    report.failed.push(id);
                }
            }
        }
        log::info!(
            "Done: {} succeeded, {} failed, {} left pending",
            report.succeeded.len(),
            report.failed.len(),
            report.deferred.len()
        );
        Ok(report)
    }

    async fn draft_product(&self, record: &FolderRecord) -> Result<Drafted, anyhow::Error> {
        let meta = FolderMeta {
            id: record.id.clone(),
            name: record.name.clone(),
            created_time: record
                .extra
                .get(CREATED_TIME_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        let (ctx, main_image) = build_folder_context(
            &meta,
            self.drive.as_ref(),
            &self.options.temp_dir,
            self.options.naming_convention,
        )
        .await?;
        let draft = self.ai.request_draft(&ctx, &main_image).await?;
        save_ai_result(&self.options.ai_results_dir, &ctx.folder_id, &draft)
            .await
            .log_error("Unable to save AI result");
        let product = normalize_product(&draft, &ctx, self.options.default_taxonomy_id);
        log_product(&product);
        Ok(Drafted {
            product,
            ctx,
            main_image,
        })
    }

    async fn publish(
        &self,
        publisher: &dyn ListingPublisher,
        drafted: &Drafted,
    ) -> Result<Value, anyhow::Error> {
        let images = download_images(
            &drafted.ctx,
            &drafted.main_image,
            self.drive.as_ref(),
            &self.options.temp_dir,
            MAX_IMAGES,
        )
        .await
        .context("Unable to download listing images")?;
        publisher.publish(&drafted.product, &images).await
    }

    /// Overwrites the record, carrying over name, extra keys and earlier platform metadata.
    async fn finish(
        &self,
        record: FolderRecord,
        status: FolderStatus,
        listing: Option<Value>,
    ) -> Result<(), anyhow::Error> {
        let mut platforms = record.platforms.clone();
        if let Some(listing) = listing {
            platforms.insert(ETSY_PLATFORM.to_string(), listing);
        }
        log::debug!("Marking folder {} as {status}", record.id);
        self.state
            .save(FolderRecord {
                status,
                platforms,
                ..record
            })
            .await
    }
}

async fn save_ai_result(dir: &Path, folder_id: &str, draft: &Value) -> Result<PathBuf, anyhow::Error> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{folder_id}.json"));
    tokio::fs::write(&path, serde_json::to_string_pretty(draft)?).await?;
    log::debug!("AI result saved to {path:?}");
    Ok(path)
}

fn log_product(product: &ProductDraft) {
    log::info!(
        "Product {}: {:?}, {} {}, {} tags, {} materials",
        product.id,
        product.title,
        product.currency,
        product.price,
        product.tags.len(),
        product.materials.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder_context::tests::{file, temp_dir, FakeDrive};
    use crate::state::FileSystemStateRepository;
    use async_trait::async_trait;
    use botanical_types::Platforms;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use typesafe_repository::async_ops::{Get, List};
    use typesafe_repository::{IdentityOf, Repository};

    struct FakeAi;

    #[async_trait]
    impl DraftRequester for FakeAi {
        async fn request_draft(&self, ctx: &FolderContext, main_image: &Path) -> Result<Value, anyhow::Error> {
            assert!(main_image.exists());
            match ctx.folder_id.as_str() {
                "bad-json" => crate::ai::parse_draft("not json"),
                _ => Ok(json!({
                    "title": format!("{} piece", ctx.series),
                    "price": 0,
                    "tags": ["forest"],
                })),
            }
        }
    }

    struct FakePublisher {
        fail: bool,
        images: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ListingPublisher for FakePublisher {
        async fn publish(&self, _product: &ProductDraft, images: &[PathBuf]) -> Result<Value, anyhow::Error> {
            self.images.lock().unwrap().push(images.len());
            if self.fail {
                Err(anyhow::anyhow!("Etsy is down"))
            } else {
                Ok(crate::etsy::listing_metadata(77, images.len()))
            }
        }
    }

    /// File-backed state whose non-pending writes fail for one folder.
    struct FailingSave {
        inner: Arc<FileSystemStateRepository>,
        fail_id: &'static str,
    }

    impl Repository<FolderRecord> for FailingSave {
        type Error = anyhow::Error;
    }

    #[async_trait]
    impl Get<FolderRecord> for FailingSave {
        async fn get_one(
            &self,
            id: &IdentityOf<FolderRecord>,
        ) -> Result<Option<FolderRecord>, anyhow::Error> {
            self.inner.get_one(id).await
        }
    }

    #[async_trait]
    impl List<FolderRecord> for FailingSave {
        async fn list(&self) -> Result<Vec<FolderRecord>, anyhow::Error> {
            self.inner.list().await
        }
    }

    #[async_trait]
    impl Save<FolderRecord> for FailingSave {
        async fn save(&self, record: FolderRecord) -> Result<(), anyhow::Error> {
            if record.id == self.fail_id && record.status != FolderStatus::Pending {
                return Err(anyhow::anyhow!("disk full"));
            }
            self.inner.save(record).await
        }
    }

    #[async_trait]
    impl StateRepository for FailingSave {
        async fn processed_ids(&self) -> Result<HashSet<IdentityOf<FolderRecord>>, anyhow::Error> {
            self.inner.processed_ids().await
        }
    }

    fn drive() -> FakeDrive {
        let mut drive = FakeDrive::default();
        drive.files.insert(
            "good".to_string(),
            vec![file("i1", "a.jpg", "image/jpeg"), file("i2", "b.jpg", "image/jpeg")],
        );
        drive
            .files
            .insert("no-images".to_string(), vec![file("n1", "note.txt", "text/plain")]);
        drive
            .files
            .insert("bad-json".to_string(), vec![file("i3", "c.png", "image/png")]);
        drive
            .files
            .insert("more".to_string(), vec![file("i4", "d.jpg", "image/jpeg")]);
        drive
    }

    struct Setup {
        dir: PathBuf,
        state: Arc<FileSystemStateRepository>,
    }

    impl Setup {
        async fn new(ids: &[&str]) -> Self {
            let dir = temp_dir();
            let state = Arc::new(FileSystemStateRepository::open(dir.join("state.json")));
            for id in ids {
                state
                    .mark(id.to_string(), format!("earring-moss-{id}_25"), FolderStatus::Pending, Platforms::new())
                    .await
                    .unwrap();
            }
            Self { dir, state }
        }

        fn processor(&self, publisher: Option<Arc<dyn ListingPublisher>>) -> Processor {
            self.processor_with(self.state.clone(), publisher)
        }

        fn processor_with(
            &self,
            state: Arc<dyn StateRepository>,
            publisher: Option<Arc<dyn ListingPublisher>>,
        ) -> Processor {
            Processor::new(
                Arc::new(drive()),
                Arc::new(FakeAi),
                state,
                publisher,
                ProcessOptions {
                    temp_dir: self.dir.join("tmp"),
                    ai_results_dir: self.dir.join("ai_results"),
                    export_dir: self.dir.join("exports"),
                    naming_convention: NamingConvention::TypeMaterialsSeries,
                    default_taxonomy_id: 0,
                    export: true,
                },
            )
        }

        async fn status(&self, id: &str) -> FolderRecord {
            self.state.get_one(&id.to_string()).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let setup = Setup::new(&["no-images", "good", "bad-json"]).await;
        let report = setup.processor(None).process_pending().await.unwrap();

        assert_eq!(vec!["good"], report.succeeded);
        assert_eq!(vec!["no-images", "bad-json"], report.failed);
        assert_eq!(FolderStatus::Success, setup.status("good").await.status);
        assert_eq!(FolderStatus::Failed, setup.status("no-images").await.status);
        assert_eq!(FolderStatus::Failed, setup.status("bad-json").await.status);
        assert_eq!("earring-moss-no-images_25", setup.status("no-images").await.name);

        let saved: Value = serde_json::from_str(
            &std::fs::read_to_string(setup.dir.join("ai_results").join("good.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json!("good piece"), saved["title"]);

        let (csv_path, xlsx_path) = report.exported.unwrap();
        assert!(xlsx_path.exists());
        let bytes = std::fs::read(&csv_path).unwrap();
        let mut reader = csv::Reader::from_reader(&bytes[3..]);
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(1, rows.len());
        assert_eq!(Some("Good piece"), rows[0].get(0));
        assert_eq!(Some("25.0"), rows[0].get(2));

        let again = setup.processor(None).process_pending().await.unwrap();
        assert!(again.succeeded.is_empty() && again.failed.is_empty());
        std::fs::remove_dir_all(&setup.dir).unwrap();
    }

    #[tokio::test]
    async fn failed_upload_keeps_product_in_export() {
        let setup = Setup::new(&["good"]).await;
        let mut record = setup.status("good").await;
        record.platforms.insert("shopify".to_string(), json!({"id": "s1"}));
        setup.state.save(record).await.unwrap();

        let publisher = Arc::new(FakePublisher {
            fail: true,
            images: Mutex::new(vec![]),
        });
        let report = setup
            .processor(Some(publisher.clone()))
            .process_pending()
            .await
            .unwrap();

        assert_eq!(vec!["good"], report.failed);
        assert!(report.exported.is_some());
        let record = setup.status("good").await;
        assert_eq!(FolderStatus::Failed, record.status);
        assert_eq!(json!({"id": "s1"}), record.platforms["shopify"]);
        assert!(!record.platforms.contains_key(ETSY_PLATFORM));
        assert_eq!(vec![2], *publisher.images.lock().unwrap());
        std::fs::remove_dir_all(&setup.dir).unwrap();
    }

    #[tokio::test]
    async fn successful_upload_records_listing() {
        let setup = Setup::new(&["good"]).await;
        let publisher = Arc::new(FakePublisher {
            fail: false,
            images: Mutex::new(vec![]),
        });
        let report = setup
            .processor(Some(publisher))
            .process_pending()
            .await
            .unwrap();

        assert_eq!(vec!["good"], report.succeeded);
        let record = setup.status("good").await;
        assert_eq!(FolderStatus::Success, record.status);
        assert_eq!(json!(77), record.platforms[ETSY_PLATFORM]["listing_id"]);
        assert_eq!(json!("draft"), record.platforms[ETSY_PLATFORM]["status"]);
        std::fs::remove_dir_all(&setup.dir).unwrap();
    }

    #[tokio::test]
    async fn state_write_failure_does_not_stop_the_batch() {
        let setup = Setup::new(&["good", "more"]).await;
        let state = Arc::new(FailingSave {
            inner: setup.state.clone(),
            fail_id: "good",
        });
        let report = setup
            .processor_with(state, None)
            .process_pending()
            .await
            .unwrap();

        assert_eq!(vec!["more"], report.succeeded);
        assert_eq!(vec!["good"], report.failed);
        assert_eq!(FolderStatus::Pending, setup.status("good").await.status);
        assert_eq!(FolderStatus::Success, setup.status("more").await.status);

        let (csv_path, _) = report.exported.unwrap();
        let bytes = std::fs::read(&csv_path).unwrap();
        let mut reader = csv::Reader::from_reader(&bytes[3..]);
        assert_eq!(2, reader.records().count());
        std::fs::remove_dir_all(&setup.dir).unwrap();
    }

    #[tokio::test]
    async fn export_failure_leaves_drafted_folders_pending() {
        let setup = Setup::new(&["good", "no-images"]).await;
        std::fs::write(setup.dir.join("exports"), "not a directory").unwrap();

        let report = setup.processor(None).process_pending().await.unwrap();

        assert!(report.exported.is_none());
        assert!(report.succeeded.is_empty());
        assert_eq!(vec!["good"], report.deferred);
        assert_eq!(vec!["no-images"], report.failed);
        assert_eq!(FolderStatus::Pending, setup.status("good").await.status);
        assert_eq!(FolderStatus::Failed, setup.status("no-images").await.status);
        std::fs::remove_dir_all(&setup.dir).unwrap();
    }

    #[tokio::test]
    async fn published_folder_is_recorded_even_if_export_fails() {
        let setup = Setup::new(&["good"]).await;
        std::fs::write(setup.dir.join("exports"), "not a directory").unwrap();
        let publisher = Arc::new(FakePublisher {
            fail: false,
            images: Mutex::new(vec![]),
        });

        let report = setup
            .processor(Some(publisher))
            .process_pending()
            .await
            .unwrap();

        assert!(report.exported.is_none());
        assert_eq!(vec!["good"], report.succeeded);
        let record = setup.status("good").await;
        assert_eq!(FolderStatus::Success, record.status);
        assert_eq!(json!(77), record.platforms[ETSY_PLATFORM]["listing_id"]);
        std::fs::remove_dir_all(&setup.dir).unwrap();
    }
}
