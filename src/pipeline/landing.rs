// src/pipeline/landing.rs

//! Landing area processing.
//!
//! One pass lists the landing folder, and for each matching file:
//!
//! 1. reads and parses it into raw records;
//! 2. normalizes each record and hands it to a [`RecordOperation`];
//! 3. stages failed records in an [`ErrorSidecar`];
//! 4. persists the sidecar (if any) to the error folder;
//! 5. moves the file to `<processed>/<name>.done`, whether or not records
//!    failed.
//!
//! A file that cannot be read or parsed, or whose sidecar or move fails, is
//! left in the landing folder for the next run. Other files are unaffected.
//!
//! The pass assumes it is the only one running against the area: there is
//! no claim marker, so two concurrent passes may pick up the same file.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{AreaPaths, BatchResult, LandingFile, NormalizedRecord, file_name, normalize};
use crate::pipeline::parse::parse_file;
use crate::pipeline::sidecar::ErrorSidecar;
use crate::storage::{FileStore, join_key};

/// Suffix appended to files moved out of the landing folder.
pub const DONE_SUFFIX: &str = ".done";

/// One unit of work applied to each record of a landing file.
#[async_trait]
pub trait RecordOperation: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Reject a file before any of its records are applied. An error here
    /// leaves the file in the landing folder.
    fn check_file(&self, _file: &LandingFile) -> Result<()> {
        Ok(())
    }

    /// Apply the operation to one record. An error marks the record failed.
    async fn apply(&self, file: &LandingFile, record: &NormalizedRecord) -> Result<()>;
}

/// How one file left the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Processed { records: usize, failed: usize, sidecar: bool },
    Skipped { failed: usize },
}

/// Drives passes over one landing area.
pub struct LandingPipeline {
    store: Arc<dyn FileStore>,
    paths: AreaPaths,
}

impl LandingPipeline {
    pub fn new(store: Arc<dyn FileStore>, paths: AreaPaths) -> Self {
        Self { store, paths }
    }

    pub fn paths(&self) -> &AreaPaths {
        &self.paths
    }

    /// Whether a listed key belongs to this area's input.
    fn matches(&self, key: &str) -> bool {
        let name = file_name(key);
        let suffix = self.paths.area.format().suffix();
        if !name.ends_with(suffix) {
            return false;
        }
        match &self.paths.name_prefix {
            Some(prefix) => name.starts_with(prefix.as_str()),
            None => true,
        }
    }

    /// List the files waiting in the landing folder.
    pub async fn discover(&self) -> Result<Vec<LandingFile>> {
        let format = self.paths.area.format();
        let keys = self.store.list(&self.paths.landing).await?;
        let files: Vec<LandingFile> = keys
            .into_iter()
            .filter(|key| self.matches(key))
            .map(|key| LandingFile::new(key, format))
            .collect();
        debug!(
            "Found {} {} file(s) in {}",
            files.len(),
            self.paths.area,
            self.paths.landing
        );
        Ok(files)
    }

    /// Run one pass over the landing area.
    ///
    /// Only a failure to list the landing folder is returned as an error;
    /// per-file and per-record failures are counted in the result.
    pub async fn run(&self, operation: &dyn RecordOperation) -> Result<BatchResult> {
        let mut result = BatchResult::new(self.paths.area);
        let files = self.discover().await?;

        if files.is_empty() {
            info!("No {} files waiting in {}", self.paths.area, self.paths.landing);
        }

        for file in &files {
            info!("Processing {} with {}", file.key, operation.name());
            match self.process_file(file, operation).await {
                FileOutcome::Processed {
                    records,
                    failed,
                    sidecar,
                } => {
                    result.files_processed += 1;
                    result.records_processed += records;
                    result.records_failed += failed;
                    if sidecar {
                        result.sidecars_written += 1;
                    }
                }
                FileOutcome::Skipped { failed } => {
                    result.files_skipped += 1;
                    result.records_failed += failed;
                }
            }
        }

        result.finished_at = Utc::now();
        info!(
            "{} pass complete: {} file(s) processed, {} skipped, {}/{} record(s) failed",
            self.paths.area,
            result.files_processed,
            result.files_skipped,
            result.records_failed,
            result.records_processed
        );
        Ok(result)
    }

    async fn process_file(&self, file: &LandingFile, operation: &dyn RecordOperation) -> FileOutcome {
        let bytes = match self.store.read(&file.key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Cannot read {}: {}. Leaving it for the next run.", file.key, e);
                return FileOutcome::Skipped { failed: 0 };
            }
        };

        let parsed = match parse_file(file, &bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("{}. Leaving {} for the next run.", e, file.key);
                return FileOutcome::Skipped { failed: 0 };
            }
        };

        if let Err(e) = operation.check_file(file) {
            error!("Rejected {}: {}. Leaving it for the next run.", file.key, e);
            return FileOutcome::Skipped { failed: 0 };
        }

        let mut sidecar: Option<ErrorSidecar> = None;
        for (index, raw) in parsed.records.iter().enumerate() {
            let record = normalize(raw);
            match operation.apply(file, &record).await {
                Ok(()) => info!("  {} record {}: ok", file.name, index + 1),
                Err(e) => {
                    warn!("  {} record {}: failed: {}", file.name, index + 1, e);
                    sidecar
                        .get_or_insert_with(|| ErrorSidecar::new(file, &parsed.columns))
                        .push(raw, e.to_string());
                }
            }
        }

        let records = parsed.records.len();
        let failed = sidecar.as_ref().map_or(0, ErrorSidecar::len);

        if let Some(sidecar) = &sidecar {
            if let Err(e) = self.persist_sidecar(sidecar).await {
                error!(
                    "Cannot write error sidecar for {}: {}. Leaving it for the next run.",
                    file.key, e
                );
                return FileOutcome::Skipped { failed };
            }
        }

        let done_key = join_key(
            &self.paths.processed,
            &format!("{}{}", file.name, DONE_SUFFIX),
        );
        if let Err(e) = self.store.move_to(&file.key, &done_key).await {
            error!("Cannot move {} to {}: {}", file.key, done_key, e);
            return FileOutcome::Skipped { failed };
        }

        if failed > 0 {
            warn!(
                "{}: {} of {} record(s) failed, moved to {}",
                file.name, failed, records, done_key
            );
        } else {
            info!("{}: {} record(s) applied, moved to {}", file.name, records, done_key);
        }

        FileOutcome::Processed {
            records,
            failed,
            sidecar: sidecar.is_some(),
        }
    }

    async fn persist_sidecar(&self, sidecar: &ErrorSidecar) -> Result<()> {
        let key = sidecar.key(&self.paths.error);
        let bytes = sidecar.render()?;
        if self.store.read_optional(&key).await?.is_some() {
            debug!("Replacing sidecar {} left by an earlier file of the same name", key);
        }
        self.store.write(&key, &bytes).await?;
        info!("Wrote {} failed record(s) to {}", sidecar.len(), key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Area, AreasConfig};
    use crate::storage::LocalStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails every record whose `owner` field equals `fail`.
    struct FailOnOwner {
        seen: Mutex<Vec<String>>,
    }

    impl FailOnOwner {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordOperation for FailOnOwner {
        fn name(&self) -> &str {
            "fail-on-owner"
        }

        async fn apply(&self, file: &LandingFile, record: &NormalizedRecord) -> Result<()> {
            let owner = record.get_str("owner").unwrap_or_default();
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", file.name, owner));
            if owner == "fail" {
                Err(AppError::service("catalog", "simulated failure"))
            } else {
                Ok(())
            }
        }
    }

    fn setup(area: Area) -> (TempDir, Arc<LocalStore>, LandingPipeline) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let paths = AreasConfig::default().paths(area);
        let pipeline = LandingPipeline::new(store.clone(), paths);
        (tmp, store, pipeline)
    }

    #[tokio::test]
    async fn test_partial_failure_scenario() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store
            .write(
                "tags/landing/ds1.tbl1.tmplA.eu.csv",
                b"column,owner\nid,alice\nname,fail\n",
            )
            .await
            .unwrap();

        let result = pipeline.run(&FailOnOwner::new()).await.unwrap();

        assert_eq!(result.files_processed, 1);
        assert_eq!(result.records_processed, 2);
        assert_eq!(result.records_failed, 1);
        assert_eq!(result.sidecars_written, 1);

        assert!(store.list("tags/landing").await.unwrap().is_empty());
        assert!(store
            .read_optional("tags/processed/ds1.tbl1.tmplA.eu.csv.done")
            .await
            .unwrap()
            .is_some());

        let sidecar = store
            .read("tags/error/error_ds1.tbl1.tmplA.eu.csv")
            .await
            .unwrap();
        let text = String::from_utf8(sidecar).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "column,owner,error_reason");
        assert!(lines[1].starts_with("name,fail,"));
    }

    #[tokio::test]
    async fn test_redropped_file_replaces_sidecar() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store
            .write("tags/landing/owners.csv", b"owner\nfail\nalice\n")
            .await
            .unwrap();
        pipeline.run(&FailOnOwner::new()).await.unwrap();

        store
            .write("tags/landing/owners.csv", b"owner\nbob\nfail\nfail\n")
            .await
            .unwrap();
        let result = pipeline.run(&FailOnOwner::new()).await.unwrap();

        assert_eq!(result.files_processed, 1);
        assert_eq!(result.records_failed, 2);
        assert_eq!(
            store.list("tags/error").await.unwrap(),
            vec!["tags/error/error_owners.csv"]
        );
        let sidecar = store.read("tags/error/error_owners.csv").await.unwrap();
        let text = String::from_utf8(sidecar).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().skip(1).all(|l| l.starts_with("fail,")));
    }

    #[tokio::test]
    async fn test_sidecars_only_for_failing_files() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store.write("tags/landing/a.csv", b"owner\nalice\nbob\n").await.unwrap();
        store.write("tags/landing/b.csv", b"owner\nfail\ncarol\n").await.unwrap();
        store.write("tags/landing/c.csv", b"owner\ndave\n").await.unwrap();

        let result = pipeline.run(&FailOnOwner::new()).await.unwrap();

        assert_eq!(result.files_processed, 3);
        assert_eq!(result.records_failed, 1);
        assert!(store.list("tags/landing").await.unwrap().is_empty());
        assert_eq!(
            store.list("tags/error").await.unwrap(),
            vec!["tags/error/error_b.csv"]
        );
        assert_eq!(store.list("tags/processed").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store.write("tags/landing/a.csv", b"owner\nalice\n").await.unwrap();

        let op = FailOnOwner::new();
        pipeline.run(&op).await.unwrap();
        let again = pipeline.run(&op).await.unwrap();

        assert!(again.is_empty());
        assert_eq!(again.records_processed, 0);
        assert_eq!(op.seen.lock().unwrap().len(), 1);
        assert_eq!(store.list("tags/processed").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_file_left_in_landing() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store.write("tags/landing/bad.csv", b"a,b\n1,2,3\n").await.unwrap();
        store.write("tags/landing/good.csv", b"owner\nalice\n").await.unwrap();

        let result = pipeline.run(&FailOnOwner::new()).await.unwrap();

        assert_eq!(result.files_processed, 1);
        assert_eq!(result.files_skipped, 1);
        assert_eq!(
            store.list("tags/landing").await.unwrap(),
            vec!["tags/landing/bad.csv"]
        );
        assert!(store.list("tags/error").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suffix_and_prefix_filter() {
        let (_tmp, store, pipeline) = setup(Area::Templates);
        store
            .write("templates/landing/template_a.json", br#"{"owner": "x"}"#)
            .await
            .unwrap();
        store
            .write("templates/landing/other.json", br#"{"owner": "x"}"#)
            .await
            .unwrap();
        store
            .write("templates/landing/template_b.csv", b"owner\nx\n")
            .await
            .unwrap();

        let files = pipeline.discover().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "template_a.json");
    }

    #[tokio::test]
    async fn test_json_array_records_and_sidecar() {
        let (_tmp, store, pipeline) = setup(Area::Dlp);
        store
            .write(
                "dlp/landing/scan.json",
                br#"[{"owner": "ok"}, {"owner": "fail"}, {"owner": "fail"}]"#,
            )
            .await
            .unwrap();

        let result = pipeline.run(&FailOnOwner::new()).await.unwrap();
        assert_eq!(result.records_failed, 2);

        let bytes = store.read("dlp/error/error_scan.json").await.unwrap();
        let items: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(items.len(), 2);
        assert!(store
            .read_optional("dlp/processed/scan.json.done")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_records_applied_in_file_order() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store
            .write("tags/landing/a.csv", b"owner\nfirst\nsecond\nthird\n")
            .await
            .unwrap();

        let op = FailOnOwner::new();
        pipeline.run(&op).await.unwrap();
        assert_eq!(
            *op.seen.lock().unwrap(),
            vec!["a.csv:first", "a.csv:second", "a.csv:third"]
        );
    }

    struct RejectAll;

    #[async_trait]
    impl RecordOperation for RejectAll {
        fn name(&self) -> &str {
            "reject-all"
        }

        fn check_file(&self, file: &LandingFile) -> Result<()> {
            Err(AppError::validation(format!("bad name {}", file.name)))
        }

        async fn apply(&self, _file: &LandingFile, _record: &NormalizedRecord) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rejected_file_stays() {
        let (_tmp, store, pipeline) = setup(Area::Tags);
        store.write("tags/landing/a.csv", b"owner\nx\n").await.unwrap();

        let result = pipeline.run(&RejectAll).await.unwrap();
        assert_eq!(result.files_skipped, 1);
        assert_eq!(store.list("tags/landing").await.unwrap().len(), 1);
    }
}
