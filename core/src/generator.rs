//! Offline bulk generator: walks a directory tree and fills the translation
//! database, resuming from whatever a previous run already translated.

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;

use crate::ai::{ProviderOutcome, TranslationProvider};
use crate::cache::{CachedTranslation, TranslationCache};
use crate::config::BatchConfig;
use crate::database::{DatabaseError, TranslationDatabase};
use crate::detector::{display_name, needs_translation, normalized_base_name};
use crate::listing::collect_files;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("failed to enumerate {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write translation database: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Drop entries for files that were not found under the input root.
    pub prune_missing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub total_files: usize,
    pub resumed: usize,
    pub skipped: usize,
    pub translated: usize,
    pub failed: usize,
    pub pruned: usize,
    pub batches: usize,
    pub rate_limit_retries: usize,
}

struct WorkItem {
    file_path: String,
    file_name: String,
    base_name: String,
}

pub struct BulkGenerator {
    provider: Arc<dyn TranslationProvider>,
    config: BatchConfig,
    target: String,
    cache: TranslationCache,
}

impl BulkGenerator {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        config: BatchConfig,
        target: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            config: config.normalized(),
            target: target.into(),
            cache: TranslationCache::new(),
        }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Translates every file under `input_root` that is not already current in
    /// the database at `output`, then writes the merged database back.
    pub async fn run(
        &self,
        input_root: &Path,
        output: &Path,
        options: GenerateOptions,
    ) -> Result<GenerationReport, GeneratorError> {
        let listing_error = |source| GeneratorError::Listing {
            path: input_root.to_string_lossy().into_owned(),
            source,
        };
        let root = dunce::canonicalize(input_root).map_err(listing_error)?;
        let files = collect_files(&root).map_err(listing_error)?;

        let mut database = TranslationDatabase::load(output);
        let mut report = GenerationReport {
            total_files: files.len(),
            ..GenerationReport::default()
        };
        let mut visited = HashSet::with_capacity(files.len());
        let mut work = Vec::new();

        for file in files {
            let file_path = path_key(&file.full_path);
            visited.insert(file_path.clone());

            if database.is_current(&file_path, &file.name) {
                report.resumed += 1;
                continue;
            }

            let base_name = normalized_base_name(&file.name);
            if !needs_translation(&base_name) {
                database.record_skipped(&file_path, &file.name);
                report.skipped += 1;
                continue;
            }

            database.mark_pending(&file_path, &file.name);
            work.push(WorkItem {
                file_path,
                file_name: file.name,
                base_name,
            });
        }

        if options.prune_missing {
            report.pruned = database.retain_paths(&visited);
            if report.pruned > 0 {
                info!("pruned {} entries for files no longer present", report.pruned);
            }
        }

        if work.is_empty() {
            info!(
                "nothing to translate under {} ({} files, {} already translated)",
                root.to_string_lossy(),
                report.total_files,
                report.resumed
            );
            database.save(output)?;
            return Ok(report);
        }

        let batch_size = self.config.batch_size;
        let total_batches = work.len().div_ceil(batch_size);
        info!(
            "translating {} of {} files in {} batches of up to {}",
            work.len(),
            report.total_files,
            total_batches,
            batch_size
        );

        for (index, batch) in work.chunks(batch_size).enumerate() {
            if index > 0 {
                sleep(self.config.batch_delay()).await;
            }
            self.translate_batch(batch, &mut database, &mut report).await;
            report.batches += 1;
            info!(
                "batch {}/{} done: {} translated, {} failed so far",
                index + 1,
                total_batches,
                report.translated,
                report.failed
            );
        }

        database.save(output)?;
        info!(
            "wrote {} entries to {} ({} translated, {} skipped, {} failed, {} resumed)",
            database.len(),
            output.to_string_lossy(),
            report.translated,
            report.skipped,
            report.failed,
            report.resumed
        );
        Ok(report)
    }

    /// Runs one batch to completion. Rate-limited names are retried in place
    /// after `rate_limit_delay` until they settle.
    async fn translate_batch(
        &self,
        batch: &[WorkItem],
        database: &mut TranslationDatabase,
        report: &mut GenerationReport,
    ) {
        let mut remaining: Vec<&WorkItem> = batch.iter().collect();

        loop {
            let mut uncached = Vec::new();
            for item in remaining {
                match self.cache.get(&item.base_name) {
                    Some(cached) => record(database, report, item, cached),
                    None => uncached.push(item),
                }
            }
            if uncached.is_empty() {
                return;
            }

            let mut names: Vec<&str> = Vec::new();
            for &item in &uncached {
                if !names.contains(&item.base_name.as_str()) {
                    names.push(&item.base_name);
                }
            }
            debug!("dispatching {} provider calls", names.len());
            let outcomes = join_all(
                names
                    .iter()
                    .map(|name| self.provider.translate_outcome(name, &self.target)),
            )
            .await;
            let outcomes: HashMap<&str, ProviderOutcome> =
                names.into_iter().zip(outcomes).collect();

            let mut limited = Vec::new();
            for item in uncached {
                match outcomes.get(item.base_name.as_str()) {
                    Some(ProviderOutcome::Translated(text)) => {
                        let cached = self.cache.insert_if_absent(
                            &item.base_name,
                            CachedTranslation::Translated(text.clone()),
                        );
                        record(database, report, item, cached);
                    }
                    Some(ProviderOutcome::NotApplicable) => {
                        let cached = self
                            .cache
                            .insert_if_absent(&item.base_name, CachedTranslation::NotTranslatable);
                        record(database, report, item, cached);
                    }
                    Some(ProviderOutcome::Failed(message)) => {
                        warn!("translation failed for {}: {}", item.file_path, message);
                        database.record_failed(&item.file_path, &item.file_name, message);
                        report.failed += 1;
                    }
                    Some(ProviderOutcome::RateLimited) | None => limited.push(item),
                }
            }

            if limited.is_empty() {
                return;
            }
            report.rate_limit_retries += 1;
            warn!(
                "rate limited on {} files, retrying in {} ms",
                limited.len(),
                self.config.rate_limit_delay_ms
            );
            sleep(self.config.rate_limit_delay()).await;
            remaining = limited;
        }
    }
}

/// Database key for a file. Paths that are not valid UTF-8 are stored
/// lossily, so two such paths can collide.
fn path_key(path: &Path) -> String {
    match path.to_str() {
        Some(key) => key.to_string(),
        None => {
            let key = path.to_string_lossy().into_owned();
            warn!("path is not valid UTF-8, storing it as {key}");
            key
        }
    }
}

fn record(
    database: &mut TranslationDatabase,
    report: &mut GenerationReport,
    item: &WorkItem,
    cached: CachedTranslation,
) {
    match cached {
        CachedTranslation::Translated(text) => {
            let name = display_name(&item.file_name, &text);
            database.record_translated(&item.file_path, &item.file_name, &name);
            report.translated += 1;
        }
        CachedTranslation::NotTranslatable => {
            database.record_skipped(&item.file_path, &item.file_name);
            report.skipped += 1;
        }
    }
}
