use crate::classifier::{classify_all, ClassifyItem};
use crate::config::CollectorConfig;
use crate::fetcher::FetchFeed;
use crate::normalizer::{parse_channel, parse_item};
use crate::resolver::resolve_feed_url;
use crate::store::ItemRepository;
use crate::types::{CollectorError, FeedItem, PersistReport, Result, SourceDescriptor};
use tracing::{debug, error, info};

/// Counters reported once at the end of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub duplicates_skipped: usize,
    pub filtered_out: usize,
    pub persisted: PersistReport,
}

/// Drives one collection pass: resolve → fetch → normalize → dedup per
/// source, then classify and persist the accumulated set. A broken source
/// never aborts the run; the store connection failing to open is the only
/// fatal condition, and it is handled by whoever constructs the repository.
pub struct Collector<'a, F, C, R> {
    config: &'a CollectorConfig,
    fetcher: F,
    classifier: C,
    store: R,
}

impl<'a, F, C, R> Collector<'a, F, C, R>
where
    F: FetchFeed,
    C: ClassifyItem,
    R: ItemRepository,
{
    pub fn new(config: &'a CollectorConfig, fetcher: F, classifier: C, store: R) -> Self {
        Self {
            config,
            fetcher,
            classifier,
            store,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        info!(
            "starting feed collection across {} sources",
            self.config.sources.len()
        );

        let mut summary = RunSummary::default();
        let mut accumulated: Vec<FeedItem> = Vec::new();

        for source in &self.config.sources {
            match self.process_source(source, &mut accumulated, &mut summary).await {
                Ok(count) => {
                    summary.sources_processed += 1;
                    debug!("source {} contributed {} new items", source.url, count);
                }
                Err(err) => {
                    summary.sources_failed += 1;
                    match &err {
                        CollectorError::Fetch { .. }
                        | CollectorError::Parse { .. }
                        | CollectorError::Source { .. } => {
                            error!("skipping source: {}", err);
                        }
                        _ => error!("unexpected error processing source {}: {}", source.url, err),
                    }
                }
            }
        }

        if accumulated.is_empty() {
            info!("no new items to classify");
            return Ok(summary);
        }

        info!("classifying {} accumulated items", accumulated.len());
        let verdicts = classify_all(
            &self.classifier,
            accumulated,
            self.config.classifier.parallel,
        )
        .await;
        let total = verdicts.len();
        let relevant: Vec<FeedItem> = verdicts
            .into_iter()
            .filter(|verdict| verdict.relevant)
            .map(|verdict| verdict.item)
            .collect();
        summary.filtered_out = total - relevant.len();
        info!("filtered out {} irrelevant items", summary.filtered_out);

        if relevant.is_empty() {
            info!("no relevant items to persist");
            return Ok(summary);
        }

        summary.persisted = self.store.upsert_batch(&relevant).await?;

        info!(
            "collection finished: {} sources ok, {} failed, {} duplicates skipped, {} filtered out, {} rows persisted, {} rows failed",
            summary.sources_processed,
            summary.sources_failed,
            summary.duplicates_skipped,
            summary.filtered_out,
            summary.persisted.succeeded,
            summary.persisted.failed
        );
        Ok(summary)
    }

    /// Resolve, fetch and normalize one source, accumulating items whose
    /// link is not yet in the store. Every error escaping here is scoped to
    /// this single source.
    async fn process_source(
        &self,
        source: &SourceDescriptor,
        accumulated: &mut Vec<FeedItem>,
        summary: &mut RunSummary,
    ) -> Result<usize> {
        let feed_url = resolve_feed_url(&source.url, source.kind, &self.config.templates)?;
        let channel = self.fetcher.fetch(&feed_url).await?;
        let feed_channel = parse_channel(&channel);

        let mut added = 0;
        for raw_item in channel.items() {
            let Some(item) = parse_item(raw_item, source, &feed_channel) else {
                debug!("dropping item without link from {}", feed_url);
                continue;
            };

            if self.store.exists(&item.link).await? {
                summary.duplicates_skipped += 1;
                info!(
                    "already stored, skipping: {}",
                    item.title.as_deref().unwrap_or(&item.link)
                );
                continue;
            }

            accumulated.push(item);
            added += 1;
        }

        Ok(added)
    }
}
