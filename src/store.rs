use crate::config::DatabaseConfig;
use crate::types::{FeedItem, PersistReport, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};
use tracing::{error, info};

/// Rows per upsert statement.
pub const BATCH_SIZE: usize = 100;

/// Column order of the persisted row. `link` carries the uniqueness
/// constraint that makes the upsert well-defined.
const COLUMNS: [&str; 15] = [
    "source",
    "title",
    "description",
    "link",
    "guid",
    "pub_date",
    "author",
    "category",
    "content",
    "image_url",
    "language",
    "channel_title",
    "channel_link",
    "channel_atom_link",
    "channel_description",
];

/// Seam between the orchestrator and the persisted store: the dedup lookup
/// and the batched upsert share one connection pool behind it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Point lookup by link, called once per candidate item before it joins
    /// the working set.
    async fn exists(&self, link: &str) -> Result<bool>;

    /// Upsert items in bounded batches; a failed batch is replayed row by
    /// row so one bad row cannot sink its neighbors.
    async fn upsert_batch(&self, items: &[FeedItem]) -> Result<PersistReport>;
}

pub struct PgItemStore {
    db: Pool<Postgres>,
    table: String,
}

impl PgItemStore {
    /// Open the store connection for a run. This is the only fatal failure
    /// point of the pipeline; the pool is released when the store is
    /// dropped at the end of the run.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db = PgPool::connect(&config.url).await?;
        Ok(Self {
            db,
            table: config.table.clone(),
        })
    }
}

/// How one statement reaches the store: a whole chunk inside a transaction,
/// or a single row on its own. Split out from the batching loop so the
/// fallback accounting can be driven without a live database.
#[async_trait]
trait UpsertExecutor: Sync {
    async fn execute_chunk(&self, batch: &[FeedItem]) -> Result<()>;
    async fn execute_row(&self, item: &FeedItem) -> Result<()>;
}

#[async_trait]
impl UpsertExecutor for PgItemStore {
    async fn execute_chunk(&self, batch: &[FeedItem]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        build_upsert(&self.table, batch)
            .build()
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn execute_row(&self, item: &FeedItem) -> Result<()> {
        build_upsert(&self.table, std::slice::from_ref(item))
            .build()
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Upsert in bounded chunks. A failed chunk is rolled back and replayed row
/// by row: each row failure is logged and counted, and never blocks the
/// rows after it. Totals accumulate across all chunks.
async fn persist_in_batches<E: UpsertExecutor>(
    executor: &E,
    items: &[FeedItem],
) -> PersistReport {
    let mut report = PersistReport::default();

    for batch in items.chunks(BATCH_SIZE) {
        match executor.execute_chunk(batch).await {
            Ok(()) => report.succeeded += batch.len(),
            Err(e) => {
                error!(
                    "batch upsert of {} rows failed, retrying row by row: {}",
                    batch.len(),
                    e
                );
                for item in batch {
                    match executor.execute_row(item).await {
                        Ok(()) => report.succeeded += 1,
                        Err(e) => {
                            report.failed += 1;
                            error!(
                                "row upsert failed for *{}* ({}): {}",
                                item.title.as_deref().unwrap_or("untitled"),
                                item.link,
                                e
                            );
                        }
                    }
                }
            }
        }
    }

    report
}

/// Multi-row `INSERT ... ON CONFLICT (link) DO UPDATE`: new links insert,
/// known links get every non-key column overwritten (last write wins).
fn build_upsert<'a>(table: &str, batch: &'a [FeedItem]) -> QueryBuilder<'a, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        table,
        COLUMNS.join(", ")
    ));

    query.push_values(batch, |mut row, item| {
        row.push_bind(&item.source)
            .push_bind(&item.title)
            .push_bind(&item.description)
            .push_bind(&item.link)
            .push_bind(&item.guid)
            .push_bind(&item.pub_date)
            .push_bind(&item.author)
            .push_bind(&item.category)
            .push_bind(&item.content)
            .push_bind(&item.image_url)
            .push_bind(&item.language)
            .push_bind(&item.channel_title)
            .push_bind(&item.channel_link)
            .push_bind(&item.channel_atom_link)
            .push_bind(&item.channel_description);
    });

    query.push(" ON CONFLICT (link) DO UPDATE SET ");
    let updates = COLUMNS
        .iter()
        .filter(|column| **column != "link")
        .map(|column| format!("{} = EXCLUDED.{}", column, column))
        .collect::<Vec<_>>()
        .join(", ");
    query.push(updates);

    query
}

#[async_trait]
impl ItemRepository for PgItemStore {
    async fn exists(&self, link: &str) -> Result<bool> {
        let query = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE link = $1)",
            self.table
        );
        let exists: bool = sqlx::query_scalar(&query)
            .bind(link)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    async fn upsert_batch(&self, items: &[FeedItem]) -> Result<PersistReport> {
        let report = persist_in_batches(self, items).await;
        info!(
            "persisted feed items: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        Ok(report)
    }
}
