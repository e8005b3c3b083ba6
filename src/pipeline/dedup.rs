use std::collections::HashSet;
use thiserror::Error;

use crate::episode::Episode;
use crate::store::{RecordStore, StoreError, StoreErrorKind};

#[derive(Debug, Error)]
pub enum DedupError {
    /// Building the identity index failed; nothing can be safely persisted.
    #[error("Failed to fetch existing episode ids ({kind}): {source}")]
    IndexFetch {
        kind: StoreErrorKind,
        #[source]
        source: StoreError,
    },
}

impl DedupError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            DedupError::IndexFetch { kind, .. } => *kind,
        }
    }
}

impl From<StoreError> for DedupError {
    fn from(source: StoreError) -> Self {
        DedupError::IndexFetch {
            kind: source.kind(),
            source,
        }
    }
}

/// Collects every episode id already in the store.
///
/// Follows `next_cursor` while the store reports more pages. Any page
/// failure aborts the whole scan: a partial index would let duplicates
/// through.
pub async fn fetch_existing_ids<S>(store: &S, page_size: u32) -> Result<HashSet<String>, DedupError>
where
    S: RecordStore + ?Sized,
{
    let mut ids = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.query_ids(page_size, cursor.as_deref()).await?;
        pages += 1;
        ids.extend(page.ids);

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(StoreError::Other(
                    "store reported more pages without a cursor".to_string(),
                )
                .into())
            }
        }
    }

    tracing::info!(existing = ids.len(), pages, "Fetched existing episode ids");
    Ok(ids)
}

/// Keeps the candidates whose id is not in `existing`, preserving order.
pub fn partition_new(candidates: Vec<Episode>, existing: &HashSet<String>) -> Vec<Episode> {
    candidates
        .into_iter()
        .filter(|episode| !existing.contains(&episode.id))
        .collect()
}

/// Fetches the identity index and filters `candidates` against it.
pub async fn resolve<S>(
    store: &S,
    candidates: Vec<Episode>,
    page_size: u32,
) -> Result<Vec<Episode>, DedupError>
where
    S: RecordStore + ?Sized,
{
    let existing = fetch_existing_ids(store, page_size).await?;
    let total = candidates.len();
    let new = partition_new(candidates, &existing);

    tracing::info!(
        candidates = total,
        new = new.len(),
        skipped = total - new.len(),
        "Dedup complete"
    );
    Ok(new)
}
