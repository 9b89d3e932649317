//! Paged queries across several user stores.
//!
//! Each store only understands offsets into its own result stream. The
//! merge engine presents the stores, in a fixed order, as one concatenated
//! stream and applies a single `(first, max)` window to it. Results keep
//! store order and each store's natural order; nothing is re-sorted.

use async_trait::async_trait;

use crate::error::FederationResult;

/// Window size meaning "no upper bound".
pub const UNLIMITED: usize = usize::MAX;

/// A store that can serve one page of a query.
#[async_trait]
pub trait PagedSource<T: Send>: Send + Sync {
    /// Reads up to `max` rows starting at the store-local offset `first`.
    ///
    /// Returning fewer than `max` rows means the store is exhausted.
    async fn page(&self, first: usize, max: usize) -> FederationResult<Vec<T>>;
}

/// Applies the global window `(first, max)` across `sources` in order.
///
/// Rows before `first` are skipped by reading at most `batch_size` rows per
/// call; a store that returns a short batch while skipping is exhausted and
/// the remaining skip carries over to the next store.
///
/// ## Errors
///
/// Returns the first error reported by a source.
pub async fn merge_window<T: Send>(
    sources: &[&dyn PagedSource<T>],
    first: usize,
    max: usize,
    batch_size: usize,
) -> FederationResult<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut results = Vec::new();
    let mut left_to_skip = first;
    let mut left_to_read = max;

    for source in sources {
        if left_to_read == 0 {
            break;
        }

        let mut index = 0;
        let mut exhausted = false;
        while left_to_skip > 0 {
            let to_read = batch_size.min(left_to_skip);
            let skipped = source.page(index, to_read).await?.len();
            left_to_skip -= skipped.min(left_to_skip);
            index += skipped;
            if skipped < to_read {
                exhausted = true;
                break;
            }
        }
        if exhausted {
            continue;
        }

        let page = source.page(index, left_to_read).await?;
        if left_to_read != UNLIMITED {
            left_to_read = left_to_read.saturating_sub(page.len());
        }
        results.extend(page);
    }

    Ok(results)
}
