//! Cursor-following page collection
//!
//! Every provider "list" endpoint returns one page of items plus an opaque
//! continuation cursor. This module owns the accumulation loop shared by the
//! message, thread, and draft listings: request pages until the cursor runs
//! out or the requested maximum is reached.

use std::future::Future;

use crate::errors::AppResult;

/// Largest page size the provider accepts per list call
pub const PROVIDER_PAGE_CAP: usize = 500;

/// One page returned by a provider list endpoint
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in provider order
    pub items: Vec<T>,
    /// Continuation cursor, absent on the final page
    pub next_cursor: Option<String>,
}

/// Accumulated result of a cursor-following run
#[derive(Debug, Clone)]
pub struct Listing<T> {
    /// All collected items, truncated to the requested maximum
    pub items: Vec<T>,
    /// Cursor left over when the run stopped at the maximum before the
    /// provider ran out of data; `None` when the data was exhausted
    pub next_cursor: Option<String>,
}

/// Follow continuation cursors until done
///
/// Calls `fetch(cursor, page_size)` repeatedly, starting from
/// `initial_cursor`. The per-call page size is the provider cap, or the
/// remaining item budget when `requested_max` is set. Accumulation stops when
/// the provider returns no cursor or the budget is met; overshoot on the
/// final page is truncated so the result holds exactly
/// `min(total, requested_max)` items in page order. `requested_max = None`
/// disables the stop condition and collects everything.
///
/// # Errors
///
/// A provider failure aborts the loop immediately and propagates; partial
/// results are never returned silently.
pub async fn collect_pages<T, F, Fut>(
    requested_max: Option<usize>,
    initial_cursor: Option<String>,
    mut fetch: F,
) -> AppResult<Listing<T>>
where
    F: FnMut(Option<String>, usize) -> Fut,
    Fut: Future<Output = AppResult<Page<T>>>,
{
    if requested_max == Some(0) {
        return Ok(Listing {
            items: Vec::new(),
            next_cursor: initial_cursor,
        });
    }

    let mut items: Vec<T> = Vec::new();
    let mut cursor = initial_cursor;

    loop {
        let page_size = match requested_max {
            Some(max) => PROVIDER_PAGE_CAP.min(max.saturating_sub(items.len())),
            None => PROVIDER_PAGE_CAP,
        };

        let page = fetch(cursor.take(), page_size).await?;
        items.extend(page.items);
        cursor = page.next_cursor;

        if cursor.is_none() || requested_max.is_some_and(|max| items.len() >= max) {
            break;
        }
    }

    if let Some(max) = requested_max {
        items.truncate(max);
    }

    Ok(Listing {
        items,
        next_cursor: cursor,
    })
}
