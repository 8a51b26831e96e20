// src/pipeline/cursor.rs

//! Pagination shared by every paginated source.
//!
//! A listing is walked page by page until the API stops returning a
//! continuation token or the item cap is reached, whichever comes first.
//! Pages are requested strictly in sequence since each token comes from the
//! previous response.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{AppError, Result};
use crate::sources::FetchParams;

/// One page returned by a listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// Continuation token plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    next_token: Option<String>,
    items_seen: usize,
    cap: usize,
    pages: usize,
}

impl PageCursor {
    pub fn new(cap: usize) -> Self {
        Self {
            next_token: None,
            items_seen: 0,
            cap,
            pages: 0,
        }
    }

    /// Token for the next request; `None` before the first page.
    pub fn token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    pub fn items_seen(&self) -> usize {
        self.items_seen
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Items still allowed under the cap.
    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.items_seen)
    }

    pub fn is_terminal(&self) -> bool {
        self.items_seen >= self.cap || (self.pages > 0 && self.next_token.is_none())
    }

    /// Record a fetched page. An empty page ends the listing.
    pub fn advance(&mut self, next_token: Option<String>, items_on_page: usize) {
        self.pages += 1;
        self.items_seen += items_on_page;
        self.next_token = if items_on_page == 0 {
            None
        } else {
            next_token.filter(|t| !t.is_empty())
        };
    }
}

/// Lazily walk a listing, yielding items as pages arrive.
///
/// `fetch_page` receives the continuation token (`None` for the first page).
/// Every page request races cancellation and the deadline; a page that has
/// already arrived is delivered in full.
pub fn paginate<'a, T, F, Fut>(
    source_id: &'a str,
    params: &'a FetchParams,
    cap: usize,
    fetch_page: F,
) -> BoxStream<'a, Result<T>>
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    stream::try_unfold(
        (PageCursor::new(cap), fetch_page),
        move |(mut cursor, mut fetch_page)| async move {
            if cursor.is_terminal() {
                log::debug!(
                    "[{}] listing done after {} pages, {} items",
                    source_id,
                    cursor.pages(),
                    cursor.items_seen()
                );
                return Ok::<_, AppError>(None);
            }
            let mut page = params
                .guard(source_id, fetch_page(cursor.token().map(str::to_string)))
                .await??;
            page.items.truncate(cursor.remaining());
            cursor.advance(page.next_token, page.items.len());

            let items = stream::iter(page.items.into_iter().map(Ok::<T, AppError>));
            Ok(Some((items, (cursor, fetch_page))))
        },
    )
    .try_flatten()
    .boxed()
}
