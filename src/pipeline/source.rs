//! Paginated source: a lazy walk over every page of a listing.
//!
//! Each call to [`PaginatedSource::items`] starts again from the first page;
//! nothing is cached between walks.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::model::RawItem;
use crate::remote::{Cursor, ListQuery, RemoteError, RemoteSource};

/// What to do when fetching a page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnListError {
    /// Surface the error; the listing is a precondition for any further work.
    Abort,

    /// Log it and stop, keeping the items gathered so far.
    /// Fatal errors (bad credential, no client) still abort.
    Truncate,
}

/// A listing query bound to a remote.
pub struct PaginatedSource<'a> {
    remote: &'a dyn RemoteSource,
    query: ListQuery,
    on_error: OnListError,
}

impl<'a> PaginatedSource<'a> {
    pub fn new(remote: &'a dyn RemoteSource, query: ListQuery, on_error: OnListError) -> Self {
        Self {
            remote,
            query,
            on_error,
        }
    }

    /// A fresh lazy walk from the first page.
    pub fn items(&self) -> Items<'_> {
        Items {
            source: self,
            buffer: VecDeque::new(),
            state: State::Start,
            pages: 0,
        }
    }

    /// Walk every page and collect the items.
    pub fn collect(&self) -> Result<Vec<RawItem>, RemoteError> {
        self.items().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Next(Cursor),
    Done,
}

/// Iterator over the items of every page, fetched on demand.
///
/// Yields at most one `Err`, after which it is exhausted.
pub struct Items<'s> {
    source: &'s PaginatedSource<'s>,
    buffer: VecDeque<RawItem>,
    state: State,
    pages: usize,
}

impl Items<'_> {
    /// Fetch pages until one has items or the listing ends.
    ///
    /// Empty pages that still carry a cursor are skipped, not treated as the end.
    fn fill(&mut self) -> Option<RemoteError> {
        while self.buffer.is_empty() {
            let cursor = match self.state {
                State::Start => None,
                State::Next(cursor) => Some(cursor),
                State::Done => return None,
            };

            let page = match self.source.remote.list(&self.source.query, cursor) {
                Ok(page) => page,
                Err(e) => {
                    self.state = State::Done;
                    if self.source.on_error == OnListError::Truncate && !e.is_fatal() {
                        warn!(
                            query = ?self.source.query,
                            pages = self.pages,
                            error = %e,
                            "listing stopped early; keeping partial results"
                        );
                        return None;
                    }
                    return Some(e);
                }
            };

            self.pages += 1;
            debug!(
                query = ?self.source.query,
                page = self.pages,
                items = page.items.len(),
                "fetched page"
            );

            self.state = match page.next {
                // A cursor that points back at the page just fetched would loop forever.
                Some(next) if Some(next) == cursor => {
                    warn!(query = ?self.source.query, "remote repeated a page cursor; stopping");
                    State::Done
                }
                Some(next) => State::Next(next),
                None => State::Done,
            };
            self.buffer.extend(page.items);
        }
        None
    }
}

impl Iterator for Items<'_> {
    type Item = Result<RawItem, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.fill() {
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
