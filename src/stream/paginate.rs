use std::iter::FusedIterator;

use tracing::debug;

use crate::source::Connection;
use crate::types::{AccessError, PageWindow, Query, Result, Row};

/// Lazily walks a query one page at a time.
///
/// Created by [`paginate`]. Iterating yields rows; [`next_page`](Self::next_page)
/// yields whole pages. Either way a new window is fetched only once the rows
/// of the previous one have all been handed out, and paging stops after the
/// first short or empty page.
pub struct LazyPaginator<'c, C: Connection> {
    conn: &'c mut C,
    query: Query,
    page_size: usize,
    offset: usize,
    windows_issued: usize,
    buffer: std::vec::IntoIter<Row>,
    exhausted: bool,
}

/// Pages through `query` on `conn` with windows of `page_size` rows.
///
/// `query` must not carry its own `LIMIT`/`OFFSET`; the driver appends the
/// window. Nothing is fetched until the paginator is first advanced.
pub fn paginate<C: Connection>(
    conn: &mut C,
    query: Query,
    page_size: usize,
) -> Result<LazyPaginator<'_, C>> {
    if page_size == 0 {
        return Err(AccessError::InvalidArgument("page_size must be at least 1"));
    }
    Ok(LazyPaginator {
        conn,
        query,
        page_size,
        offset: 0,
        windows_issued: 0,
        buffer: Vec::new().into_iter(),
        exhausted: false,
    })
}

impl<C: Connection> LazyPaginator<'_, C> {
    /// Number of windows fetched so far.
    pub fn windows_issued(&self) -> usize {
        self.windows_issued
    }

    /// Offset of the next window.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the next non-empty page, or `None` once paging is done.
    ///
    /// Rows of the current page not yet consumed through the iterator are
    /// returned first, as a page of their own.
    pub fn next_page(&mut self) -> Result<Option<Vec<Row>>> {
        let pending: Vec<Row> = self.buffer.by_ref().collect();
        if !pending.is_empty() {
            return Ok(Some(pending));
        }
        if self.exhausted {
            return Ok(None);
        }
        let window = PageWindow {
            page_size: self.page_size,
            offset: self.offset,
        };
        let page = match self.conn.fetch_page(&self.query, window) {
            Ok(page) => page,
            Err(err) => {
                self.exhausted = true;
                return Err(err);
            }
        };
        self.windows_issued += 1;
        self.offset += self.page_size;
        debug!(
            offset = window.offset,
            page_size = window.page_size,
            rows = page.len(),
            "page fetched"
        );
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        Ok(if page.is_empty() { None } else { Some(page) })
    }
}

impl<C: Connection> Iterator for LazyPaginator<'_, C> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(Ok(row));
            }
            match self.next_page() {
                Ok(Some(page)) => self.buffer = page.into_iter(),
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<C: Connection> FusedIterator for LazyPaginator<'_, C> {}
