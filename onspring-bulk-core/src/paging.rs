//! Pagination driver: drains a paged remote listing page by page.
//!
//! Pages are requested strictly in sequence because the total page count is
//! only known once the first page has answered. A missing page ends the
//! listing early and whatever was gathered so far is kept.

use std::future::Future;
use tracing::{debug, warn};

use crate::contract::TransportError;
use crate::model::{Page, PagingRequest};

/// Cursor over a paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingState {
    pub current_page: i32,
    /// 1 until the first response says otherwise.
    pub total_pages: i32,
}

impl Default for PagingState {
    fn default() -> Self {
        PagingState {
            current_page: 1,
            total_pages: 1,
        }
    }
}

impl PagingState {
    pub fn has_more(&self) -> bool {
        self.current_page <= self.total_pages
    }

    pub fn request(&self, page_size: i32) -> PagingRequest {
        PagingRequest {
            page_number: self.current_page,
            page_size,
        }
    }

    pub fn advance(&mut self, total_pages: i32) {
        self.total_pages = total_pages;
        self.current_page += 1;
    }
}

/// Requests pages until the listing is exhausted, handing each page's items
/// to `on_page` as it arrives. Returns the number of pages received.
pub async fn for_each_page<T, F, Fut, H>(
    label: &str,
    page_size: i32,
    mut fetch: F,
    mut on_page: H,
) -> Result<usize, TransportError>
where
    F: FnMut(PagingRequest) -> Fut,
    Fut: Future<Output = Result<Option<Page<T>>, TransportError>>,
    H: FnMut(Vec<T>),
{
    let mut state = PagingState::default();
    let mut received = 0;
    while state.has_more() {
        let paging = state.request(page_size);
        match fetch(paging).await? {
            Some(page) => {
                debug!(
                    label,
                    page = state.current_page,
                    total_pages = page.total_pages,
                    items = page.items.len(),
                    "[PAGING] Received page"
                );
                state.advance(page.total_pages);
                received += 1;
                on_page(page.items);
            }
            None => {
                warn!(
                    label,
                    page = state.current_page,
                    total_pages = state.total_pages,
                    "[PAGING] No page returned, stopping with partial results"
                );
                break;
            }
        }
    }
    Ok(received)
}

/// Drains every page into one collection.
pub async fn collect_pages<T, F, Fut>(
    label: &str,
    page_size: i32,
    fetch: F,
) -> Result<Vec<T>, TransportError>
where
    F: FnMut(PagingRequest) -> Fut,
    Fut: Future<Output = Result<Option<Page<T>>, TransportError>>,
{
    let mut items = Vec::new();
    for_each_page(label, page_size, fetch, |page| items.extend(page)).await?;
    Ok(items)
}
