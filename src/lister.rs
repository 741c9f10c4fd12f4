//! Paginated listing of a folder's direct children.

use tracing::trace;

use crate::backend::{DriveBackend, KindFilter, ListQuery, TrashFilter};
use crate::error::Result;
use crate::models::Entry;

/// Page size used unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page size the Drive API accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Lists every entry of one kind under a parent, following continuation
/// tokens until the listing is exhausted.
pub struct Lister<'a, B: ?Sized> {
    backend: &'a B,
    page_size: u32,
    trash: TrashFilter,
}

impl<B: ?Sized> Clone for Lister<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ?Sized> Copy for Lister<'_, B> {}

impl<'a, B: DriveBackend + ?Sized> Lister<'a, B> {
    /// Lister excluding trashed entries, with the default page size.
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            page_size: DEFAULT_PAGE_SIZE,
            trash: TrashFilter::Exclude,
        }
    }

    /// Set the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_trash_filter(mut self, trash: TrashFilter) -> Self {
        self.trash = trash;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn trash_filter(&self) -> TrashFilter {
        self.trash
    }

    /// All entries of `kind` directly under `parent_id`, in page order.
    pub async fn list_children(&self, parent_id: &str, kind: KindFilter) -> Result<Vec<Entry>> {
        let query = ListQuery::new(parent_id, kind, self.trash);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .backend
                .list_page(&query, self.page_size, page_token.as_deref())
                .await?;
            entries.extend(page.entries);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        trace!(parent = parent_id, ?kind, count = entries.len(), "listed children");
        Ok(entries)
    }
}
