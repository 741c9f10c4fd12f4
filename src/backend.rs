//! The remote operations the tree walk depends on.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entry, FOLDER_MIME_TYPE};

/// Which kind of entry a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Files,
    Folders,
}

/// Whether trashed entries are left out of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashFilter {
    #[default]
    Exclude,
    Include,
}

/// A single listing request: entries of one kind directly under a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub parent_id: String,
    pub kind: KindFilter,
    pub trash: TrashFilter,
}

impl ListQuery {
    pub fn new(parent_id: impl Into<String>, kind: KindFilter, trash: TrashFilter) -> Self {
        Self {
            parent_id: parent_id.into(),
            kind,
            trash,
        }
    }

    /// Render as a Drive `q` expression.
    ///
    /// ```
    /// use drive_tree::backend::{KindFilter, ListQuery, TrashFilter};
    ///
    /// let q = ListQuery::new("abc", KindFilter::Folders, TrashFilter::Exclude);
    /// assert_eq!(
    ///     q.to_drive_query(),
    ///     "mimeType = 'application/vnd.google-apps.folder' and 'abc' in parents and trashed != true"
    /// );
    /// ```
    pub fn to_drive_query(&self) -> String {
        let op = match self.kind {
            KindFilter::Files => "!=",
            KindFilter::Folders => "=",
        };
        let mut query = format!(
            "mimeType {} '{}' and '{}' in parents",
            op,
            FOLDER_MIME_TYPE,
            escape_literal(&self.parent_id)
        );
        if self.trash == TrashFilter::Exclude {
            query.push_str(" and trashed != true");
        }
        query
    }
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub entries: Vec<Entry>,
    pub next_page_token: Option<String>,
}

/// Remote storage able to list, create folders and copy files.
#[async_trait]
pub trait DriveBackend: Send + Sync {
    /// Fetch one page of entries matching `query`.
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage>;

    /// Create a folder named `name` inside `parent_id`.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<Entry>;

    /// Copy the file `source_id` into `parent_id` under `name`.
    async fn copy_file(&self, source_id: &str, name: &str, parent_id: &str) -> Result<Entry>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_query_with_trash() {
        let q = ListQuery::new("p1", KindFilter::Files, TrashFilter::Include);
        assert_eq!(
            q.to_drive_query(),
            "mimeType != 'application/vnd.google-apps.folder' and 'p1' in parents"
        );
    }

    #[test]
    fn test_query_escapes_quotes() {
        let q = ListQuery::new("it's", KindFilter::Folders, TrashFilter::Exclude);
        assert!(q.to_drive_query().contains("'it\\'s' in parents"));
    }
}
