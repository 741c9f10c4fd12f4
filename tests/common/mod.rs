//! In-memory Drive used by the tree tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use drive_tree::backend::{DriveBackend, FilePage, KindFilter, ListQuery, TrashFilter};
use drive_tree::{DriveError, Entry, EntryKind, Result};

#[derive(Debug, Clone)]
struct Stored {
    entry: Entry,
    parent: String,
    trashed: bool,
}

#[derive(Default)]
struct State {
    entries: Vec<Stored>,
    next_id: usize,
    list_calls: Vec<(String, KindFilter, Option<String>)>,
    failing_parents: HashSet<String>,
    failing_names: HashSet<String>,
}

/// Flat store of entries with parent links. Page tokens are offsets.
#[derive(Default)]
pub struct MemoryDrive {
    state: Mutex<State>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, parent: &str, name: &str, kind: EntryKind, trashed: bool) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("id{}", state.next_id);
        state.entries.push(Stored {
            entry: Entry::new(id.clone(), name, kind),
            parent: parent.to_string(),
            trashed,
        });
        id
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, EntryKind::Folder, false)
    }

    pub fn add_file(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, EntryKind::File, false)
    }

    pub fn add_trashed_file(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, EntryKind::File, true)
    }

    /// Make every listing under `parent` fail.
    pub fn fail_listing(&self, parent: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_parents
            .insert(parent.to_string());
    }

    /// Make creating a folder or copying a file with this name fail.
    pub fn fail_name(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_names
            .insert(name.to_string());
    }

    /// Live (untrashed) entries directly under `parent`.
    pub fn children(&self, parent: &str) -> Vec<Entry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|s| s.parent == parent && !s.trashed)
            .map(|s| s.entry.clone())
            .collect()
    }

    pub fn list_calls(&self) -> Vec<(String, KindFilter, Option<String>)> {
        self.state.lock().unwrap().list_calls.clone()
    }

    fn api_error(message: &str) -> DriveError {
        DriveError::ApiError {
            status: 500,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl DriveBackend for MemoryDrive {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push((
            query.parent_id.clone(),
            query.kind,
            page_token.map(str::to_string),
        ));

        if state.failing_parents.contains(&query.parent_id) {
            return Err(Self::api_error("listing failed"));
        }

        let wanted = match query.kind {
            KindFilter::Files => EntryKind::File,
            KindFilter::Folders => EntryKind::Folder,
        };
        let matching: Vec<Entry> = state
            .entries
            .iter()
            .filter(|s| s.parent == query.parent_id && s.entry.kind == wanted)
            .filter(|s| query.trash == TrashFilter::Include || !s.trashed)
            .map(|s| s.entry.clone())
            .collect();

        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (offset + page_size as usize).min(matching.len());
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(FilePage {
            entries: matching[offset..end].to_vec(),
            next_page_token,
        })
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<Entry> {
        if self.state.lock().unwrap().failing_names.contains(name) {
            return Err(Self::api_error("create failed"));
        }
        let id = self.add_folder(parent_id, name);
        Ok(Entry::folder(id, name))
    }

    async fn copy_file(&self, source_id: &str, name: &str, parent_id: &str) -> Result<Entry> {
        {
            let state = self.state.lock().unwrap();
            if state.failing_names.contains(name) {
                return Err(Self::api_error("copy failed"));
            }
            if !state.entries.iter().any(|s| s.entry.id == source_id) {
                return Err(DriveError::ApiError {
                    status: 404,
                    message: format!("File not found: {}", source_id),
                });
            }
        }
        let id = self.add_file(parent_id, name);
        Ok(Entry::file(id, name))
    }
}
