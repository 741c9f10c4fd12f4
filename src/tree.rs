//! In-memory reconstruction of a remote folder tree.

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::backend::{DriveBackend, KindFilter};
use crate::error::Result;
use crate::lister::Lister;
use crate::models::Entry;

/// Outcome of listing part of a folder. Keeps "nothing there" apart from
/// "could not be listed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    Resolved(T),
    Failed(String),
}

impl<T> Listing<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Listing::Resolved(value) => Some(value),
            Listing::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Listing::Failed(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Listing::Resolved(_) => None,
            Listing::Failed(reason) => Some(reason),
        }
    }
}

impl<T> Listing<Vec<T>> {
    /// The listed items, or an empty slice when listing failed.
    pub fn items(&self) -> &[T] {
        match self {
            Listing::Resolved(items) => items,
            Listing::Failed(_) => &[],
        }
    }
}

impl<T> From<Result<T>> for Listing<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Listing::Resolved(value),
            Err(err) => Listing::Failed(err.to_string()),
        }
    }
}

/// A folder together with its direct files and subfolders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    pub files: Listing<Vec<Entry>>,
    pub children: Listing<Vec<FolderNode>>,
}

impl FolderNode {
    /// A node with no files and no subfolders.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            files: Listing::Resolved(Vec::new()),
            children: Listing::Resolved(Vec::new()),
        }
    }

    pub fn with_files(mut self, files: Vec<Entry>) -> Self {
        self.files = Listing::Resolved(files);
        self
    }

    pub fn with_children(mut self, children: Vec<FolderNode>) -> Self {
        self.children = Listing::Resolved(children);
        self
    }

    /// Number of folder nodes in this subtree, this one included.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .items()
            .iter()
            .map(FolderNode::node_count)
            .sum::<usize>()
    }

    /// Depth of this subtree; a leaf folder has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .items()
            .iter()
            .map(FolderNode::depth)
            .max()
            .unwrap_or(0)
    }

    /// True when every listing in this subtree succeeded.
    pub fn is_complete(&self) -> bool {
        !self.files.is_failed()
            && !self.children.is_failed()
            && self.children.items().iter().all(FolderNode::is_complete)
    }
}

/// Which folder a node's files are listed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileScope {
    /// The node's own folder.
    #[default]
    Folder,
    /// The folder being enumerated at that level, i.e. the node's parent.
    /// Every sibling then carries the parent's files. Kept so `report`
    /// output matches the old Python scripts. Replication still copies
    /// the files of leaf folders, which those scripts skipped.
    Parent,
}

/// Builds [`FolderNode`] trees with a [`Lister`].
pub struct TreeBuilder<'a, B: ?Sized> {
    lister: Lister<'a, B>,
    file_scope: FileScope,
}

impl<'a, B: DriveBackend + ?Sized> TreeBuilder<'a, B> {
    pub fn new(lister: Lister<'a, B>) -> Self {
        Self {
            lister,
            file_scope: FileScope::default(),
        }
    }

    pub fn with_file_scope(mut self, file_scope: FileScope) -> Self {
        self.file_scope = file_scope;
        self
    }

    /// All folders directly under `parent_id`, each populated with its
    /// files and, depth first, its nested folders.
    ///
    /// Fails only when the folders of `parent_id` itself cannot be listed.
    /// Failures deeper in the tree are recorded on the affected node.
    pub async fn build(&self, parent_id: &str) -> Result<Vec<FolderNode>> {
        self.build_level(parent_id).await
    }

    fn build_level<'s>(&'s self, parent_id: &'s str) -> BoxFuture<'s, Result<Vec<FolderNode>>> {
        async move {
            let folders = self
                .lister
                .list_children(parent_id, KindFilter::Folders)
                .await?;

            let mut nodes = Vec::with_capacity(folders.len());
            for folder in folders {
                let scope = match self.file_scope {
                    FileScope::Folder => folder.id.as_str(),
                    FileScope::Parent => parent_id,
                };
                let files = self.lister.list_children(scope, KindFilter::Files).await;
                if let Err(ref err) = files {
                    warn!(folder = %folder.id, error = %err, "failed to list files");
                }

                nodes.push(FolderNode {
                    id: folder.id,
                    name: folder.name,
                    files: files.into(),
                    children: Listing::Resolved(Vec::new()),
                });
            }

            for node in nodes.iter_mut() {
                let children = self.build_level(&node.id).await;
                if let Err(ref err) = children {
                    warn!(folder = %node.id, error = %err, "failed to list subfolders");
                }
                node.children = children.into();
            }

            debug!(parent = parent_id, folders = nodes.len(), "built level");
            Ok(nodes)
        }
        .boxed()
    }
}

/// Total number of folder nodes in a tree.
pub fn count_nodes(nodes: &[FolderNode]) -> usize {
    nodes.iter().map(FolderNode::node_count).sum()
}
