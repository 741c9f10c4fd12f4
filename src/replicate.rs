//! Recreating a folder tree under another parent.

use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use tracing::{info, warn};

use crate::backend::DriveBackend;
use crate::tree::FolderNode;

/// The remote step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFolder,
    CopyFile,
    /// The source folder's subfolders were never listed.
    ListFolders,
    /// The source folder's files were never listed.
    ListFiles,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::CreateFolder => "create folder",
            Operation::CopyFile => "copy file",
            Operation::ListFolders => "list folders",
            Operation::ListFiles => "list files",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationFailure {
    /// Slash-separated source path of the affected folder or file.
    pub path: String,
    pub operation: Operation,
    pub reason: String,
}

/// What a replication run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    pub folders_created: usize,
    pub files_copied: usize,
    pub failures: Vec<ReplicationFailure>,
}

impl ReplicationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, path: String, operation: Operation, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%path, %operation, %reason, "replication step failed");
        self.failures.push(ReplicationFailure {
            path,
            operation,
            reason,
        });
    }
}

impl fmt::Display for ReplicationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Folders created: {}", self.folders_created)?;
        writeln!(f, "Files copied: {}", self.files_copied)?;
        if !self.failures.is_empty() {
            writeln!(f, "Failures: {}", self.failures.len())?;
            for failure in &self.failures {
                writeln!(
                    f,
                    "  {} ({}): {}",
                    failure.path, failure.operation, failure.reason
                )?;
            }
        }
        Ok(())
    }
}

/// Creates a copy of a built tree through a [`DriveBackend`].
///
/// Nothing is checked for existence first: replicating twice into the same
/// destination yields two copies.
pub struct Replicator<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: DriveBackend + ?Sized> Replicator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Recreate `nodes` under `destination_id`. A failed folder creation
    /// skips that subtree; siblings continue.
    pub async fn replicate(&self, nodes: &[FolderNode], destination_id: &str) -> ReplicationReport {
        let mut report = ReplicationReport::default();
        self.replicate_level(nodes, destination_id, "", &mut report)
            .await;
        report
    }

    fn replicate_level<'s>(
        &'s self,
        nodes: &'s [FolderNode],
        destination_id: &'s str,
        parent_path: &'s str,
        report: &'s mut ReplicationReport,
    ) -> BoxFuture<'s, ()> {
        async move {
            for node in nodes {
                let path = format!("{}/{}", parent_path, node.name);

                let created = match self.backend.create_folder(&node.name, destination_id).await {
                    Ok(created) => created,
                    Err(err) => {
                        report.record(path, Operation::CreateFolder, err.to_string());
                        continue;
                    }
                };
                report.folders_created += 1;
                info!(%path, id = %created.id, "created folder");

                if let Some(reason) = node.children.failure() {
                    report.record(path.clone(), Operation::ListFolders, reason);
                }
                self.replicate_level(node.children.items(), &created.id, &path, report)
                    .await;

                if let Some(reason) = node.files.failure() {
                    report.record(path.clone(), Operation::ListFiles, reason);
                }
                for file in node.files.items() {
                    let file_path = format!("{}/{}", path, file.name);
                    match self
                        .backend
                        .copy_file(&file.id, &file.name, &created.id)
                        .await
                    {
                        Ok(_) => report.files_copied += 1,
                        Err(err) => report.record(file_path, Operation::CopyFile, err.to_string()),
                    }
                }
            }
        }
        .boxed()
    }
}
