//! Folder and file counts, flat or per branch.

use std::fmt;

use crate::backend::{DriveBackend, KindFilter, TrashFilter};
use crate::error::Result;
use crate::lister::Lister;
use crate::tree::FolderNode;

/// Direct children of one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlatCount {
    pub folders: usize,
    pub files: usize,
}

impl fmt::Display for FlatCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Folders: {}", self.folders)?;
        writeln!(f, "Files: {}", self.files)?;
        writeln!(f)
    }
}

/// Count the folders and files directly under `parent_id`.
///
/// Trashed entries are counted too, whatever the lister's trash filter,
/// matching the long-standing output of this count.
pub async fn count_direct<B: DriveBackend + ?Sized>(
    lister: Lister<'_, B>,
    parent_id: &str,
) -> Result<FlatCount> {
    let lister = lister.with_trash_filter(TrashFilter::Include);
    let files = lister.list_children(parent_id, KindFilter::Files).await?;
    let folders = lister.list_children(parent_id, KindFilter::Folders).await?;

    Ok(FlatCount {
        folders: folders.len(),
        files: files.len(),
    })
}

/// Totals for everything below a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NestedCount {
    pub folders: usize,
    pub files: usize,
    /// Some listing in the subtree failed, so the counts are a lower bound.
    pub incomplete: bool,
}

/// Count the folders nested below `node` and the files held by `node` and
/// every nested folder. `node` itself is not counted as a folder.
pub fn count_nested(node: &FolderNode) -> NestedCount {
    let mut count = NestedCount {
        incomplete: node.files.is_failed() || node.children.is_failed(),
        ..NestedCount::default()
    };

    for child in node.children.items() {
        let nested = count_nested(child);
        count.folders += 1 + nested.folders;
        count.files += nested.files;
        count.incomplete |= nested.incomplete;
    }
    count.files += node.files.items().len();
    count
}

/// Counts for one top-level folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSummary {
    pub id: String,
    pub name: String,
    pub folder_count: usize,
    pub file_count: usize,
    pub incomplete: bool,
}

/// Per-branch counts for every top-level folder plus a grand total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedReport {
    pub branches: Vec<BranchSummary>,
    /// Top-level folders plus all folders nested below them.
    pub total_nested_folders: usize,
}

impl NestedReport {
    pub fn from_tree(roots: &[FolderNode]) -> Self {
        let branches: Vec<BranchSummary> = roots
            .iter()
            .map(|root| {
                let count = count_nested(root);
                BranchSummary {
                    id: root.id.clone(),
                    name: root.name.clone(),
                    folder_count: count.folders,
                    file_count: count.files,
                    incomplete: count.incomplete,
                }
            })
            .collect();

        let total_nested_folders =
            branches.len() + branches.iter().map(|b| b.folder_count).sum::<usize>();

        Self {
            branches,
            total_nested_folders,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.branches.iter().all(|b| !b.incomplete)
    }
}

impl fmt::Display for NestedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for branch in &self.branches {
            writeln!(f)?;
            writeln!(f, "Folder ID: {}", branch.id)?;
            writeln!(f, "Folder Name: {}", branch.name)?;
            writeln!(f, "Nested Folder Count: {}", branch.folder_count)?;
            writeln!(f, "Nested File Count: {}", branch.file_count)?;
            if branch.incomplete {
                writeln!(f, "(incomplete: some listings failed)")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Total Nested Folders: {}", self.total_nested_folders)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;
    use crate::tree::Listing;

    fn files(prefix: &str, n: usize) -> Vec<Entry> {
        (0..n)
            .map(|i| Entry::file(format!("{}-{}", prefix, i), format!("{}-{}.txt", prefix, i)))
            .collect()
    }

    fn f1() -> FolderNode {
        FolderNode::new("f1", "F1")
            .with_files(files("f1", 3))
            .with_children(vec![
                FolderNode::new("f1.1", "F1.1").with_files(files("f1.1", 5)),
                FolderNode::new("f1.2", "F1.2"),
            ])
    }

    #[test]
    fn test_count_nested_synthetic_tree() {
        let count = count_nested(&f1());
        assert_eq!(count.folders, 2);
        assert_eq!(count.files, 8);
        assert!(!count.incomplete);
    }

    #[test]
    fn test_count_nested_leaf() {
        let leaf = FolderNode::new("x", "X").with_files(files("x", 4));
        assert_eq!(
            count_nested(&leaf),
            NestedCount {
                folders: 0,
                files: 4,
                incomplete: false
            }
        );
    }

    #[test]
    fn test_count_nested_deep_chain() {
        let tree = FolderNode::new("a", "A").with_children(vec![FolderNode::new("b", "B")
            .with_files(files("b", 1))
            .with_children(vec![FolderNode::new("c", "C").with_files(files("c", 2))])]);
        let count = count_nested(&tree);
        assert_eq!(count.folders, 2);
        assert_eq!(count.files, 3);
    }

    #[test]
    fn test_failed_branch_is_flagged() {
        let mut tree = f1();
        if let Listing::Resolved(children) = &mut tree.children {
            children[0].children = Listing::Failed("403".to_string());
        }
        let count = count_nested(&tree);
        assert!(count.incomplete);
        assert_eq!(count.folders, 2);
    }

    #[test]
    fn test_report_totals() {
        let report = NestedReport::from_tree(&[f1(), FolderNode::new("g", "G")]);
        assert_eq!(report.branches.len(), 2);
        assert_eq!(report.branches[0].folder_count, 2);
        assert_eq!(report.branches[0].file_count, 8);
        assert_eq!(report.branches[1].folder_count, 0);
        // two roots plus two nested under F1
        assert_eq!(report.total_nested_folders, 4);
        assert!(report.is_complete());
    }

    #[test]
    fn test_report_display() {
        let text = NestedReport::from_tree(&[f1()]).to_string();
        assert!(text.contains("Folder ID: f1\n"));
        assert!(text.contains("Folder Name: F1\n"));
        assert!(text.contains("Nested Folder Count: 2\n"));
        assert!(text.contains("Nested File Count: 8\n"));
        assert!(text.contains("Total Nested Folders: 3\n"));
        assert!(!text.contains("incomplete"));
    }

    #[test]
    fn test_empty_report() {
        let report = NestedReport::from_tree(&[]);
        assert_eq!(report.total_nested_folders, 0);
        assert!(report.to_string().contains("Total Nested Folders: 0"));
    }

    #[test]
    fn test_flat_count_display() {
        let text = FlatCount { folders: 2, files: 4 }.to_string();
        assert_eq!(text, "\nFolders: 2\nFiles: 4\n\n");
    }
}
