//! drive_tree - walk, copy and count Google Drive folder trees.
//!
//! This library provides functionality to:
//! - Build an in-memory tree of the folders and files under a folder
//! - Recreate that tree under another folder, copying every file
//! - Count folders and files, directly under a folder or per branch
//!
//! # Example
//!
//! ```no_run
//! use drive_tree::{Authenticator, DriveClient, Lister, NestedReport, Scope, TreeBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_file("client_secret.json", Scope::DriveMetadataReadonly)?;
//!     let client = DriveClient::new(auth);
//!
//!     let tree = TreeBuilder::new(Lister::new(&client)).build("folder-id").await?;
//!     print!("{}", NestedReport::from_tree(&tree));
//!
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod auth;
pub mod backend;
pub mod client;
pub mod consent;
pub mod error;
pub mod lister;
pub mod models;
pub mod replicate;
pub mod tree;
pub mod url_parser;

// Re-exports for convenience
pub use aggregate::{count_direct, count_nested, FlatCount, NestedCount, NestedReport};
pub use auth::{Authenticator, Scope};
pub use backend::{DriveBackend, KindFilter, ListQuery, TrashFilter};
pub use client::DriveClient;
pub use error::{DriveError, Result};
pub use lister::Lister;
pub use models::{Entry, EntryKind};
pub use replicate::{ReplicationReport, Replicator};
pub use tree::{FileScope, FolderNode, Listing, TreeBuilder};
pub use url_parser::extract_id;
