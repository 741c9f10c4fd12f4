//! drive_tree CLI - copy and count Google Drive folder trees.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drive_tree::auth::DEFAULT_TOKEN_FILE;
use drive_tree::lister::DEFAULT_PAGE_SIZE;
use drive_tree::{
    count_direct, extract_id, Authenticator, DriveClient, FileScope, Lister, NestedReport,
    Replicator, Scope, TreeBuilder,
};

/// Copy or count the folders and files under a Google Drive folder.
#[derive(Parser)]
#[command(name = "drive_tree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service account key or OAuth client secrets JSON file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Where the OAuth user token is stored between runs.
    #[arg(long, env = "DRIVE_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    token_file: PathBuf,

    /// Use this access token instead of a credentials file.
    #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Restrict listings to this Shared Drive.
    #[arg(long, env = "SHARED_DRIVE_ID")]
    drive_id: Option<String>,

    /// Entries requested per listing page (1-1000).
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recreate the folders under a source folder inside a destination
    /// folder, copying their files.
    Copy {
        /// Source folder URL or ID.
        source: String,

        /// Destination folder URL or ID.
        #[arg(long, short = 't')]
        to: String,

        /// List each folder's files from its parent, as the original
        /// scripts did.
        #[arg(long)]
        legacy_file_scope: bool,
    },

    /// Count the folders and files directly inside a folder.
    Count {
        /// Folder URL or ID.
        folder: String,
    },

    /// Report nested folder and file counts for each folder inside a folder.
    Report {
        /// Folder URL or ID.
        folder: String,

        /// List each folder's files from its parent, as the original
        /// scripts did.
        #[arg(long)]
        legacy_file_scope: bool,
    },
}

impl Commands {
    fn scope(&self) -> Scope {
        match self {
            Commands::Copy { .. } => Scope::Drive,
            Commands::Count { .. } | Commands::Report { .. } => Scope::DriveMetadataReadonly,
        }
    }
}

fn file_scope(legacy: bool) -> FileScope {
    if legacy {
        FileScope::Parent
    } else {
        FileScope::Folder
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run completed without partial failures.
async fn run(cli: Cli) -> Result<bool> {
    let auth = authenticator(&cli, cli.command.scope())?;

    let mut client = DriveClient::new(auth);
    if let Some(drive_id) = cli.drive_id {
        client = client.with_drive_id(drive_id);
    }
    let lister = Lister::new(&client).with_page_size(cli.page_size);

    match cli.command {
        Commands::Copy {
            source,
            to,
            legacy_file_scope,
        } => {
            let source_id = extract_id(&source)
                .with_context(|| format!("Invalid source folder URL or ID: {}", source))?;
            let destination_id = extract_id(&to)
                .with_context(|| format!("Invalid destination folder URL or ID: {}", to))?;

            let tree = TreeBuilder::new(lister)
                .with_file_scope(file_scope(legacy_file_scope))
                .build(&source_id)
                .await
                .with_context(|| format!("Failed to list folders in: {}", source_id))?;

            println!(
                "Copying {} folder(s) from {} to {}...",
                drive_tree::tree::count_nodes(&tree),
                source_id,
                destination_id
            );
            let report = Replicator::new(&client)
                .replicate(&tree, &destination_id)
                .await;
            print!("{}", report);
            Ok(report.is_complete())
        }

        Commands::Count { folder } => {
            let folder_id = extract_id(&folder)
                .with_context(|| format!("Invalid folder URL or ID: {}", folder))?;

            let count = count_direct(lister, &folder_id)
                .await
                .with_context(|| format!("Failed to count entries in: {}", folder_id))?;
            print!("{}", count);
            Ok(true)
        }

        Commands::Report {
            folder,
            legacy_file_scope,
        } => {
            let folder_id = extract_id(&folder)
                .with_context(|| format!("Invalid folder URL or ID: {}", folder))?;

            let tree = TreeBuilder::new(lister)
                .with_file_scope(file_scope(legacy_file_scope))
                .build(&folder_id)
                .await
                .with_context(|| format!("Failed to list folders in: {}", folder_id))?;

            let report = NestedReport::from_tree(&tree);
            print!("{}", report);
            Ok(report.is_complete())
        }
    }
}

fn authenticator(cli: &Cli, scope: Scope) -> Result<Authenticator> {
    if let Some(ref token) = cli.access_token {
        return Ok(Authenticator::from_access_token(token.clone()));
    }

    let path = cli
        .credentials
        .as_ref()
        .context("No credentials: pass --credentials or --access-token")?;
    let auth = Authenticator::from_file(path, scope)
        .with_context(|| format!("Failed to load credentials from {:?}", path))?;
    Ok(auth.with_token_file(cli.token_file.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_copy() {
        let cli = Cli::try_parse_from([
            "drive_tree",
            "--access-token",
            "tok",
            "copy",
            "src",
            "--to",
            "dst",
            "--legacy-file-scope",
        ])
        .unwrap();

        match cli.command {
            Commands::Copy {
                source,
                to,
                legacy_file_scope,
            } => {
                assert_eq!(source, "src");
                assert_eq!(to, "dst");
                assert!(legacy_file_scope);
            }
            _ => panic!("expected copy"),
        }
    }

    #[test]
    fn test_scopes_per_command() {
        let cli = Cli::try_parse_from(["drive_tree", "count", "abc"]).unwrap();
        assert_eq!(cli.command.scope(), Scope::DriveMetadataReadonly);
        assert_eq!(cli.page_size, DEFAULT_PAGE_SIZE);

        let cli = Cli::try_parse_from(["drive_tree", "copy", "a", "-t", "b"]).unwrap();
        assert_eq!(cli.command.scope(), Scope::Drive);
    }

    #[test]
    fn test_file_scope_flag() {
        assert_eq!(file_scope(false), FileScope::Folder);
        assert_eq!(file_scope(true), FileScope::Parent);
    }
}
