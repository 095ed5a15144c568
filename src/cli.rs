//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Download comic issues page by page and assemble them into PDFs.
///
/// Jobs are durable: an interrupted or partially failed download can be
/// retried, fetching only the pages that are still missing.
#[derive(Parser, Debug)]
#[command(name = "comicdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/comicdl/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for job folders
    #[arg(long, value_name = "DIR", global = true)]
    pub download_root: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Maximum concurrent page downloads (1-100)
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the catalog of comics, issues and pages
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Create, retry, list, delete and assemble download jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Add a comic
    AddComic(ComicArgs),
    /// Change fields of a comic
    UpdateComic {
        comic_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        date_published: Option<String>,
        #[arg(long)]
        writers: Option<String>,
        #[arg(long)]
        artists: Option<String>,
    },
    /// Add an issue to a comic
    AddIssue {
        comic_id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        link: String,
    },
    /// Store crawled pages for an issue (JSON array from a file or stdin)
    AddPages {
        issue_id: i64,
        /// JSON file with `[{"page_number": 1, "image_link": "..."}]`; stdin if omitted
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// List comics
    List,
    /// Search comics by title
    Search { query: String },
    /// Show one comic
    Show { comic_id: i64 },
    /// List the issues of a comic
    Issues { comic_id: i64 },
    /// List the pages of an issue
    Pages { issue_id: i64 },
    /// Delete a comic with its issues and pages
    Delete { comic_id: i64 },
}

#[derive(ClapArgs, Debug)]
pub struct ComicArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub link: String,
    #[arg(long)]
    pub date_published: Option<String>,
    #[arg(long, default_value = "")]
    pub writers: String,
    #[arg(long, default_value = "")]
    pub artists: String,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// Create a job for the given issues (in order) and download it
    Create {
        #[arg(required = true, num_args = 1..)]
        issue_ids: Vec<i64>,
        /// Job name (default: derived from the comic and issue titles)
        #[arg(long)]
        name: Option<String>,
    },
    /// Fetch the missing pages of a job and assemble it
    Retry { job_id: i64 },
    /// List jobs, split into incomplete and complete
    List,
    /// Delete a job and its files
    Delete { job_id: i64 },
    /// Delete every completed job and its files
    DeleteCompleted,
    /// Assemble the pages of a job that are on disk
    Assemble { job_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}
