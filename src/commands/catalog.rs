//! Catalog command handlers.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use comicdl_core::catalog::{Catalog, ComicUpdate, CrawledPage, NewComic, NewIssue};
use tracing::info;

use super::print_json;
use crate::cli::{CatalogCommand, ComicArgs};

pub async fn run_catalog_command(command: CatalogCommand, catalog: &Catalog) -> Result<()> {
    match command {
        CatalogCommand::AddComic(args) => {
            let comic = catalog.add_comic(&new_comic(args)).await?;
            print_json(&comic)
        }
        CatalogCommand::UpdateComic {
            comic_id,
            title,
            date_published,
            writers,
            artists,
        } => {
            let update = ComicUpdate {
                title,
                date_published,
                writers,
                artists,
            };
            print_json(&catalog.update_comic(comic_id, &update).await?)
        }
        CatalogCommand::AddIssue {
            comic_id,
            title,
            link,
        } => {
            let issue = catalog
                .add_issue(comic_id, &NewIssue { title, link })
                .await?;
            print_json(&issue)
        }
        CatalogCommand::AddPages { issue_id, file } => {
            let pages = read_crawled_pages(file.as_deref())?;
            let stored = catalog.add_pages(issue_id, &pages).await?;
            info!(issue_id, pages = stored.len(), "pages stored");
            print_json(&stored)
        }
        CatalogCommand::List => print_json(&catalog.list_comics().await?),
        CatalogCommand::Search { query } => print_json(&catalog.search_comics(&query).await?),
        CatalogCommand::Show { comic_id } => print_json(&catalog.get_comic(comic_id).await?),
        CatalogCommand::Issues { comic_id } => {
            print_json(&catalog.issues_for_comic(comic_id).await?)
        }
        CatalogCommand::Pages { issue_id } => {
            catalog.get_issue(issue_id).await?;
            print_json(&catalog.pages_for_issue(issue_id).await?)
        }
        CatalogCommand::Delete { comic_id } => {
            catalog.delete_comic(comic_id).await?;
            print_json(&serde_json::json!({ "deleted": comic_id }))
        }
    }
}

fn new_comic(args: ComicArgs) -> NewComic {
    NewComic {
        title: args.title,
        link: args.link,
        date_published: args.date_published,
        writers: args.writers,
        artists: args.artists,
    }
}

fn read_crawled_pages(file: Option<&Path>) -> Result<Vec<CrawledPage>> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pages file '{}'", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read pages from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&raw).context("Pages must be a JSON array of {page_number, image_link}")
}
