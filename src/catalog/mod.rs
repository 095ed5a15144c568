//! Catalog of comics, issues and page images.
//!
//! The catalog is what download jobs are built from: an issue id resolves to
//! the issue's pages through the [`IssueSource`] seam.
//!
//! # Overview
//!
//! - [`Catalog`] - `SQLite`-backed store
//! - [`Comic`], [`Issue`], [`Page`] - persisted records
//! - [`NewComic`], [`NewIssue`], [`ComicUpdate`], [`CrawledPage`] - inputs
//! - [`CatalogError`] - operation error types

mod error;
mod model;
mod source;

pub use error::CatalogError;
pub use model::{Comic, ComicUpdate, CrawledPage, Issue, IssuePages, NewComic, NewIssue, Page};
pub use source::IssueSource;

use tracing::{info, instrument};

use crate::db::Database;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

const COMIC_COLUMNS: &str =
    "id, title, date_published, link, writers, artists, number_issues, last_updated";
const ISSUE_COLUMNS: &str = "id, comic_id, title, link, pages";
const PAGE_COLUMNS: &str = "id, issue_id, page_number, title, image_link";

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(CatalogError::EmptyField { field })
    } else {
        Ok(())
    }
}

/// Escapes `LIKE` wildcards so a search fragment matches literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Catalog store backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Creates a catalog on top of an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds a comic.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyField`] when the title or link is blank,
    /// and [`CatalogError::Database`] (constraint violation) when the link is
    /// already cataloged.
    #[instrument(skip(self, comic), fields(title = %comic.title, link = %comic.link))]
    pub async fn add_comic(&self, comic: &NewComic) -> Result<Comic> {
        require("title", &comic.title)?;
        require("link", &comic.link)?;

        let created = sqlx::query_as::<_, Comic>(&format!(
            "INSERT INTO comics (title, date_published, link, writers, artists)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {COMIC_COLUMNS}"
        ))
        .bind(comic.title.trim())
        .bind(&comic.date_published)
        .bind(comic.link.trim())
        .bind(&comic.writers)
        .bind(&comic.artists)
        .fetch_one(self.db.pool())
        .await?;

        info!(comic_id = created.id, "comic added");
        Ok(created)
    }

    /// Loads a comic.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ComicNotFound`] if no comic has this id.
    #[instrument(skip(self))]
    pub async fn get_comic(&self, comic_id: i64) -> Result<Comic> {
        sqlx::query_as::<_, Comic>(&format!(
            "SELECT {COMIC_COLUMNS} FROM comics WHERE id = ?"
        ))
        .bind(comic_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(CatalogError::ComicNotFound(comic_id))
    }

    /// All comics ordered by title.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_comics(&self) -> Result<Vec<Comic>> {
        let comics = sqlx::query_as::<_, Comic>(&format!(
            "SELECT {COMIC_COLUMNS} FROM comics ORDER BY title COLLATE NOCASE ASC, id ASC"
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(comics)
    }

    /// Comics whose title contains `fragment`, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn search_comics(&self, fragment: &str) -> Result<Vec<Comic>> {
        let comics = sqlx::query_as::<_, Comic>(&format!(
            r"SELECT {COMIC_COLUMNS} FROM comics
              WHERE title LIKE '%' || ? || '%' ESCAPE '\'
              ORDER BY title COLLATE NOCASE ASC, id ASC"
        ))
        .bind(escape_like(fragment.trim()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(comics)
    }

    /// Applies a partial update to a comic and returns the new record.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ComicNotFound`] if no comic has this id, and
    /// [`CatalogError::EmptyField`] when a new title is blank.
    #[instrument(skip(self, update))]
    pub async fn update_comic(&self, comic_id: i64, update: &ComicUpdate) -> Result<Comic> {
        if let Some(title) = &update.title {
            require("title", title)?;
        }

        sqlx::query_as::<_, Comic>(&format!(
            "UPDATE comics
             SET title = COALESCE(?, title),
                 date_published = COALESCE(?, date_published),
                 writers = COALESCE(?, writers),
                 artists = COALESCE(?, artists),
                 last_updated = datetime('now')
             WHERE id = ?
             RETURNING {COMIC_COLUMNS}"
        ))
        .bind(update.title.as_deref().map(str::trim))
        .bind(&update.date_published)
        .bind(&update.writers)
        .bind(&update.artists)
        .bind(comic_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(CatalogError::ComicNotFound(comic_id))
    }

    /// Deletes a comic with its issues and pages.
    ///
    /// Download jobs built from those pages keep their steps.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ComicNotFound`] if no comic has this id.
    #[instrument(skip(self))]
    pub async fn delete_comic(&self, comic_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM comics WHERE id = ?")
            .bind(comic_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::ComicNotFound(comic_id));
        }
        info!(comic_id, "comic deleted");
        Ok(())
    }

    /// Adds an issue to a comic and bumps the comic's issue count.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ComicNotFound`] if no comic has this id,
    /// [`CatalogError::EmptyField`] when the link is blank, and
    /// [`CatalogError::Database`] when the link is already cataloged.
    #[instrument(skip(self, issue), fields(link = %issue.link))]
    pub async fn add_issue(&self, comic_id: i64, issue: &NewIssue) -> Result<Issue> {
        require("link", &issue.link)?;

        let mut tx = self.db.pool().begin().await?;

        let bumped = sqlx::query(
            r"UPDATE comics
              SET number_issues = number_issues + 1, last_updated = datetime('now')
              WHERE id = ?",
        )
        .bind(comic_id)
        .execute(&mut *tx)
        .await?;
        if bumped.rows_affected() == 0 {
            return Err(CatalogError::ComicNotFound(comic_id));
        }

        let created = sqlx::query_as::<_, Issue>(&format!(
            "INSERT INTO issues (comic_id, title, link, pages)
             VALUES (?, ?, ?, 0)
             RETURNING {ISSUE_COLUMNS}"
        ))
        .bind(comic_id)
        .bind(issue.title.trim())
        .bind(issue.link.trim())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(comic_id, issue_id = created.id, "issue added");
        Ok(created)
    }

    /// Loads an issue.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::IssueNotFound`] if no issue has this id.
    #[instrument(skip(self))]
    pub async fn get_issue(&self, issue_id: i64) -> Result<Issue> {
        sqlx::query_as::<_, Issue>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?"
        ))
        .bind(issue_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(CatalogError::IssueNotFound(issue_id))
    }

    /// Issues of a comic in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ComicNotFound`] if no comic has this id.
    #[instrument(skip(self))]
    pub async fn issues_for_comic(&self, comic_id: i64) -> Result<Vec<Issue>> {
        self.get_comic(comic_id).await?;

        let issues = sqlx::query_as::<_, Issue>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE comic_id = ? ORDER BY id ASC"
        ))
        .bind(comic_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(issues)
    }

    /// Persists crawler output for an issue.
    ///
    /// A page whose number is already cataloged for the issue is replaced in
    /// place, keeping its id. The issue's page count is recomputed. Returns all
    /// pages of the issue in page-number order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::IssueNotFound`] if no issue has this id,
    /// [`CatalogError::EmptyField`] for a blank image link, and
    /// [`CatalogError::Database`] when an image link belongs to another page.
    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    pub async fn add_pages(&self, issue_id: i64, pages: &[CrawledPage]) -> Result<Vec<Page>> {
        for page in pages {
            require("image_link", &page.image_link)?;
        }

        let mut tx = self.db.pool().begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM issues WHERE id = ?")
            .bind(issue_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(CatalogError::IssueNotFound(issue_id));
        }

        for page in pages {
            sqlx::query(
                r"INSERT INTO pages (issue_id, page_number, title, image_link)
                  VALUES (?, ?, ?, ?)
                  ON CONFLICT (issue_id, page_number)
                  DO UPDATE SET title = excluded.title, image_link = excluded.image_link",
            )
            .bind(issue_id)
            .bind(page.page_number)
            .bind(page.title_or_default())
            .bind(page.image_link.trim())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"UPDATE issues
              SET pages = (SELECT COUNT(*) FROM pages WHERE issue_id = issues.id)
              WHERE id = ?",
        )
        .bind(issue_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(issue_id, "issue pages stored");
        self.pages_for_issue(issue_id).await
    }

    /// Pages of an issue in page-number order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn pages_for_issue(&self, issue_id: i64) -> Result<Vec<Page>> {
        let pages = sqlx::query_as::<_, Page>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE issue_id = ? ORDER BY page_number ASC"
        ))
        .bind(issue_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(pages)
    }
}
