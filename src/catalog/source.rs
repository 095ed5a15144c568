//! Seam through which download jobs resolve issues to pages.

use async_trait::async_trait;

use super::{Catalog, CatalogError, IssuePages, Result};

/// Resolves an issue id to the issue, its comic's title and its pages.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Loads an issue with its pages in page-number order.
    ///
    /// Returns [`CatalogError::IssueNotFound`] for an unknown id.
    async fn issue_with_pages(&self, issue_id: i64) -> Result<IssuePages>;
}

#[async_trait]
impl IssueSource for Catalog {
    async fn issue_with_pages(&self, issue_id: i64) -> Result<IssuePages> {
        let issue = self.get_issue(issue_id).await?;
        let comic = self.get_comic(issue.comic_id).await.map_err(|e| match e {
            CatalogError::ComicNotFound(_) => CatalogError::IssueNotFound(issue_id),
            other => other,
        })?;
        let pages = self.pages_for_issue(issue_id).await?;

        Ok(IssuePages {
            issue,
            comic_title: comic.title,
            pages,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{CrawledPage, NewComic, NewIssue};
    use crate::db::Database;

    #[tokio::test]
    async fn test_issue_with_pages_resolves_comic_title_and_pages() {
        let catalog = Catalog::new(Database::new_in_memory().await.unwrap());
        let comic = catalog
            .add_comic(&NewComic {
                title: "Saga".to_string(),
                link: "https://x/saga".to_string(),
                ..NewComic::default()
            })
            .await
            .unwrap();
        let issue = catalog
            .add_issue(
                comic.id,
                &NewIssue {
                    title: "Issue #1".to_string(),
                    link: "https://x/saga/1".to_string(),
                },
            )
            .await
            .unwrap();
        catalog
            .add_pages(
                issue.id,
                &[CrawledPage {
                    page_number: 1,
                    image_link: "https://cdn/1.jpg".to_string(),
                    title: None,
                }],
            )
            .await
            .unwrap();

        let source: &dyn IssueSource = &catalog;
        let resolved = source.issue_with_pages(issue.id).await.unwrap();

        assert_eq!(resolved.comic_title, "Saga");
        assert_eq!(resolved.issue.title, "Issue #1");
        assert_eq!(resolved.pages.len(), 1);
        assert!(source.issue_with_pages(999).await.unwrap_err().is_not_found());
    }
}
