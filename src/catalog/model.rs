//! Catalog records and the inputs used to create or change them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A comic series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Comic {
    /// Unique identifier.
    pub id: i64,
    /// Series title.
    pub title: String,
    /// Publication date as published by the source, if known.
    pub date_published: Option<String>,
    /// Source page of the series. Unique.
    pub link: String,
    /// Writers, free text.
    pub writers: String,
    /// Artists, free text.
    pub artists: String,
    /// Issues cataloged for this comic.
    pub number_issues: i64,
    /// Last time the record changed.
    pub last_updated: String,
}

impl fmt::Display for Comic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} issues)", self.title, self.number_issues)
    }
}

/// Fields for a new comic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewComic {
    /// Series title. Required.
    pub title: String,
    /// Source page. Required and unique.
    pub link: String,
    /// Publication date.
    #[serde(default)]
    pub date_published: Option<String>,
    /// Writers.
    #[serde(default)]
    pub writers: String,
    /// Artists.
    #[serde(default)]
    pub artists: String,
}

/// Partial update of a comic. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicUpdate {
    pub title: Option<String>,
    pub date_published: Option<String>,
    pub writers: Option<String>,
    pub artists: Option<String>,
}

/// One issue of a comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Issue {
    /// Unique identifier.
    pub id: i64,
    /// Owning comic.
    pub comic_id: i64,
    /// Issue title.
    pub title: String,
    /// Source page of the issue. Unique.
    pub link: String,
    /// Number of cataloged pages.
    pub pages: i64,
}

/// Fields for a new issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub link: String,
}

/// One page image of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Page {
    /// Unique identifier.
    pub id: i64,
    /// Owning issue.
    pub issue_id: i64,
    /// Page number within the issue.
    pub page_number: i64,
    /// Page title.
    pub title: String,
    /// Image URL. Unique.
    pub image_link: String,
}

/// A page as produced by a crawler, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CrawledPage {
    pub page_number: i64,
    pub image_link: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl CrawledPage {
    /// Title to persist: the crawled one, or `Page <n>`.
    #[must_use]
    pub fn title_or_default(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Page {}", self.page_number),
        }
    }
}

/// An issue with its comic's title and its pages in page-number order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuePages {
    pub issue: Issue,
    pub comic_title: String,
    pub pages: Vec<Page>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_crawled_page_title_defaults_to_page_number() {
        let page = CrawledPage {
            page_number: 4,
            image_link: "https://cdn.example.com/4.jpg".to_string(),
            title: Some("  ".to_string()),
        };
        assert_eq!(page.title_or_default(), "Page 4");
    }

    #[test]
    fn test_crawled_page_keeps_given_title() {
        let page = CrawledPage {
            page_number: 1,
            image_link: "https://cdn.example.com/1.jpg".to_string(),
            title: Some("Cover".to_string()),
        };
        assert_eq!(page.title_or_default(), "Cover");
    }

    #[test]
    fn test_crawled_page_deserializes_without_title() {
        let page: CrawledPage =
            serde_json::from_str(r#"{"page_number": 2, "image_link": "https://x/2.png"}"#)
                .unwrap();
        assert_eq!(page.title, None);
    }
}
