use std::io::Cursor;

use comicdl_core::catalog::{Catalog, CrawledPage, NewComic, NewIssue};
use image::{ImageFormat, Rgb, RgbImage};

/// Encodes a small solid-color image.
pub fn image_bytes(format: ImageFormat, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 12, Rgb([shade, 255 - shade, 64]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes(shade: u8) -> Vec<u8> {
    image_bytes(ImageFormat::Png, shade)
}

/// Adds a comic (if `comic_id` is `None`) and one issue whose pages point at
/// `links`, numbered from 1. Returns `(comic_id, issue_id)`.
pub async fn seed_issue(
    catalog: &Catalog,
    comic_id: Option<i64>,
    comic_title: &str,
    issue_title: &str,
    links: &[String],
) -> (i64, i64) {
    let comic_id = match comic_id {
        Some(id) => id,
        None => {
            catalog
                .add_comic(&NewComic {
                    title: comic_title.to_string(),
                    link: format!("https://comics.test/{}", comic_title.to_lowercase()),
                    ..NewComic::default()
                })
                .await
                .unwrap()
                .id
        }
    };

    let issue = catalog
        .add_issue(
            comic_id,
            &NewIssue {
                title: issue_title.to_string(),
                link: format!("https://comics.test/{comic_id}/{issue_title}"),
            },
        )
        .await
        .unwrap();

    let pages: Vec<CrawledPage> = links
        .iter()
        .enumerate()
        .map(|(i, link)| CrawledPage {
            page_number: i64::try_from(i + 1).unwrap(),
            image_link: link.clone(),
            title: None,
        })
        .collect();
    if !pages.is_empty() {
        catalog.add_pages(issue.id, &pages).await.unwrap();
    }

    (comic_id, issue.id)
}
