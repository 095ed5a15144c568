//! Integration tests for PDF assembly over job trees on disk.

use std::path::Path;

use comicdl_core::jobs::{RequestedIssue, RequestedPage};
use comicdl_core::{
    AssembleError, Assembler, AssemblyOutcome, Database, Job, JobLayout, JobStore,
};
use image::{ImageFormat, Rgb, RgbImage};
use lopdf::{Document, ObjectId};
use tempfile::TempDir;

fn write_sized(path: &Path, width: u32, format: ImageFormat) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(width, 10, Rgb([200, 100, 50]))
        .save_with_format(path, format)
        .unwrap();
}

fn job(id: i64, name: &str) -> Job {
    Job {
        id,
        name: name.to_string(),
        downloaded_pages: 0,
        total_pages: 0,
        total_issues: 0,
        complete: false,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

/// Widths of the PDF's pages, in document order.
fn page_widths(pdf: &Path) -> Vec<i64> {
    let doc = Document::load(pdf).unwrap();
    let ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    ids.into_iter()
        .map(|id| {
            doc.get_dictionary(id)
                .unwrap()
                .get(b"MediaBox")
                .unwrap()
                .as_array()
                .unwrap()[2]
                .as_i64()
                .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn test_pages_concatenate_in_numeric_slot_then_page_order() {
    let temp_dir = TempDir::new().unwrap();
    let layout = JobLayout::new(temp_dir.path());
    let job = job(7, "Saga: Volume 1");

    // Width encodes the expected position so page order is observable.
    let mut expected = Vec::new();
    let mut width = 1;
    for slot in [0, 1, 10] {
        for page in [1, 2, 10] {
            let format = if page == 2 {
                ImageFormat::Jpeg
            } else {
                ImageFormat::Png
            };
            let ext = if page == 2 { "jpg" } else { "png" };
            write_sized(
                &layout.issue_dir(job.id, slot).join(format!("{page}.{ext}")),
                width,
                format,
            );
            expected.push(i64::from(width));
            width += 1;
        }
    }

    let outcome = Assembler::new(layout.clone()).assemble(&job).await.unwrap();
    let output = layout.job_root(7).join("Saga_ Volume 1.pdf");
    assert_eq!(
        outcome,
        AssemblyOutcome::Assembled {
            path: output.clone(),
            pages: 9
        }
    );
    assert_eq!(page_widths(&output), expected);
}

#[tokio::test]
async fn test_reassembly_ignores_previous_document() {
    let temp_dir = TempDir::new().unwrap();
    let layout = JobLayout::new(temp_dir.path());
    let job = job(1, "Again");
    write_sized(
        &layout.issue_dir(1, 0).join("1.png"),
        5,
        ImageFormat::Png,
    );

    let assembler = Assembler::new(layout.clone());
    assembler.assemble(&job).await.unwrap();
    let outcome = assembler.assemble(&job).await.unwrap();

    assert!(matches!(outcome, AssemblyOutcome::Assembled { pages: 1, .. }));
}

#[tokio::test]
async fn test_empty_tree_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let layout = JobLayout::new(temp_dir.path());
    let job = job(3, "Empty");
    std::fs::create_dir_all(layout.issue_dir(3, 0)).unwrap();

    let assembler = Assembler::new(layout);
    let outcome = assembler.assemble(&job).await.unwrap();

    assert_eq!(outcome, AssemblyOutcome::NothingToAssemble);
    assert!(!assembler.output_path(&job).exists());
}

#[tokio::test]
async fn test_corrupt_image_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let layout = JobLayout::new(temp_dir.path());
    let job = job(4, "Broken");
    let page = layout.issue_dir(4, 0).join("1.png");
    std::fs::create_dir_all(page.parent().unwrap()).unwrap();
    std::fs::write(&page, b"<html>not an image</html>").unwrap();

    let err = Assembler::new(layout).assemble(&job).await.unwrap_err();
    assert!(matches!(err, AssembleError::Image { path, .. } if path == page));
}

#[tokio::test]
async fn test_assemble_steps_requires_complete_pages_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let store = JobStore::new(Database::new_in_memory().await.unwrap());
    let layout = JobLayout::new(temp_dir.path().join("downloads"));
    let request = RequestedIssue {
        pages: (1..=2)
            .map(|n| RequestedPage {
                page_id: None,
                page_number: n,
                image_link: format!("https://cdn.test/{n}.png"),
            })
            .collect(),
        ..RequestedIssue::default()
    };
    let (job, steps) = store.create_job("Steps", &[request]).await.unwrap();
    layout.prepare(&job).await.unwrap();
    for step in &steps {
        store.record_step_success(step.id).await.unwrap();
    }
    write_sized(&layout.page_path(&steps[0]), 3, ImageFormat::Png);

    let assembler = Assembler::new(layout.clone());
    let steps = store.steps(job.id).await.unwrap();
    let err = assembler.assemble_steps(&job, &steps).await.unwrap_err();
    assert!(matches!(err, AssembleError::MissingPage { key, .. } if key.page_number == 2));

    write_sized(&layout.page_path(&steps[1]), 4, ImageFormat::Png);
    let outcome = assembler.assemble_steps(&job, &steps).await.unwrap();
    assert!(matches!(outcome, AssemblyOutcome::Assembled { pages: 2, .. }));
    assert_eq!(page_widths(&assembler.output_path(&job)), vec![3, 4]);
}
