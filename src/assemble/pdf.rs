//! Image-per-page PDF writer.
//!
//! Each page is exactly the size of its image, one point per pixel. JPEG
//! files are embedded unchanged (`DCTDecode`); anything else is decoded and
//! re-encoded as JPEG first.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::debug;

use super::AssembleError;

const JPEG_QUALITY: u8 = 90;
const PDF_VERSION: &str = "1.5";

/// An image ready to embed.
struct EmbeddedImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    jpeg: Vec<u8>,
}

fn load_image(path: &Path) -> Result<EmbeddedImage, AssembleError> {
    let bytes = std::fs::read(path).map_err(|e| AssembleError::io(path, e))?;
    let format = image::guess_format(&bytes).map_err(|e| AssembleError::image(path, &e))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| AssembleError::image(path, &e))?;

    let (width, height) = (decoded.width(), decoded.height());

    let passthrough_space = if format == ImageFormat::Jpeg {
        jpeg_color_space(&bytes)
    } else {
        None
    };
    if let Some(color_space) = passthrough_space {
        return Ok(EmbeddedImage {
            width,
            height,
            color_space,
            jpeg: bytes,
        });
    }

    debug!(path = %path.display(), ?format, "re-encoding page as JPEG");
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| AssembleError::image(path, &e))?;

    Ok(EmbeddedImage {
        width,
        height,
        color_space: "DeviceRGB",
        jpeg: jpeg.into_inner(),
    })
}

/// Color space for embedding a JPEG as-is. CMYK and other encodings are
/// decoded to RGB by the `image` crate, so they must be re-encoded.
fn jpeg_color_space(bytes: &[u8]) -> Option<&'static str> {
    let decoder = JpegDecoder::new(Cursor::new(bytes)).ok()?;
    match decoder.original_color_type() {
        ExtendedColorType::L8 => Some("DeviceGray"),
        ExtendedColorType::Rgb8 => Some("DeviceRGB"),
        _ => None,
    }
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image: EmbeddedImage,
) -> Result<ObjectId, AssembleError> {
    let width = i64::from(image.width);
    let height = i64::from(image.height);

    let image_dict = dictionary! {
        "Type" => Object::Name(b"XObject".to_vec()),
        "Subtype" => Object::Name(b"Image".to_vec()),
        "Width" => Object::Integer(width),
        "Height" => Object::Integer(height),
        "ColorSpace" => Object::Name(image.color_space.as_bytes().to_vec()),
        "BitsPerComponent" => Object::Integer(8),
        "Filter" => Object::Name(b"DCTDecode".to_vec()),
    };
    let image_id = doc.add_object(Stream::new(image_dict, image.jpeg).with_compression(false));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| AssembleError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let resources = dictionary! {
        "XObject" => dictionary! {
            "Im0" => Object::Reference(image_id),
        },
    };

    let page_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Page".to_vec()),
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(height),
        ]),
        "Resources" => resources,
        "Contents" => Object::Reference(content_id),
    });
    Ok(page_id)
}

/// Writes `images`, in order, as a PDF at `output`. Returns the page count.
///
/// Blocking; run it on the blocking pool.
pub(crate) fn write_pdf(images: &[PathBuf], output: &Path) -> Result<usize, AssembleError> {
    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for path in images {
        let image = load_image(path)?;
        kids.push(Object::Reference(add_page(&mut doc, pages_id, image)?));
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => Object::Array(kids),
            "Count" => Object::Integer(count),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Catalog".to_vec()),
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.save(output)
        .map_err(|e| AssembleError::Pdf(format!("{}: {e}", output.display())))?;

    Ok(images.len())
}
