//! JPEG images to PDF
//!
//! Every image becomes one page, scaled to fit inside the page margins with
//! its aspect ratio kept and centered. Images are re-encoded as baseline RGB
//! JPEG and embedded with `DCTDecode`.

use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Quality used when re-encoding uploads
const JPEG_QUALITY: u8 = 90;

#[derive(Debug, thiserror::Error)]
pub enum ImagesToPdfError {
    #[error("No images provided")]
    NoImages,

    #[error("Unknown {option} '{value}', expected one of: {expected}")]
    InvalidOption {
        option: &'static str,
        value: String,
        expected: String,
    },

    #[error("Image {index} is not a JPEG")]
    NotJpeg { index: usize },

    #[error("Image {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),

    #[error("Failed to build PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Failed to write PDF: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_choice<T: Copy>(
    option: &'static str,
    value: &str,
    choices: &[(&str, T)],
) -> Result<T, ImagesToPdfError> {
    let value = value.trim();
    choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, choice)| *choice)
        .ok_or_else(|| ImagesToPdfError::InvalidOption {
            option,
            value: value.to_string(),
            expected: choices
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    A4,
    UsLetter,
    /// The page takes the image's pixel dimensions as points
    Fit,
}

impl PageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            PageSize::A4 => "a4",
            PageSize::UsLetter => "us_letter",
            PageSize::Fit => "fit",
        }
    }
}

impl FromStr for PageSize {
    type Err = ImagesToPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "page_size",
            s,
            &[("a4", PageSize::A4), ("us_letter", PageSize::UsLetter), ("fit", PageSize::Fit)],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

impl FromStr for Orientation {
    type Err = ImagesToPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "page_orientation",
            s,
            &[("portrait", Orientation::Portrait), ("landscape", Orientation::Landscape)],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Margin {
    #[default]
    None,
    Small,
    Big,
}

impl Margin {
    pub fn as_str(self) -> &'static str {
        match self {
            Margin::None => "no_margin",
            Margin::Small => "small",
            Margin::Big => "big",
        }
    }

    pub fn points(self) -> f64 {
        match self {
            Margin::None => 0.0,
            Margin::Small => 20.0,
            Margin::Big => 50.0,
        }
    }
}

impl FromStr for Margin {
    type Err = ImagesToPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "margin",
            s,
            &[("no_margin", Margin::None), ("small", Margin::Small), ("big", Margin::Big)],
        )
    }
}

/// Page setup shared by every page of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageLayout {
    pub size: PageSize,
    pub orientation: Orientation,
    pub margin: Margin,
}

/// Image position on a page, in points from the bottom left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageLayout {
    /// Page width and height in points for an image of the given pixel size
    pub fn page_size(&self, image_width: u32, image_height: u32) -> (f64, f64) {
        let (short, long) = match self.size {
            PageSize::A4 => (595.0, 842.0),
            PageSize::UsLetter => (612.0, 792.0),
            PageSize::Fit => {
                let (w, h) = (image_width.max(1) as f64, image_height.max(1) as f64);
                (w.min(h), w.max(h))
            }
        };
        match self.orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }

    /// Fit an image inside the page margins, centered, aspect ratio kept
    pub fn place(&self, page: (f64, f64), image_width: u32, image_height: u32) -> Placement {
        let margin = self.margin.points();
        let area_width = (page.0 - 2.0 * margin).max(1.0);
        let area_height = (page.1 - 2.0 * margin).max(1.0);
        let (w, h) = (image_width.max(1) as f64, image_height.max(1) as f64);

        let scale = (area_width / w).min(area_height / h);
        let (width, height) = (w * scale, h * scale);
        Placement {
            x: (page.0 - width) / 2.0,
            y: (page.1 - height) / 2.0,
            width,
            height,
        }
    }
}

/// A decoded upload ready to embed
struct PageImage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

fn prepare(index: usize, bytes: &[u8]) -> Result<PageImage, ImagesToPdfError> {
    if !matches!(image::guess_format(bytes), Ok(ImageFormat::Jpeg)) {
        return Err(ImagesToPdfError::NotJpeg { index });
    }
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|source| ImagesToPdfError::Decode { index, source })?;
    // CMYK and grayscale sources both end up as DeviceRGB
    let rgb = decoded.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ImagesToPdfError::Encode)?;

    Ok(PageImage {
        width: rgb.width(),
        height: rgb.height(),
        jpeg,
    })
}

/// Build one PDF with a page per image, in input order
pub fn images_to_pdf<B: AsRef<[u8]>>(images: &[B], layout: PageLayout) -> Result<Vec<u8>, ImagesToPdfError> {
    if images.is_empty() {
        return Err(ImagesToPdfError::NoImages);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for (index, bytes) in images.iter().enumerate() {
        let image = prepare(index, bytes.as_ref())?;
        let page = layout.page_size(image.width, image.height);
        let placement = layout.place(page, image.width, image.height);

        let image_id = doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                image.jpeg,
            )
            .with_compression(false),
        );

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        placement.width.into(),
                        0.into(),
                        0.into(),
                        placement.height.into(),
                        placement.x.into(),
                        placement.y.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page.0.into(), page.1.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    tracing::debug!(pages = count, output_bytes = bytes.len(), "Images converted to PDF");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    fn media_box(document: &Document, page_id: lopdf::ObjectId) -> Vec<f32> {
        document
            .get_dictionary(page_id)
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_float().unwrap())
            .collect()
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("US_LETTER".parse::<PageSize>().unwrap(), PageSize::UsLetter);
        assert_eq!("landscape".parse::<Orientation>().unwrap(), Orientation::Landscape);
        assert_eq!("no_margin".parse::<Margin>().unwrap(), Margin::None);
        match "a3".parse::<PageSize>() {
            Err(ImagesToPdfError::InvalidOption { option, expected, .. }) => {
                assert_eq!(option, "page_size");
                assert_eq!(expected, "a4, us_letter, fit");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_page_sizes_follow_orientation() {
        let a4 = PageLayout::default();
        assert_eq!(a4.page_size(10, 10), (595.0, 842.0));

        let letter = PageLayout {
            size: PageSize::UsLetter,
            orientation: Orientation::Landscape,
            margin: Margin::None,
        };
        assert_eq!(letter.page_size(10, 10), (792.0, 612.0));

        let fit = PageLayout {
            size: PageSize::Fit,
            ..PageLayout::default()
        };
        assert_eq!(fit.page_size(800, 600), (600.0, 800.0));
        let fit_landscape = PageLayout {
            orientation: Orientation::Landscape,
            ..fit
        };
        assert_eq!(fit_landscape.page_size(800, 600), (800.0, 600.0));
    }

    #[test]
    fn test_placement_respects_margins() {
        let layout = PageLayout {
            margin: Margin::Big,
            ..PageLayout::default()
        };
        let page = layout.page_size(1000, 500);
        let placement = layout.place(page, 1000, 500);

        // Width-bound: 595 - 2 * 50
        assert!((placement.width - 495.0).abs() < 1e-9);
        assert!((placement.height - 247.5).abs() < 1e-9);
        assert!((placement.x - 50.0).abs() < 1e-9);
        assert!((placement.y - (842.0 - 247.5) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_page_per_image() {
        let images = vec![jpeg(40, 20), jpeg(20, 40), jpeg(8, 8)];
        let layout = PageLayout {
            size: PageSize::Fit,
            orientation: Orientation::Landscape,
            margin: Margin::Small,
        };

        let pdf = images_to_pdf(images.as_slice(), layout).unwrap();
        assert!(crate::pdf::has_pdf_header(&pdf));

        let document = Document::load_mem(&pdf).unwrap();
        let pages = document.get_pages();
        assert_eq!(pages.len(), 3);
        assert_eq!(media_box(&document, pages[&1]), vec![0.0, 0.0, 40.0, 20.0]);
        assert_eq!(media_box(&document, pages[&2]), vec![0.0, 0.0, 40.0, 20.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let none: Vec<Vec<u8>> = Vec::new();
        assert!(matches!(
            images_to_pdf(none.as_slice(), PageLayout::default()),
            Err(ImagesToPdfError::NoImages)
        ));

        let png = {
            let mut bytes = Vec::new();
            image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2))
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .unwrap();
            bytes
        };
        assert!(matches!(
            images_to_pdf(&[jpeg(4, 4), png], PageLayout::default()),
            Err(ImagesToPdfError::NotJpeg { index: 1 })
        ));

        let mut truncated = jpeg(16, 16);
        truncated.truncate(40);
        assert!(matches!(
            images_to_pdf(&[truncated], PageLayout::default()),
            Err(ImagesToPdfError::Decode { index: 0, .. })
        ));
    }
}
