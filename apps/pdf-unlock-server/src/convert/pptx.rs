//! PowerPoint (PPTX) assembly
//!
//! Writes a minimal Office Open XML presentation package: one master, one
//! blank layout, one theme and a slide per deck entry. Each slide carries a
//! title text box, a body text box for paragraphs and the slide's images
//! scaled to fit below the text.

use std::borrow::Cow;
use std::io::{Cursor, Write};

use chrono::Utc;
use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::types::{ContentBlock, ImageBlock, Slide, SlideDeck};

/// English Metric Units per inch
const EMU_PER_INCH: i64 = 914_400;

/// 10in x 7.5in (4:3)
pub const SLIDE_WIDTH_EMU: i64 = 10 * EMU_PER_INCH;
pub const SLIDE_HEIGHT_EMU: i64 = 15 * EMU_PER_INCH / 2;

const MARGIN_EMU: i64 = EMU_PER_INCH / 2;
const TITLE_TOP_EMU: i64 = EMU_PER_INCH * 3 / 10;
const TITLE_HEIGHT_EMU: i64 = EMU_PER_INCH;
const BODY_TOP_EMU: i64 = TITLE_TOP_EMU + TITLE_HEIGHT_EMU + EMU_PER_INCH / 10;
const IMAGE_GAP_EMU: i64 = EMU_PER_INCH / 5;

/// Share of the body area given to text when a slide also has images
const TEXT_SHARE_WITH_IMAGES: f64 = 0.45;

const TITLE_FONT_SIZE: u32 = 2800;
const BODY_FONT_SIZE: u32 = 1600;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("Failed to write presentation archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error while assembling: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a slide deck into presentation bytes
///
/// Implementations are blocking and run on the blocking thread pool.
pub trait DeckAssembler: Send + Sync {
    fn assemble(&self, deck: &SlideDeck) -> Result<Vec<u8>, AssembleError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PptxAssembler;

impl DeckAssembler for PptxAssembler {
    fn assemble(&self, deck: &SlideDeck) -> Result<Vec<u8>, AssembleError> {
        let mut package = Package::new();
        let slide_count = deck.slides.len();

        package.xml("[Content_Types].xml", &content_types(deck))?;
        package.xml("_rels/.rels", ROOT_RELS)?;
        package.xml("docProps/core.xml", &core_props(&deck.title))?;
        package.xml("docProps/app.xml", &app_props(slide_count))?;
        package.xml("ppt/presentation.xml", &presentation(slide_count))?;
        package.xml("ppt/_rels/presentation.xml.rels", &presentation_rels(slide_count))?;
        package.xml("ppt/presProps.xml", &pres_props())?;
        package.xml("ppt/slideMasters/slideMaster1.xml", &slide_master())?;
        package.xml("ppt/slideMasters/_rels/slideMaster1.xml.rels", SLIDE_MASTER_RELS)?;
        package.xml("ppt/slideLayouts/slideLayout1.xml", &slide_layout())?;
        package.xml("ppt/slideLayouts/_rels/slideLayout1.xml.rels", SLIDE_LAYOUT_RELS)?;
        package.xml("ppt/theme/theme1.xml", THEME)?;

        let mut media_index = 0;
        for (index, slide) in deck.slides.iter().enumerate() {
            let number = index + 1;
            let images: Vec<&ImageBlock> = slide
                .blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Image(image) => Some(image),
                    ContentBlock::Paragraph { .. } => None,
                })
                .collect();

            let mut media_names = Vec::with_capacity(images.len());
            for image in &images {
                media_index += 1;
                let name = format!("image{}.{}", media_index, image.format.extension());
                package.media(&format!("ppt/media/{}", name), &image.data)?;
                media_names.push(name);
            }

            package.xml(&format!("ppt/slides/slide{}.xml", number), &slide_xml(slide, &images))?;
            package.xml(
                &format!("ppt/slides/_rels/slide{}.xml.rels", number),
                &slide_rels(&media_names),
            )?;
        }

        let bytes = package.finish()?;
        tracing::debug!(slides = slide_count, media = media_index, bytes = bytes.len(), "Assembled presentation");
        Ok(bytes)
    }
}

// ============================================================================
// Package writer
// ============================================================================

struct Package {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl Package {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    fn xml(&mut self, name: &str, contents: &str) -> Result<(), AssembleError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options)?;
        self.zip.write_all(contents.as_bytes())?;
        Ok(())
    }

    /// Images are already compressed
    fn media(&mut self, name: &str, data: &[u8]) -> Result<(), AssembleError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip.start_file(name, options)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, AssembleError> {
        Ok(self.zip.finish()?.into_inner())
    }
}

// ============================================================================
// Package parts
// ============================================================================

fn content_types(deck: &SlideDeck) -> String {
    let mut slides = String::new();
    for number in 1..=deck.slides.len() {
        slides.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#,
            number
        ));
    }

    format!(
        concat!(
            "{decl}",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Default Extension="jpeg" ContentType="image/jpeg"/>"#,
            r#"<Default Extension="png" ContentType="image/png"/>"#,
            r#"<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#,
            r#"<Override PartName="/ppt/presProps.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presProps+xml"/>"#,
            r#"<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>"#,
            r#"<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>"#,
            r#"<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#,
            r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
            r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
            "{slides}",
            "</Types>"
        ),
        decl = XML_DECL,
        slides = slides
    )
}

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>"#,
    "</Relationships>"
);

fn core_props(title: &str) -> String {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        concat!(
            "{decl}",
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
            r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<dc:title>{title}</dc:title>",
            "<dc:creator>{creator}</dc:creator>",
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>"#,
            r#"<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>"#,
            "</cp:coreProperties>"
        ),
        decl = XML_DECL,
        title = xml_text(title),
        creator = env!("CARGO_PKG_NAME"),
        now = now
    )
}

fn app_props(slide_count: usize) -> String {
    format!(
        concat!(
            "{decl}",
            r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" "#,
            r#"xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
            "<Application>{app}</Application>",
            "<Slides>{slides}</Slides>",
            "<PresentationFormat>On-screen Show (4:3)</PresentationFormat>",
            "</Properties>"
        ),
        decl = XML_DECL,
        app = env!("CARGO_PKG_NAME"),
        slides = slide_count
    )
}

fn presentation(slide_count: usize) -> String {
    let mut slide_ids = String::new();
    for index in 0..slide_count {
        slide_ids.push_str(&format!(
            r#"<p:sldId id="{}" r:id="rId{}"/>"#,
            256 + index,
            FIRST_SLIDE_REL + index
        ));
    }

    format!(
        concat!(
            "{decl}",
            r#"<p:presentation xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}" saveSubsetFonts="1">"#,
            r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#,
            "<p:sldIdLst>{slide_ids}</p:sldIdLst>",
            r#"<p:sldSz cx="{cx}" cy="{cy}" type="screen4x3"/>"#,
            r#"<p:notesSz cx="{cy}" cy="{cx}"/>"#,
            "</p:presentation>"
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        slide_ids = slide_ids,
        cx = SLIDE_WIDTH_EMU,
        cy = SLIDE_HEIGHT_EMU
    )
}

/// rId1 master, rId2 theme, rId3 presProps, then one per slide
const FIRST_SLIDE_REL: usize = 4;

fn presentation_rels(slide_count: usize) -> String {
    let mut rels = format!(
        concat!(
            r#"<Relationship Id="rId1" Type="{base}/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#,
            r#"<Relationship Id="rId2" Type="{base}/theme" Target="theme/theme1.xml"/>"#,
            r#"<Relationship Id="rId3" Type="{base}/presProps" Target="presProps.xml"/>"#,
        ),
        base = REL_BASE
    );
    for index in 0..slide_count {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/slide" Target="slides/slide{}.xml"/>"#,
            FIRST_SLIDE_REL + index,
            REL_BASE,
            index + 1
        ));
    }
    relationships(&rels)
}

fn pres_props() -> String {
    format!(
        r#"{}<p:presentationPr xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"/>"#,
        XML_DECL, NS_A, NS_R, NS_P
    )
}

const EMPTY_SHAPE_TREE: &str = concat!(
    "<p:spTree>",
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    "</p:spTree>"
);

fn slide_master() -> String {
    format!(
        concat!(
            "{decl}",
            r#"<p:sldMaster xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}">"#,
            r#"<p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg>{tree}</p:cSld>"#,
            r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" "#,
            r#"accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
            r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#,
            "</p:sldMaster>"
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        tree = EMPTY_SHAPE_TREE
    )
}

const SLIDE_MASTER_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="../theme/theme1.xml"/>"#,
    "</Relationships>"
);

fn slide_layout() -> String {
    format!(
        concat!(
            "{decl}",
            r#"<p:sldLayout xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}" type="blank" preserve="1">"#,
            r#"<p:cSld name="Blank">{tree}</p:cSld>"#,
            "<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>",
            "</p:sldLayout>"
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        tree = EMPTY_SHAPE_TREE
    )
}

const SLIDE_LAYOUT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/>"#,
    "</Relationships>"
);

fn slide_rels(media_names: &[String]) -> String {
    let mut rels = format!(
        r#"<Relationship Id="rId1" Type="{}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>"#,
        REL_BASE
    );
    for (index, name) in media_names.iter().enumerate() {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/image" Target="../media/{}"/>"#,
            index + 2,
            REL_BASE,
            name
        ));
    }
    relationships(&rels)
}

fn relationships(body: &str) -> String {
    format!(
        r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
        XML_DECL, body
    )
}

// ============================================================================
// Slides
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frame {
    x: i64,
    y: i64,
    cx: i64,
    cy: i64,
}

fn slide_xml(slide: &Slide, images: &[&ImageBlock]) -> String {
    let body_width = SLIDE_WIDTH_EMU - 2 * MARGIN_EMU;
    let body_height = SLIDE_HEIGHT_EMU - BODY_TOP_EMU - MARGIN_EMU;

    let paragraphs: Vec<&str> = slide
        .blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Paragraph { text, .. } => Some(text.as_str()),
            ContentBlock::Image(_) => None,
        })
        .collect();

    let text_height = match (paragraphs.is_empty(), images.is_empty()) {
        (true, _) => 0,
        (false, true) => body_height,
        (false, false) => (body_height as f64 * TEXT_SHARE_WITH_IMAGES) as i64,
    };

    let mut shapes = String::new();
    let mut shape_id = 2;

    shapes.push_str(&text_box(
        shape_id,
        "Title",
        Frame {
            x: MARGIN_EMU,
            y: TITLE_TOP_EMU,
            cx: body_width,
            cy: TITLE_HEIGHT_EMU,
        },
        &[slide.title.as_str()],
        TITLE_FONT_SIZE,
        true,
    ));
    shape_id += 1;

    if !paragraphs.is_empty() {
        shapes.push_str(&text_box(
            shape_id,
            "Body",
            Frame {
                x: MARGIN_EMU,
                y: BODY_TOP_EMU,
                cx: body_width,
                cy: text_height,
            },
            &paragraphs,
            BODY_FONT_SIZE,
            false,
        ));
        shape_id += 1;
    }

    if !images.is_empty() {
        let area = Frame {
            x: MARGIN_EMU,
            y: BODY_TOP_EMU + text_height + if text_height > 0 { IMAGE_GAP_EMU } else { 0 },
            cx: body_width,
            cy: body_height - text_height - if text_height > 0 { IMAGE_GAP_EMU } else { 0 },
        };
        for (index, (image, frame)) in images.iter().zip(image_frames(area, images)).enumerate() {
            shapes.push_str(&picture(shape_id, index + 2, image, frame));
            shape_id += 1;
        }
    }

    format!(
        concat!(
            "{decl}",
            r#"<p:sld xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}">"#,
            "<p:cSld><p:spTree>",
            r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
            r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
            "{shapes}",
            "</p:spTree></p:cSld>",
            "<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>",
            "</p:sld>"
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        shapes = shapes
    )
}

/// Lay images out in a near-square grid of equal cells, each scaled to fit
/// its cell with the aspect ratio preserved and centered
fn image_frames(area: Frame, images: &[&ImageBlock]) -> Vec<Frame> {
    let count = images.len() as i64;
    if count == 0 {
        return Vec::new();
    }
    let columns = (count as f64).sqrt().ceil() as i64;
    let rows = (count + columns - 1) / columns;
    // Gaps shrink on crowded slides so cells never collapse
    let gap = IMAGE_GAP_EMU.min(area.cx.min(area.cy) / (2 * columns.max(rows)));
    let cell_width = ((area.cx - gap * (columns - 1)) / columns).max(1);
    let cell_height = ((area.cy - gap * (rows - 1)) / rows).max(1);

    images
        .iter()
        .enumerate()
        .map(|(index, image)| {
            let index = index as i64;
            let cell_x = area.x + (index % columns) * (cell_width + gap);
            let cell_y = area.y + (index / columns) * (cell_height + gap);
            let (width, height) = (image.width.max(1) as f64, image.height.max(1) as f64);
            let scale = (cell_width as f64 / width).min(cell_height as f64 / height);
            let cx = ((width * scale) as i64).max(1);
            let cy = ((height * scale) as i64).max(1);
            Frame {
                x: cell_x + (cell_width - cx) / 2,
                y: cell_y + (cell_height - cy) / 2,
                cx,
                cy,
            }
        })
        .collect()
}

fn text_box(id: usize, name: &str, frame: Frame, paragraphs: &[&str], size: u32, bold: bool) -> String {
    let mut body = String::new();
    for paragraph in paragraphs {
        body.push_str(&format!(
            r#"<a:p><a:r><a:rPr lang="en-US" sz="{}" b="{}" dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
            size,
            if bold { 1 } else { 0 },
            xml_text(paragraph)
        ));
    }

    format!(
        concat!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name} {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr>"#,
            r#"<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr>"#,
            r#"<p:txBody><a:bodyPr wrap="square" rtlCol="0"><a:normAutofit/></a:bodyPr><a:lstStyle/>{body}</p:txBody>"#,
            "</p:sp>"
        ),
        id = id,
        name = name,
        x = frame.x,
        y = frame.y,
        cx = frame.cx,
        cy = frame.cy,
        body = body
    )
}

fn picture(id: usize, rel: usize, image: &ImageBlock, frame: Frame) -> String {
    format!(
        concat!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}" descr="Page {page} image"/>"#,
            r#"<p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>"#,
            r#"<p:blipFill><a:blip r:embed="rId{rel}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>"#,
            r#"<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>"#,
            "</p:pic>"
        ),
        id = id,
        page = image.page,
        rel = rel,
        x = frame.x,
        y = frame.y,
        cx = frame.cx,
        cy = frame.cy
    )
}

/// Escape text for XML and drop control characters XML 1.0 cannot carry
fn xml_text(text: &str) -> Cow<'_, str> {
    let is_forbidden = |c: char| c.is_control() && !matches!(c, '\t' | '\n' | '\r');
    if text.chars().any(is_forbidden) {
        let cleaned: String = text.chars().filter(|c| !is_forbidden(*c)).collect();
        Cow::Owned(escape(&cleaned).into_owned())
    } else {
        escape(text)
    }
}

const THEME: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements>"#,
    r#"<a:clrScheme name="Office">"#,
    r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
    r#"<a:dk2><a:srgbClr val="1F497D"/></a:dk2><a:lt2><a:srgbClr val="EEECE1"/></a:lt2>"#,
    r#"<a:accent1><a:srgbClr val="4F81BD"/></a:accent1><a:accent2><a:srgbClr val="C0504D"/></a:accent2>"#,
    r#"<a:accent3><a:srgbClr val="9BBB59"/></a:accent3><a:accent4><a:srgbClr val="8064A2"/></a:accent4>"#,
    r#"<a:accent5><a:srgbClr val="4BACC6"/></a:accent5><a:accent6><a:srgbClr val="F79646"/></a:accent6>"#,
    r#"<a:hlink><a:srgbClr val="0000FF"/></a:hlink><a:folHlink><a:srgbClr val="800080"/></a:folHlink>"#,
    "</a:clrScheme>",
    r#"<a:fontScheme name="Office">"#,
    r#"<a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
    r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
    "</a:fontScheme>",
    r#"<a:fmtScheme name="Office"><a:fillStyleLst>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    "</a:fillStyleLst><a:lnStyleLst>",
    r#"<a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"<a:ln w="25400"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"<a:ln w="38100"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    "</a:lnStyleLst><a:effectStyleLst>",
    "<a:effectStyle><a:effectLst/></a:effectStyle>",
    "<a:effectStyle><a:effectLst/></a:effectStyle>",
    "<a:effectStyle><a:effectLst/></a:effectStyle>",
    "</a:effectStyleLst><a:bgFillStyleLst>",
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    "</a:bgFillStyleLst></a:fmtScheme>",
    "</a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::types::ImageFormat;
    use quick_xml::events::Event;
    use quick_xml::Reader;
    use std::io::Read;
    use zip::ZipArchive;

    fn sample_deck() -> SlideDeck {
        SlideDeck {
            title: "Q3 <Review> & Plan".to_string(),
            slides: vec![
                Slide {
                    title: "Page 1".to_string(),
                    blocks: vec![
                        ContentBlock::Paragraph {
                            page: 1,
                            text: "Revenue < costs & \"margins\"\u{0}".to_string(),
                        },
                        ContentBlock::Image(ImageBlock {
                            page: 1,
                            data: vec![0x89, b'P', b'N', b'G'],
                            format: ImageFormat::Png,
                            width: 200,
                            height: 100,
                        }),
                    ],
                },
                Slide {
                    title: "Page 2".to_string(),
                    blocks: vec![ContentBlock::Paragraph {
                        page: 2,
                        text: "Second slide".to_string(),
                    }],
                },
            ],
        }
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut contents = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
    }

    fn assert_well_formed(xml: &str) {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed XML ({}): {}", e, xml),
            }
        }
    }

    #[test]
    fn test_package_layout() {
        let bytes = PptxAssembler.assemble(&sample_deck()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        for expected in [
            "[Content_Types].xml",
            "_rels/.rels",
            "ppt/presentation.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
            "ppt/slides/_rels/slide1.xml.rels",
            "ppt/media/image1.png",
            "ppt/theme/theme1.xml",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }

        for name in names.iter().filter(|n| n.ends_with(".xml") || n.ends_with(".rels")) {
            assert_well_formed(&read_entry(&mut archive, name));
        }

        let presentation = read_entry(&mut archive, "ppt/presentation.xml");
        assert_eq!(presentation.matches("<p:sldId ").count(), 2);
        assert!(presentation.contains(r#"cx="9144000" cy="6858000""#));

        let rels = read_entry(&mut archive, "ppt/slides/_rels/slide1.xml.rels");
        assert!(rels.contains("../media/image1.png"));
    }

    #[test]
    fn test_text_is_escaped() {
        let bytes = PptxAssembler.assemble(&sample_deck()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let slide = read_entry(&mut archive, "ppt/slides/slide1.xml");
        assert!(slide.contains("Revenue &lt; costs &amp; &quot;margins&quot;"));
        assert!(!slide.contains('\u{0}'));

        let core = read_entry(&mut archive, "docProps/core.xml");
        assert!(core.contains("Q3 &lt;Review&gt; &amp; Plan"));
    }

    #[test]
    fn test_image_frames_preserve_aspect() {
        let wide = ImageBlock {
            page: 1,
            data: Vec::new(),
            format: ImageFormat::Jpeg,
            width: 400,
            height: 100,
        };
        let area = Frame {
            x: 0,
            y: 0,
            cx: 4_000_000,
            cy: 4_000_000,
        };

        let frames = image_frames(area, &[&wide]);
        assert_eq!(frames.len(), 1);
        let frame = frames[0];
        assert_eq!(frame.cx, 4_000_000);
        assert_eq!(frame.cy, 1_000_000);
        assert_eq!(frame.y, 1_500_000);

        let frames = image_frames(area, &[&wide, &wide]);
        assert!(frames.iter().all(|f| f.x >= 0 && f.x + f.cx <= area.cx));
        assert!(frames[0].x + frames[0].cx <= frames[1].x);
    }

    #[test]
    fn test_many_images_wrap_into_rows() {
        let square = ImageBlock {
            page: 1,
            data: Vec::new(),
            format: ImageFormat::Png,
            width: 50,
            height: 50,
        };
        let area = Frame {
            x: MARGIN_EMU,
            y: BODY_TOP_EMU,
            cx: SLIDE_WIDTH_EMU - 2 * MARGIN_EMU,
            cy: 1_000_000,
        };

        for count in [5, 40, 200] {
            let images: Vec<&ImageBlock> = std::iter::repeat(&square).take(count).collect();
            let frames = image_frames(area, &images);
            assert_eq!(frames.len(), count);
            for frame in &frames {
                assert!(frame.cx > 0 && frame.cy > 0, "{} images: {:?}", count, frame);
                assert!(frame.x >= area.x && frame.x + frame.cx <= area.x + area.cx);
                assert!(frame.y >= area.y && frame.y + frame.cy <= area.y + area.cy);
            }
            let rows = frames
                .iter()
                .map(|f| f.y)
                .collect::<std::collections::BTreeSet<_>>()
                .len();
            assert!(rows > 1, "{} images stayed on one row", count);
        }
    }
}
