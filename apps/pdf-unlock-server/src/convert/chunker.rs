//! Slide chunking
//!
//! Splits long paragraphs into readable blocks and packs blocks onto slides,
//! one source page at a time.

use super::types::{ChunkingOptions, ContentBlock, ExtractedDocument, Slide, SlideDeck};

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Sentence,
    Line,
    Word,
}

/// Split a paragraph into pieces of at most `max_chars` characters
///
/// Tries sentence boundaries first, then line breaks, then whitespace. A
/// single word longer than the limit is kept whole.
pub fn split_paragraph(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    split_at(text, max_chars.max(1), Boundary::Sentence)
}

fn split_at(text: &str, max_chars: usize, boundary: Boundary) -> Vec<String> {
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let (pieces, finer): (Vec<&str>, Option<Boundary>) = match boundary {
        Boundary::Sentence => (sentences(text), Some(Boundary::Line)),
        Boundary::Line => (
            text.lines().map(str::trim).filter(|l| !l.is_empty()).collect(),
            Some(Boundary::Word),
        ),
        Boundary::Word => (text.split_whitespace().collect(), None),
    };

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(piece);

        if piece_len > max_chars {
            flush(&mut current, &mut current_len, &mut chunks);
            match finer {
                Some(finer) => chunks.extend(split_at(piece, max_chars, finer)),
                None => chunks.push(piece.to_string()),
            }
            continue;
        }

        if current_len > 0 && current_len + 1 + piece_len > max_chars {
            flush(&mut current, &mut current_len, &mut chunks);
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(piece);
        current_len += piece_len;
    }

    flush(&mut current, &mut current_len, &mut chunks);
    chunks
}

fn flush(current: &mut String, current_len: &mut usize, chunks: &mut Vec<String>) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
    *current_len = 0;
}

/// Split after `.`, `!` or `?` when followed by whitespace
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = idx + c.len_utf8();
                    out.push(text[start..end].trim());
                    start = end;
                }
            }
        }
    }
    out.push(text[start..].trim());

    out.into_iter().filter(|s| !s.is_empty()).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Lay extracted content out as a deck
///
/// A document without any text yields a single slide explaining why, never
/// an empty deck.
pub fn build_deck(title: &str, document: &ExtractedDocument, options: ChunkingOptions) -> SlideDeck {
    let max_blocks = options.max_blocks_per_slide.max(1);
    let mut blocks = Vec::with_capacity(document.blocks.len());
    for block in &document.blocks {
        match block {
            ContentBlock::Paragraph { page, text } => blocks.extend(
                split_paragraph(text, options.max_chars_per_block)
                    .into_iter()
                    .map(|text| ContentBlock::Paragraph { page: *page, text }),
            ),
            ContentBlock::Image(_) => blocks.push(block.clone()),
        }
    }
    // Whitespace-only paragraphs split into nothing
    if !blocks.iter().any(|b| matches!(b, ContentBlock::Paragraph { .. })) {
        return SlideDeck {
            title: title.to_string(),
            slides: vec![no_text_slide(title, document)],
        };
    }
    // Extractors emit pages in order; keep within-page order stable regardless
    blocks.sort_by_key(ContentBlock::page);

    let mut slides = Vec::new();
    let mut rest = blocks.as_slice();
    while let Some(first) = rest.first() {
        let page = first.page();
        let page_len = rest.iter().take_while(|b| b.page() == page).count();
        let (page_blocks, tail) = rest.split_at(page_len);
        rest = tail;

        let parts = page_blocks.len().div_ceil(max_blocks);
        for (index, chunk) in page_blocks.chunks(max_blocks).enumerate() {
            let title = if parts > 1 {
                format!("Page {} ({}/{})", page, index + 1, parts)
            } else {
                format!("Page {}", page)
            };
            slides.push(Slide {
                title,
                blocks: chunk.to_vec(),
            });
        }
    }

    SlideDeck {
        title: title.to_string(),
        slides,
    }
}

fn no_text_slide(title: &str, document: &ExtractedDocument) -> Slide {
    let text = format!(
        "No extractable text was found in this document ({} page{}, {} embedded image{}). \
         It is probably a scanned or image-only PDF; run it through OCR before converting.",
        document.page_count,
        if document.page_count == 1 { "" } else { "s" },
        document.image_count(),
        if document.image_count() == 1 { "" } else { "s" },
    );

    Slide {
        title: title.to_string(),
        blocks: vec![ContentBlock::Paragraph { page: 1, text }],
    }
}
