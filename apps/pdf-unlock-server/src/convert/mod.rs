//! PDF to PowerPoint conversion
//!
//! Extraction and assembly sit behind traits so the orchestrator can be
//! exercised with fakes; `LopdfExtractor` and `PptxAssembler` are the
//! production implementations.

mod chunker;
mod extractor;
mod orchestrator;
mod pptx;
mod types;

pub use chunker::{build_deck, split_paragraph};
pub use extractor::{ContentExtractor, ExtractError, LopdfExtractor};
pub use orchestrator::{
    ConversionCause, ConversionOutcome, ConversionStage, ConvertError, Converter,
};
pub use pptx::{AssembleError, DeckAssembler, PptxAssembler, SLIDE_HEIGHT_EMU, SLIDE_WIDTH_EMU};
pub use types::*;
