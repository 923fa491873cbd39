//! Prompt context: retrieval merge, style exemplars, token counting and
//! final prompt assembly.

pub mod assembler;
pub mod merger;
pub mod style;
pub mod token;

pub use assembler::{PromptAssembler, PromptParts};
pub use merger::{merge_chunks, render_chunk, render_context, RetrievalMerger, DEFAULT_CHUNK_CHAR_CAP};
pub use style::{format_style_exemplars, ExchangeLabels};
pub use token::{CharHeuristicCounter, TiktokenCounter, TokenCounter};
