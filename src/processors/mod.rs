//! Document processors

pub mod document;
pub mod reflow;
pub mod walker;

pub use document::{DocumentProcessor, TranslatedDocument};
pub use walker::{TranslationWalker, WalkReport};
