pub mod annotate;
pub mod config;
pub mod docx;
pub mod engine;
pub mod error;
pub mod ir;
pub mod render;
pub mod snapshot;
pub mod substitute;
pub mod vocabulary;

pub use annotate::BlockModel;
pub use engine::{DocumentEngine, DocumentKind, TemplateLoader};
pub use error::{DocError, Result};
pub use ir::{Block, BlockLocator, PartName};
pub use substitute::{ReplacementMap, Substitutor};
