//! Chart text: lexing, parsing, serialization and multi-chart documents.

pub mod document;
pub mod lexer;
pub mod parser;
pub mod serializer;

pub use document::{parse_document, Document};
pub use parser::{build_chart, parse_fragment, split_fragments, Fragment, ParserSession};
pub use serializer::render_dsl;
