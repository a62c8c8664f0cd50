#![warn(missing_docs)]

//! Reader for ISO 10303-21 exchange structures (STEP physical files).
//!
//! Turns a byte stream into an in-memory graph of generic entity records.
//! The pipeline is lexer, parser, build events, graph builder and a final
//! reference resolution pass. Nothing is interpreted: type names are opaque
//! strings and parameters stay generic.
//!
//! Problems with the content never abort a read. They are returned as
//! [`Diagnostic`]s next to whatever part of the graph could be built.
//!
//! # Example
//!
//! ```no_run
//! use p21_reader::{read_path, has_structural_errors, EntityArgs};
//!
//! let (graph, diagnostics) = read_path("model.step").unwrap();
//! for d in &diagnostics {
//!     eprintln!("{d}");
//! }
//! if !has_structural_errors(&diagnostics) {
//!     for point in graph.entities_of_type("CARTESIAN_POINT") {
//!         let coords = point.real_list(1).unwrap();
//!         println!("#{} {:?}", point.id, coords);
//!     }
//! }
//! ```

mod args;
mod builder;
mod coerce;
mod diagnostic;
mod error;
mod event;
mod lexer;
mod model;
mod options;
mod parser;
mod position;
mod reader;
mod token;

pub use args::EntityArgs;
pub use builder::GraphBuilder;
pub use coerce::{coerce, decode_control_directives, Coerced, Literal};
pub use diagnostic::{has_structural_errors, Diagnostic, DiagnosticKind, Severity};
pub use error::{ArgError, ReadError, Result};
pub use event::{BuildEvent, EventSink, SectionKind};
pub use lexer::Lexer;
pub use model::{
    DataSection, Entity, EntityRef, Graph, GraphStats, HeaderEntity, Parameter, Resolution,
    Scope,
};
pub use options::ReaderOptions;
pub use parser::Parser;
pub use position::Position;
pub use reader::{read, read_from_buffer, read_path, Reader};
pub use token::{KeywordTable, Token, TokenKind};
