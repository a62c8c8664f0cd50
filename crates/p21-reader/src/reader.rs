//! Reader façade: bytes in, entity graph and diagnostics out.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::builder::GraphBuilder;
use crate::diagnostic::{Diagnostic, Severity};
use crate::error::Result;
use crate::lexer::Lexer;
use crate::model::Graph;
use crate::options::ReaderOptions;
use crate::parser::Parser;
use crate::token::{KeywordTable, Token};

/// Reads Part 21 exchange structures.
///
/// A `Reader` holds only immutable state, so one instance can serve any
/// number of concurrent reads.
#[derive(Debug, Clone)]
pub struct Reader {
    options: ReaderOptions,
    keywords: KeywordTable,
}

impl Default for Reader {
    fn default() -> Self {
        Self {
            options: ReaderOptions::default(),
            keywords: KeywordTable::new(),
        }
    }
}

impl Reader {
    /// Create a reader with validated options.
    pub fn new(options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            keywords: KeywordTable::new(),
        })
    }

    /// Options this reader was built with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Read a whole stream.
    ///
    /// Only I/O failures are errors; content problems come back as
    /// diagnostics next to whatever graph could be built.
    pub fn read<R: Read>(&self, mut stream: R) -> Result<(Graph, Vec<Diagnostic>)> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Ok(self.read_bytes(&data))
    }

    /// Read a file from a path.
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<(Graph, Vec<Diagnostic>)> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading file");
        let data = std::fs::read(path)?;
        Ok(self.read_bytes(&data))
    }

    /// Read an in-memory buffer. Never fails.
    ///
    /// Diagnostics are ordered by position.
    pub fn read_bytes(&self, data: &[u8]) -> (Graph, Vec<Diagnostic>) {
        let builder =
            GraphBuilder::new().check_scope_visibility(self.options.check_scope_visibility);
        let (builder, mut diagnostics) =
            Parser::new(data, &self.keywords, &self.options, builder).parse();
        let (graph, unresolved) = builder.finish();
        diagnostics.extend(unresolved);
        diagnostics.sort_by_key(|d| d.pos);

        debug!(
            bytes = data.len(),
            entities = graph.entities.len(),
            header = graph.header.len(),
            errors = diagnostics
                .iter()
                .filter(|d| d.severity() == Severity::Error)
                .count(),
            diagnostics = diagnostics.len(),
            "read complete"
        );
        (graph, diagnostics)
    }

    /// Run only the lexer, comments included.
    pub fn tokens(&self, data: &[u8]) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut lexer = Lexer::new(data, &self.keywords);
        let tokens: Vec<Token> = lexer.by_ref().collect();
        (tokens, lexer.take_diagnostics())
    }
}

/// Read a Part 21 stream with default options.
///
/// # Arguments
///
/// * `stream` - Any byte source
///
/// # Returns
///
/// The entity graph and the diagnostics found while reading.
pub fn read<R: Read>(stream: R) -> Result<(Graph, Vec<Diagnostic>)> {
    Reader::default().read(stream)
}

/// Read a Part 21 file from a path with default options.
///
/// # Arguments
///
/// * `path` - Path to the file
///
/// # Returns
///
/// The entity graph and the diagnostics found while reading.
pub fn read_path(path: impl AsRef<Path>) -> Result<(Graph, Vec<Diagnostic>)> {
    Reader::default().read_path(path)
}

/// Read a Part 21 file from a byte buffer with default options.
///
/// # Arguments
///
/// * `data` - Raw file contents
///
/// # Returns
///
/// The entity graph and the diagnostics found while reading.
pub fn read_from_buffer(data: &[u8]) -> (Graph, Vec<Diagnostic>) {
    Reader::default().read_bytes(data)
}
