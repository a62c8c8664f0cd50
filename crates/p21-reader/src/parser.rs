//! Part 21 parser: recognizes the file grammar and emits build events.
//!
//! The parser constructs nothing itself. It pulls tokens from the lexer with a
//! single token of lookahead and reports what it recognized to an
//! [`EventSink`]. A record is parsed completely before any of its events are
//! emitted, so a malformed record never reaches the sink.
//!
//! Errors inside a record are reported and the parser resynchronizes at the
//! next `;`, the next entity id at the record's own nesting depth, or the next
//! section or scope keyword. Broken section and file terminators stop parsing.

use crate::coerce::{coerce, parse_entity_id, Literal};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::event::{BuildEvent, EventSink, SectionKind};
use crate::lexer::Lexer;
use crate::model::Parameter;
use crate::options::ReaderOptions;
use crate::position::Position;
use crate::token::{KeywordTable, Token, TokenKind};
use tracing::{debug, trace};

/// Why the current production was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    /// Skip the current record and resynchronize.
    Record,
    /// Stop parsing altogether.
    Stream,
}

type PResult<T> = Result<T, Abort>;

/// Which token ends a run of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Section,
    Scope,
}

/// Parser for Part 21 exchange structures.
pub struct Parser<'a, S> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
    sink: S,
    diagnostics: Vec<Diagnostic>,
    decode_text: bool,
    max_errors: Option<usize>,
    max_nesting: usize,
    errors: usize,
    /// Tokens consumed so far.
    consumed: usize,
    /// Parenthesis depth inside the current record.
    depth: usize,
}

impl<'a, S: EventSink> Parser<'a, S> {
    /// Create a parser over `input` that reports to `sink`.
    pub fn new(
        input: &'a [u8],
        keywords: &'a KeywordTable,
        options: &ReaderOptions,
        sink: S,
    ) -> Self {
        Self {
            lexer: Lexer::new(input, keywords),
            lookahead: None,
            sink,
            diagnostics: Vec::new(),
            decode_text: options.decode_text,
            max_errors: options.max_errors,
            max_nesting: options.max_nesting,
            errors: 0,
            consumed: 0,
            depth: 0,
        }
    }

    /// Parse the whole input.
    ///
    /// Returns the sink and every lexical and grammar diagnostic, in the order
    /// they were found.
    pub fn parse(mut self) -> (S, Vec<Diagnostic>) {
        if self.parse_file().is_err() {
            debug!(errors = self.errors, "parsing stopped early");
        }
        self.diagnostics.extend(self.lexer.take_diagnostics());
        (self.sink, self.diagnostics)
    }

    fn parse_file(&mut self) -> PResult<()> {
        if self.advance_if(TokenKind::FileBegin).is_some() {
            if self.advance_if(TokenKind::Semicolon).is_none() {
                let abort = self.unexpected(None, "';'");
                recoverable(abort)?;
            }
        } else {
            let abort = self.unexpected(None, TokenKind::FileBegin.describe());
            recoverable(abort)?;
        }

        if self.check(TokenKind::SectionStart) {
            self.parse_header()?;
        } else {
            let abort = self.unexpected(None, TokenKind::SectionStart.describe());
            recoverable(abort)?;
        }

        loop {
            match self.peek_kind() {
                Some(TokenKind::DataSection) => self.parse_data_section()?,
                Some(TokenKind::FileEnd) => {
                    self.advance();
                    self.expect_terminator()?;
                    return Ok(());
                }
                None => {
                    let pos = self.lexer.position();
                    return Err(self.fatal(
                        pos,
                        DiagnosticKind::UnexpectedEof {
                            expected: TokenKind::FileEnd.describe().into(),
                        },
                    ));
                }
                Some(_) => {
                    let abort = self.unexpected(None, "'DATA' or 'END-ISO-10303-21'");
                    recoverable(abort)?;
                    self.skip_to_section();
                }
            }
        }
    }

    fn parse_header(&mut self) -> PResult<()> {
        let pos = self.here();
        self.advance();
        if self.advance_if(TokenKind::Semicolon).is_none() {
            let abort = self.unexpected(None, "';'");
            recoverable(abort)?;
        }
        debug!(line = pos.line, "header section");
        self.sink.event(BuildEvent::BeginSection {
            kind: SectionKind::Header,
            parameters: Vec::new(),
            pos,
        });

        loop {
            match self.peek_kind() {
                Some(TokenKind::SectionEnd) => {
                    self.advance();
                    return self.end_section();
                }
                Some(TokenKind::TypeName | TokenKind::Identifier) => {
                    let before = self.consumed;
                    let result = self.parse_header_record();
                    self.recover(result, before)?;
                }
                Some(TokenKind::DataSection | TokenKind::FileEnd) | None => {
                    return Err(self.fatal_unexpected(TokenKind::SectionEnd.describe()));
                }
                Some(_) => {
                    let abort = self.unexpected(None, "header record");
                    recoverable(abort)?;
                    self.advance();
                    self.depth = 0;
                    self.resync();
                }
            }
        }
    }

    fn parse_header_record(&mut self) -> PResult<()> {
        self.depth = 0;
        let pos = self.here();
        let type_name = match self.advance() {
            Some(tok) => tok.lexeme,
            None => return Err(self.unexpected(None, "type name")),
        };
        let parameters = self.parse_arg_list(None)?;
        self.expect(TokenKind::Semicolon, None)?;
        self.emit_entity(None, vec![type_name], parameters, pos);
        Ok(())
    }

    fn parse_data_section(&mut self) -> PResult<()> {
        let pos = self.here();
        self.advance();

        let parameters = match self.parse_data_header() {
            Ok(parameters) => parameters,
            Err(Abort::Record) => {
                self.resync();
                Vec::new()
            }
            Err(Abort::Stream) => return Err(Abort::Stream),
        };
        debug!(line = pos.line, "data section");
        self.sink.event(BuildEvent::BeginSection {
            kind: SectionKind::Data,
            parameters,
            pos,
        });

        self.parse_records(Block::Section)?;
        if self.advance_if(TokenKind::SectionEnd).is_some() {
            self.end_section()
        } else {
            Err(self.fatal_unexpected(TokenKind::SectionEnd.describe()))
        }
    }

    fn parse_data_header(&mut self) -> PResult<Vec<Parameter>> {
        self.depth = 0;
        let parameters = if self.check(TokenKind::LParen) {
            self.parse_arg_list(None)?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Semicolon, None)?;
        Ok(parameters)
    }

    /// `ENDSEC` has been consumed; its `;` is mandatory.
    fn end_section(&mut self) -> PResult<()> {
        self.sink.event(BuildEvent::EndSection);
        self.expect_terminator()
    }

    /// Parse records and scope blocks until a token that ends `block`.
    ///
    /// The terminating token is left for the caller.
    fn parse_records(&mut self, block: Block) -> PResult<()> {
        loop {
            let before = self.consumed;
            match self.peek_kind() {
                Some(TokenKind::EntityId) => {
                    let result = self.parse_record();
                    self.recover(result, before)?;
                }
                Some(TokenKind::ScopeStart) => {
                    let result = self.parse_scope_block();
                    self.recover(result, before)?;
                }
                Some(TokenKind::SectionEnd | TokenKind::DataSection | TokenKind::FileEnd) | None => {
                    return Ok(());
                }
                Some(TokenKind::ScopeEnd) if block == Block::Scope => return Ok(()),
                Some(_) => {
                    let abort = self.unexpected(None, "entity instance");
                    self.recover(Err(abort), before)?;
                }
            }
        }
    }

    /// `#id = Instance ;` or `#id = &SCOPE ... ENDSCOPE [/ ids /] Instance ;`
    fn parse_record(&mut self) -> PResult<()> {
        self.depth = 0;
        let pos = self.here();
        let id = match self.advance() {
            Some(tok) => self.entity_id(&tok)?,
            None => return Err(self.unexpected(None, "entity id")),
        };
        self.expect(TokenKind::Equals, Some(id))?;

        if self.check(TokenKind::ScopeStart) {
            let scope_pos = self.here();
            self.advance();
            self.sink.event(BuildEvent::BeginScope {
                owner: Some(id),
                pos: scope_pos,
            });
            self.parse_owned_scope(id)?;
            self.depth = 0;
        }

        let (type_names, parameters) = self.parse_instance(id)?;
        self.expect(TokenKind::Semicolon, Some(id))?;
        self.emit_entity(Some(id), type_names, parameters, pos);
        Ok(())
    }

    /// Body and export list of `#id = &SCOPE`; the scope is closed on every path.
    fn parse_owned_scope(&mut self, owner: u64) -> PResult<()> {
        let end_pos = match self.scope_body() {
            Ok(pos) => pos,
            Err(abort) => {
                self.close_scope(Vec::new());
                return Err(abort);
            }
        };

        let mut exports = Vec::new();
        if self.advance_if(TokenKind::Slash).is_some() {
            let list = self.parse_export_list(owner);
            match list {
                Ok(ids) => exports = ids,
                Err(abort) => {
                    self.close_scope(Vec::new());
                    return Err(abort);
                }
            }
        }
        self.sink.event(BuildEvent::EndScope {
            exports,
            pos: end_pos,
        });
        Ok(())
    }

    /// `/` has been consumed: `#id (, #id)* /`.
    fn parse_export_list(&mut self, owner: u64) -> PResult<Vec<u64>> {
        let mut ids = Vec::new();
        loop {
            let tok = self.expect(TokenKind::EntityId, Some(owner))?;
            ids.push(self.entity_id(&tok)?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.advance();
                }
                Some(TokenKind::Slash) => {
                    self.advance();
                    return Ok(ids);
                }
                _ => return Err(self.unexpected(Some(owner), "',' or '/'")),
            }
        }
    }

    /// `&SCOPE #id... / records ENDSCOPE`
    fn parse_scope_block(&mut self) -> PResult<()> {
        self.depth = 0;
        let pos = self.here();
        self.advance();

        let mut exports = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::EntityId) => {
                    if let Some(tok) = self.advance() {
                        exports.push(self.entity_id(&tok)?);
                    }
                    self.advance_if(TokenKind::Comma);
                }
                Some(TokenKind::Slash) => {
                    self.advance();
                    break;
                }
                _ => return Err(self.unexpected(None, "entity id or '/'")),
            }
        }

        self.sink.event(BuildEvent::BeginScope { owner: None, pos });
        match self.scope_body() {
            Ok(end_pos) => {
                self.sink.event(BuildEvent::EndScope {
                    exports,
                    pos: end_pos,
                });
                Ok(())
            }
            Err(abort) => {
                self.close_scope(Vec::new());
                Err(abort)
            }
        }
    }

    /// Records up to and including `ENDSCOPE`; returns the position of `ENDSCOPE`.
    fn scope_body(&mut self) -> PResult<Position> {
        self.parse_records(Block::Scope)?;
        let pos = self.here();
        match self.advance_if(TokenKind::ScopeEnd) {
            Some(_) => Ok(pos),
            None => Err(self.unexpected(None, TokenKind::ScopeEnd.describe())),
        }
    }

    fn close_scope(&mut self, exports: Vec<u64>) {
        let pos = self.here();
        self.sink.event(BuildEvent::EndScope { exports, pos });
    }

    /// `TypeName ArgList` or `( (TypeName ArgList)+ )`.
    fn parse_instance(&mut self, id: u64) -> PResult<(Vec<String>, Vec<Parameter>)> {
        match self.peek_kind() {
            Some(TokenKind::TypeName | TokenKind::Identifier) => {
                let type_name = self.advance().map(|t| t.lexeme).unwrap_or_default();
                let parameters = self.parse_arg_list(Some(id))?;
                Ok((vec![type_name], parameters))
            }
            Some(TokenKind::LParen) => {
                self.advance();
                self.depth += 1;
                let mut type_names = Vec::new();
                let mut parameters = Vec::new();
                loop {
                    match self.peek_kind() {
                        Some(TokenKind::TypeName | TokenKind::Identifier) => {
                            let type_name = self.advance().map(|t| t.lexeme).unwrap_or_default();
                            let args = self.parse_arg_list(Some(id))?;
                            type_names.push(type_name);
                            parameters.push(Parameter::List(args));
                        }
                        Some(TokenKind::RParen) if !type_names.is_empty() => {
                            self.advance();
                            self.depth -= 1;
                            return Ok((type_names, parameters));
                        }
                        _ => return Err(self.unexpected(Some(id), "type name")),
                    }
                }
            }
            _ => Err(self.unexpected(Some(id), "type name")),
        }
    }

    /// `( [Parameter (, Parameter)*] )`
    fn parse_arg_list(&mut self, entity: Option<u64>) -> PResult<Vec<Parameter>> {
        let open = self.expect(TokenKind::LParen, entity)?;
        self.depth += 1;
        if self.depth > self.max_nesting {
            let limit = self.max_nesting;
            return Err(self.error(open.pos, DiagnosticKind::NestingTooDeep { entity, limit }));
        }
        let mut parameters = Vec::new();
        if self.advance_if(TokenKind::RParen).is_some() {
            self.depth -= 1;
            return Ok(parameters);
        }
        loop {
            parameters.push(self.parse_parameter(entity)?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.advance();
                }
                Some(TokenKind::RParen) => {
                    self.advance();
                    self.depth -= 1;
                    return Ok(parameters);
                }
                _ => return Err(self.unexpected(entity, "',' or ')'")),
            }
        }
    }

    fn parse_parameter(&mut self, entity: Option<u64>) -> PResult<Parameter> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => Ok(Parameter::List(self.parse_arg_list(entity)?)),
            Some(TokenKind::TypeName | TokenKind::Identifier) => {
                let type_name = self.advance().map(|t| t.lexeme).unwrap_or_default();
                let parameters = self.parse_arg_list(entity)?;
                Ok(Parameter::Typed {
                    type_name,
                    parameters,
                })
            }
            Some(
                TokenKind::IntegerLiteral
                | TokenKind::RealLiteral
                | TokenKind::EnumLiteral
                | TokenKind::HexLiteral
                | TokenKind::QuotedText
                | TokenKind::EntityId
                | TokenKind::VoidLiteral
                | TokenKind::DerivedLiteral,
            ) => match self.advance() {
                Some(tok) => self.literal(tok, entity),
                None => Err(self.unexpected(entity, "parameter")),
            },
            _ => Err(self.unexpected(entity, "parameter")),
        }
    }

    fn literal(&mut self, tok: Token, entity: Option<u64>) -> PResult<Parameter> {
        let coerced = match coerce(&tok, self.decode_text) {
            Ok(coerced) => coerced,
            Err(kind) => return Err(self.error(tok.pos, kind)),
        };
        if let Some(warning) = coerced.warning {
            self.diagnostics.push(Diagnostic::new(tok.pos, warning));
        }
        Ok(match coerced.literal {
            Literal::Integer(v) => Parameter::Integer(v),
            Literal::Real(v) => Parameter::Real(v),
            Literal::Enum(s) => Parameter::Enum(s),
            Literal::Binary(s) => Parameter::Binary(s),
            Literal::Text(s) => Parameter::Text(s),
            Literal::EntityId(id) => Parameter::reference(id),
            Literal::Void => Parameter::Void,
            Literal::Derived => Parameter::Derived,
            Literal::Keyword(_) | Literal::Punct(_) => {
                let kind = DiagnosticKind::UnexpectedToken {
                    entity,
                    expected: "parameter".into(),
                    found: tok.to_string(),
                };
                return Err(self.error(tok.pos, kind));
            }
        })
    }

    fn emit_entity(
        &mut self,
        id: Option<u64>,
        type_names: Vec<String>,
        parameters: Vec<Parameter>,
        pos: Position,
    ) {
        self.sink.event(BuildEvent::BeginEntity { id, type_names, pos });
        for parameter in parameters {
            self.sink.event(BuildEvent::AddParameter(parameter));
        }
        self.sink.event(BuildEvent::EndEntity);
    }

    fn entity_id(&mut self, tok: &Token) -> PResult<u64> {
        parse_entity_id(&tok.lexeme).map_err(|kind| self.error(tok.pos, kind))
    }

    // Recovery

    /// Turn a record-level abort into a resynchronization.
    fn recover(&mut self, result: PResult<()>, before: usize) -> PResult<()> {
        match result {
            Err(Abort::Record) => {
                self.resync();
                if self.consumed == before {
                    self.advance();
                }
                Ok(())
            }
            other => other,
        }
    }

    fn resync(&mut self) {
        let mut depth = self.depth;
        let mut skipped = 0usize;
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Semicolon => {
                    self.advance();
                    skipped += 1;
                    break;
                }
                TokenKind::EntityId if depth == 0 => break,
                TokenKind::SectionEnd
                | TokenKind::ScopeStart
                | TokenKind::ScopeEnd
                | TokenKind::DataSection
                | TokenKind::FileEnd => break,
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
            skipped += 1;
        }
        self.depth = 0;
        let pos = self.here();
        trace!(skipped, %pos, "resynchronized");
    }

    /// Skip stray top-level tokens up to the next section or the file end.
    fn skip_to_section(&mut self) {
        while let Some(kind) = self.peek_kind() {
            if matches!(kind, TokenKind::DataSection | TokenKind::FileEnd) {
                break;
            }
            self.advance();
        }
    }

    // Diagnostics

    fn error(&mut self, pos: Position, kind: DiagnosticKind) -> Abort {
        self.diagnostics.push(Diagnostic::new(pos, kind));
        self.errors += 1;
        match self.max_errors {
            Some(limit) if self.errors >= limit => {
                self.diagnostics
                    .push(Diagnostic::new(pos, DiagnosticKind::TooManyErrors { limit }));
                Abort::Stream
            }
            _ => Abort::Record,
        }
    }

    fn fatal(&mut self, pos: Position, kind: DiagnosticKind) -> Abort {
        self.diagnostics.push(Diagnostic::new(pos, kind));
        self.errors += 1;
        Abort::Stream
    }

    /// Report the lookahead as unexpected. End of input is always fatal.
    fn unexpected(&mut self, entity: Option<u64>, expected: &str) -> Abort {
        let (pos, kind, at_eof) = self.unexpected_kind(entity, expected);
        if at_eof {
            self.fatal(pos, kind)
        } else {
            self.error(pos, kind)
        }
    }

    fn fatal_unexpected(&mut self, expected: &str) -> Abort {
        let (pos, kind, _) = self.unexpected_kind(None, expected);
        self.fatal(pos, kind)
    }

    fn unexpected_kind(
        &mut self,
        entity: Option<u64>,
        expected: &str,
    ) -> (Position, DiagnosticKind, bool) {
        match self.peek().map(|t| (t.pos, t.to_string())) {
            Some((pos, found)) => (
                pos,
                DiagnosticKind::UnexpectedToken {
                    entity,
                    expected: expected.into(),
                    found,
                },
                false,
            ),
            None => (
                self.lexer.position(),
                DiagnosticKind::UnexpectedEof {
                    expected: expected.into(),
                },
                true,
            ),
        }
    }

    /// The `;` after `ENDSEC` or `END-ISO-10303-21`.
    fn expect_terminator(&mut self) -> PResult<()> {
        match self.advance_if(TokenKind::Semicolon) {
            Some(_) => Ok(()),
            None => Err(self.fatal_unexpected("';'")),
        }
    }

    // Token access

    fn pull(&mut self) -> Option<Token> {
        loop {
            let token = self.lexer.next_token();
            self.diagnostics.extend(self.lexer.take_diagnostics());
            match token {
                Some(tok) if tok.kind.is_trivia() => continue,
                other => return other,
            }
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = self.pull();
        }
        self.lookahead.as_ref()
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    /// Position of the lookahead, or of the end of input.
    fn here(&mut self) -> Position {
        match self.peek() {
            Some(tok) => tok.pos,
            None => self.lexer.position(),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.lookahead.take().or_else(|| self.pull());
        if token.is_some() {
            self.consumed += 1;
        }
        token
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn advance_if(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            self.advance()
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, entity: Option<u64>) -> PResult<Token> {
        match self.advance_if(kind) {
            Some(tok) => Ok(tok),
            None => Err(self.unexpected(entity, kind.describe())),
        }
    }
}

/// Continue after a reported problem unless the error budget ran out.
fn recoverable(abort: Abort) -> PResult<()> {
    match abort {
        Abort::Record => Ok(()),
        Abort::Stream => Err(Abort::Stream),
    }
}
