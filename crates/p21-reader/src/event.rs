//! Build events passed from the parser to a graph builder.

use crate::model::Parameter;
use crate::position::Position;
use serde::Serialize;

/// Which kind of section a [`BuildEvent::BeginSection`] opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// `HEADER;`
    Header,
    /// `DATA;` or `DATA(...);`
    Data,
}

/// One step of graph construction.
///
/// A complete record always arrives as `BeginEntity`, zero or more
/// `AddParameter`, then `EndEntity`.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    /// A section starts.
    BeginSection {
        /// Header or data.
        kind: SectionKind,
        /// `DATA(...)` parameters; empty otherwise.
        parameters: Vec<Parameter>,
        /// Position of the section keyword.
        pos: Position,
    },
    /// The current section ends.
    EndSection,
    /// A record starts. Header records have no id.
    BeginEntity {
        /// Entity id, `None` in the header.
        id: Option<u64>,
        /// One type name, or the partial names of a complex instance.
        type_names: Vec<String>,
        /// Position of the `#id` (or the type name in the header).
        pos: Position,
    },
    /// One top-level parameter of the current record.
    AddParameter(Parameter),
    /// The current record is complete.
    EndEntity,
    /// A `&SCOPE` block opens.
    BeginScope {
        /// Entity owning the scope, for `#id = &SCOPE ...`.
        owner: Option<u64>,
        /// Position of `&SCOPE`.
        pos: Position,
    },
    /// The innermost scope closes.
    EndScope {
        /// Exported ids.
        exports: Vec<u64>,
        /// Position of `ENDSCOPE`.
        pos: Position,
    },
}

/// Receiver of [`BuildEvent`]s.
pub trait EventSink {
    /// Handle one event.
    fn event(&mut self, event: BuildEvent);
}

/// Collects events, mostly useful in tests.
impl EventSink for Vec<BuildEvent> {
    fn event(&mut self, event: BuildEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn event(&mut self, event: BuildEvent) {
        (**self).event(event);
    }
}
