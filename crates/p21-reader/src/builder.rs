//! Entity graph builder.
//!
//! Consumes [`BuildEvent`]s and accumulates a [`Graph`]. References are kept
//! as ids while building; [`GraphBuilder::finish`] runs one resolution pass
//! over the finished data and reports what could not be resolved.

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::event::{BuildEvent, EventSink, SectionKind};
use crate::model::{DataSection, Entity, Graph, HeaderEntity, Parameter, Resolution, Scope};
use crate::position::Position;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// A record between `BeginEntity` and `EndEntity`.
#[derive(Debug)]
struct Pending {
    id: Option<u64>,
    type_names: Vec<String>,
    parameters: Vec<Parameter>,
    pos: Position,
}

/// Builds a [`Graph`] from build events.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    diagnostics: Vec<Diagnostic>,
    check_scope_visibility: bool,
    section: Option<SectionKind>,
    pending: Option<Pending>,
    open_scopes: Vec<usize>,
    positions: BTreeMap<u64, Position>,
    next_order: usize,
    /// Position of the latest event that carried one.
    last_pos: Position,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            graph: Graph::default(),
            diagnostics: Vec::new(),
            check_scope_visibility: true,
            section: None,
            pending: None,
            open_scopes: Vec::new(),
            positions: BTreeMap::new(),
            next_order: 0,
            last_pos: Position::default(),
        }
    }

    /// Enable or disable the scope visibility checks in [`finish`](Self::finish).
    pub fn check_scope_visibility(mut self, enabled: bool) -> Self {
        self.check_scope_visibility = enabled;
        self
    }

    /// Apply one event.
    pub fn apply(&mut self, event: BuildEvent) {
        match event {
            BuildEvent::BeginSection {
                kind,
                parameters,
                pos,
            } => self.begin_section(kind, parameters, pos),
            BuildEvent::EndSection => self.end_section(),
            BuildEvent::BeginEntity {
                id,
                type_names,
                pos,
            } => self.begin_entity(id, type_names, pos),
            BuildEvent::AddParameter(parameter) => self.add_parameter(parameter),
            BuildEvent::EndEntity => self.end_entity(),
            BuildEvent::BeginScope { owner, pos } => self.begin_scope(owner, pos),
            BuildEvent::EndScope { exports, pos } => self.end_scope(exports, pos),
        }
    }

    /// Open a header or data section.
    pub fn begin_section(&mut self, kind: SectionKind, parameters: Vec<Parameter>, pos: Position) {
        self.last_pos = pos;
        if self.section.is_some() {
            self.protocol(pos, "section opened before the previous one ended");
            self.drop_pending();
        }
        if kind == SectionKind::Data {
            self.graph.sections.push(DataSection {
                parameters,
                line: pos.line,
            });
        }
        self.section = Some(kind);
    }

    /// Close the current section.
    pub fn end_section(&mut self) {
        if self.section.is_none() {
            self.protocol(self.last_pos, "section ended but none is open");
        }
        self.drop_pending();
        self.section = None;
    }

    /// Start a record. Header records have no id.
    pub fn begin_entity(&mut self, id: Option<u64>, type_names: Vec<String>, pos: Position) {
        self.drop_pending();
        self.last_pos = pos;
        if type_names.is_empty() {
            self.protocol(pos, "entity without a type name");
            return;
        }
        self.pending = Some(Pending {
            id,
            type_names,
            parameters: Vec::new(),
            pos,
        });
    }

    /// Append a top-level parameter to the current record.
    pub fn add_parameter(&mut self, parameter: Parameter) {
        match self.pending.as_mut() {
            Some(pending) => pending.parameters.push(parameter),
            None => self.protocol(self.last_pos, "parameter outside an entity"),
        }
    }

    /// Complete the current record.
    pub fn end_entity(&mut self) {
        let Some(pending) = self.pending.take() else {
            self.protocol(self.last_pos, "entity ended but none is open");
            return;
        };
        match (self.section, pending.id) {
            (Some(SectionKind::Header), None) => {
                let Pending {
                    type_names,
                    parameters,
                    pos,
                    ..
                } = pending;
                self.graph.header.push(HeaderEntity {
                    type_name: type_names.into_iter().next().unwrap_or_default(),
                    parameters,
                    line: pos.line,
                });
            }
            (Some(SectionKind::Data), Some(id)) => self.insert_entity(id, pending),
            (_, id) => {
                let detail = match id {
                    Some(id) => format!("entity #{id} outside a data section"),
                    None => "record without id outside the header section".to_string(),
                };
                self.protocol(pending.pos, detail);
            }
        }
    }

    fn insert_entity(&mut self, id: u64, pending: Pending) {
        if let Some(first) = self.graph.entities.get(&id) {
            let first_line = first.line;
            self.diagnostics.push(Diagnostic::new(
                pending.pos,
                DiagnosticKind::DuplicateId { id, first_line },
            ));
            return;
        }

        let scope = self.open_scopes.last().copied();
        if let Some(index) = scope {
            if let Some(s) = self.graph.scopes.get_mut(index) {
                s.members.push(id);
            }
        }
        let entity = Entity {
            id,
            type_names: pending.type_names,
            parameters: pending.parameters,
            line: pending.pos.line,
            order: self.next_order,
            section: self.graph.sections.len().saturating_sub(1),
            scope,
        };
        self.next_order += 1;
        self.positions.insert(id, pending.pos);
        self.graph.entities.insert(id, entity);
    }

    /// Open a scope, nested in the current one if any.
    pub fn begin_scope(&mut self, owner: Option<u64>, pos: Position) {
        self.last_pos = pos;
        self.graph.scopes.push(Scope {
            owner,
            parent: self.open_scopes.last().copied(),
            members: Vec::new(),
            exports: Vec::new(),
            line: pos.line,
        });
        self.open_scopes.push(self.graph.scopes.len() - 1);
    }

    /// Close the innermost scope.
    pub fn end_scope(&mut self, exports: Vec<u64>, pos: Position) {
        self.last_pos = pos;
        let Some(index) = self.open_scopes.pop() else {
            self.protocol(pos, "scope ended but none is open");
            return;
        };
        for &id in &exports {
            let defined_inside = self
                .graph
                .entities
                .get(&id)
                .is_some_and(|e| self.is_within(e.scope, index));
            if !defined_inside {
                self.diagnostics
                    .push(Diagnostic::new(pos, DiagnosticKind::UnknownExport { id }));
            }
        }
        if let Some(scope) = self.graph.scopes.get_mut(index) {
            scope.exports = exports;
        }
    }

    /// Resolve references and return the graph with every diagnostic.
    pub fn finish(mut self) -> (Graph, Vec<Diagnostic>) {
        self.drop_pending();
        while let Some(index) = self.open_scopes.pop() {
            let line = self.graph.scopes.get(index).map_or(0, |s| s.line);
            self.protocol(
                Position::new(line, 1),
                format!("scope opened on line {line} was never closed"),
            );
        }

        let dangling = self.resolve_references();
        if self.check_scope_visibility && !self.graph.scopes.is_empty() {
            self.check_visibility();
        }
        debug!(
            entities = self.graph.entities.len(),
            dangling,
            "resolved references"
        );
        (self.graph, self.diagnostics)
    }

    /// Mark every reference resolved or dangling; returns the number of
    /// dangling (from, to) pairs.
    fn resolve_references(&mut self) -> usize {
        let known: HashSet<u64> = self.graph.entities.keys().copied().collect();
        let mut missing = BTreeSet::new();
        for entity in self.graph.entities.values_mut() {
            let from = entity.id;
            for parameter in &mut entity.parameters {
                parameter.visit_refs_mut(&mut |r| {
                    if known.contains(&r.id) {
                        r.resolution = Resolution::Resolved;
                    } else {
                        r.resolution = Resolution::Dangling;
                        missing.insert((from, r.id));
                    }
                });
            }
        }
        for &(from, to) in &missing {
            let pos = self.position_of(from);
            self.diagnostics
                .push(Diagnostic::new(pos, DiagnosticKind::DanglingReference { from, to }));
        }
        missing.len()
    }

    fn check_visibility(&mut self) {
        let mut hidden = BTreeSet::new();
        for entity in self.graph.entities.values() {
            for to in entity.references() {
                if let Some(target) = self.graph.entities.get(&to) {
                    if !self.is_visible(entity, target) {
                        hidden.insert((entity.id, to));
                    }
                }
            }
        }
        for (from, to) in hidden {
            let pos = self.position_of(from);
            self.diagnostics
                .push(Diagnostic::new(pos, DiagnosticKind::HiddenReference { from, to }));
        }
    }

    /// Whether `target` can be referenced from `from`.
    ///
    /// Walks outwards from the target's scope: each scope that exports the
    /// target lifts it into the enclosing scope.
    fn is_visible(&self, from: &Entity, target: &Entity) -> bool {
        let mut scope = target.scope;
        while let Some(index) = scope {
            if self.is_within(from.scope, index) {
                return true;
            }
            let Some(s) = self.graph.scopes.get(index) else {
                return true;
            };
            if s.owner == Some(from.id) {
                return true;
            }
            if !s.exports.contains(&target.id) {
                return false;
            }
            scope = s.parent;
        }
        true
    }

    /// Whether `scope` is `ancestor` or nested inside it.
    fn is_within(&self, mut scope: Option<usize>, ancestor: usize) -> bool {
        while let Some(index) = scope {
            if index == ancestor {
                return true;
            }
            scope = self.graph.scopes.get(index).and_then(|s| s.parent);
        }
        false
    }

    fn drop_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            let name = pending
                .id
                .map(|id| format!("entity #{id}"))
                .unwrap_or_else(|| "header record".to_string());
            self.protocol(pending.pos, format!("{name} was never ended"));
        }
    }

    fn protocol(&mut self, pos: Position, detail: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            pos,
            DiagnosticKind::Protocol {
                detail: detail.into(),
            },
        ));
    }

    fn position_of(&self, id: u64) -> Position {
        self.positions.get(&id).copied().unwrap_or_default()
    }
}

impl EventSink for GraphBuilder {
    fn event(&mut self, event: BuildEvent) {
        self.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: usize) -> Position {
        Position::new(line, 1)
    }

    fn data_builder() -> GraphBuilder {
        let mut builder = GraphBuilder::new();
        builder.begin_section(SectionKind::Data, Vec::new(), pos(1));
        builder
    }

    fn entity(builder: &mut GraphBuilder, id: u64, type_name: &str, parameters: Vec<Parameter>) {
        builder.begin_entity(Some(id), vec![type_name.to_string()], pos(id as usize + 1));
        for parameter in parameters {
            builder.add_parameter(parameter);
        }
        builder.end_entity();
    }

    fn kinds(diags: &[Diagnostic]) -> Vec<&DiagnosticKind> {
        diags.iter().map(|d| &d.kind).collect()
    }

    #[test]
    fn test_forward_reference_resolves() {
        let mut b = data_builder();
        entity(&mut b, 1, "LINE", vec![Parameter::reference(2)]);
        entity(&mut b, 2, "POINT", vec![]);
        b.end_section();
        let (graph, diags) = b.finish();
        assert!(diags.is_empty());
        match &graph.get(1).unwrap().parameters[0] {
            Parameter::Reference(r) => assert!(r.is_resolved()),
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_reported_once_per_pair() {
        let mut b = data_builder();
        entity(
            &mut b,
            1,
            "LINE",
            vec![
                Parameter::reference(3),
                Parameter::List(vec![Parameter::reference(3), Parameter::reference(4)]),
            ],
        );
        let (graph, diags) = b.finish();
        assert_eq!(
            kinds(&diags),
            vec![
                &DiagnosticKind::DanglingReference { from: 1, to: 3 },
                &DiagnosticKind::DanglingReference { from: 1, to: 4 },
            ]
        );
        assert_eq!(diags[0].line(), 2);
        assert!(graph.get(1).is_some());
        assert_eq!(graph.stats().dangling_references, 2);
    }

    #[test]
    fn test_duplicate_first_wins() {
        let mut b = data_builder();
        entity(&mut b, 5, "FIRST", vec![]);
        b.begin_entity(Some(5), vec!["SECOND".into()], pos(9));
        b.end_entity();
        let (graph, diags) = b.finish();
        assert_eq!(graph.get(5).unwrap().type_name(), "FIRST");
        assert_eq!(
            kinds(&diags),
            vec![&DiagnosticKind::DuplicateId { id: 5, first_line: 6 }]
        );
        assert_eq!(diags[0].line(), 9);
    }

    #[test]
    fn test_header_records() {
        let mut b = GraphBuilder::new();
        b.begin_section(SectionKind::Header, Vec::new(), pos(2));
        b.begin_entity(None, vec!["FILE_NAME".into()], pos(3));
        b.add_parameter(Parameter::Text("part.stp".into()));
        b.end_entity();
        b.end_section();
        let (graph, diags) = b.finish();
        assert!(diags.is_empty());
        assert_eq!(graph.header.len(), 1);
        assert_eq!(graph.header[0].type_name, "FILE_NAME");
        assert!(graph.is_empty());
    }

    #[test]
    fn test_protocol_misuse_is_reported() {
        let mut b = GraphBuilder::new();
        b.add_parameter(Parameter::Integer(1));
        b.end_entity();
        b.end_scope(Vec::new(), pos(4));
        b.begin_entity(Some(1), vec!["A".into()], pos(5));
        b.end_entity();
        let (graph, diags) = b.finish();
        assert!(graph.is_empty());
        assert_eq!(diags.len(), 4);
        assert!(diags
            .iter()
            .all(|d| matches!(d.kind, DiagnosticKind::Protocol { .. })));
    }

    #[test]
    fn test_unterminated_entity_is_dropped() {
        let mut b = data_builder();
        b.begin_entity(Some(1), vec!["A".into()], pos(2));
        b.begin_entity(Some(2), vec!["B".into()], pos(3));
        b.end_entity();
        let (graph, diags) = b.finish();
        assert!(graph.get(1).is_none());
        assert!(graph.get(2).is_some());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_order_and_sections() {
        let mut b = data_builder();
        entity(&mut b, 9, "A", vec![]);
        entity(&mut b, 2, "B", vec![]);
        b.end_section();
        b.begin_section(SectionKind::Data, vec![Parameter::Text("second".into())], pos(20));
        entity(&mut b, 4, "C", vec![]);
        let (graph, _) = b.finish();
        let order: Vec<u64> = graph.in_file_order().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![9, 2, 4]);
        assert_eq!(graph.sections.len(), 2);
        assert_eq!(graph.get(4).unwrap().section, 1);
        assert_eq!(graph.get(9).unwrap().section, 0);
    }

    #[test]
    fn test_scope_membership() {
        let mut b = data_builder();
        b.begin_scope(Some(10), pos(2));
        entity(&mut b, 11, "A", vec![]);
        b.end_scope(vec![11], pos(4));
        entity(&mut b, 10, "OWNER", vec![Parameter::reference(11)]);
        let (graph, diags) = b.finish();
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(graph.scopes[0].members, vec![11]);
        assert_eq!(graph.get(11).unwrap().scope, Some(0));
        assert_eq!(graph.get(10).unwrap().scope, None);
    }

    #[test]
    fn test_hidden_reference() {
        let mut b = data_builder();
        b.begin_scope(Some(10), pos(2));
        entity(&mut b, 11, "A", vec![]);
        entity(&mut b, 12, "B", vec![Parameter::reference(11)]);
        b.end_scope(vec![], pos(4));
        entity(&mut b, 10, "OWNER", vec![Parameter::reference(11)]);
        entity(&mut b, 20, "OUTSIDER", vec![Parameter::reference(12)]);
        let (_, diags) = b.finish();
        assert_eq!(
            kinds(&diags),
            vec![&DiagnosticKind::HiddenReference { from: 20, to: 12 }]
        );
        assert!(!diags[0].is_error());
    }

    #[test]
    fn test_export_lifts_one_level() {
        let mut b = data_builder();
        b.begin_scope(None, pos(2));
        b.begin_scope(None, pos(3));
        entity(&mut b, 2, "INNER", vec![]);
        b.end_scope(vec![2], pos(4));
        entity(&mut b, 3, "MIDDLE", vec![Parameter::reference(2)]);
        b.end_scope(vec![], pos(5));
        entity(&mut b, 4, "TOP", vec![Parameter::reference(2)]);
        let (graph, diags) = b.finish();
        assert_eq!(graph.scopes[1].parent, Some(0));
        assert_eq!(
            kinds(&diags),
            vec![&DiagnosticKind::HiddenReference { from: 4, to: 2 }]
        );
    }

    #[test]
    fn test_visibility_check_can_be_disabled() {
        let mut b = data_builder().check_scope_visibility(false);
        b.begin_scope(None, pos(2));
        entity(&mut b, 1, "A", vec![]);
        b.end_scope(vec![], pos(3));
        entity(&mut b, 2, "B", vec![Parameter::reference(1)]);
        let (_, diags) = b.finish();
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unknown_export() {
        let mut b = data_builder();
        entity(&mut b, 1, "A", vec![]);
        b.begin_scope(None, pos(3));
        entity(&mut b, 2, "B", vec![]);
        b.end_scope(vec![1, 2], pos(5));
        let (_, diags) = b.finish();
        assert_eq!(kinds(&diags), vec![&DiagnosticKind::UnknownExport { id: 1 }]);
    }

    #[test]
    fn test_unclosed_scope() {
        let mut b = data_builder();
        b.begin_scope(None, pos(7));
        entity(&mut b, 8, "A", vec![]);
        let (graph, diags) = b.finish();
        assert!(graph.get(8).is_some());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line(), 7);
        assert!(diags[0].is_error());
    }

    #[test]
    fn test_events_apply() {
        let mut b = GraphBuilder::new();
        let events = vec![
            BuildEvent::BeginSection {
                kind: SectionKind::Data,
                parameters: Vec::new(),
                pos: pos(1),
            },
            BuildEvent::BeginEntity {
                id: Some(1),
                type_names: vec!["A".into(), "B".into()],
                pos: pos(2),
            },
            BuildEvent::AddParameter(Parameter::List(vec![])),
            BuildEvent::AddParameter(Parameter::List(vec![Parameter::Integer(1)])),
            BuildEvent::EndEntity,
            BuildEvent::EndSection,
        ];
        for event in events {
            b.event(event);
        }
        let (graph, diags) = b.finish();
        assert!(diags.is_empty());
        let e = graph.get(1).unwrap();
        assert!(e.is_complex());
        assert_eq!(e.partial("B"), Some(&[Parameter::Integer(1)][..]));
    }
}
