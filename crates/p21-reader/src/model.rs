//! In-memory entity graph built from an exchange structure.
//!
//! The graph owns every entity, keyed by id. A reference parameter is only a
//! back-link by id plus the cached outcome of the resolution pass, so cycles
//! between entities need no special handling.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of resolving an [`EntityRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Not looked at yet (only seen before [`GraphBuilder::finish`](crate::GraphBuilder::finish)).
    Unresolved,
    /// The target exists in the graph.
    Resolved,
    /// The target id is not defined anywhere.
    Dangling,
}

/// Reference to another entity by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntityRef {
    /// Target id.
    pub id: u64,
    /// Cached resolution state.
    pub resolution: Resolution,
}

impl EntityRef {
    /// New unresolved reference.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            resolution: Resolution::Unresolved,
        }
    }

    /// Whether the target was found.
    pub fn is_resolved(&self) -> bool {
        self.resolution == Resolution::Resolved
    }
}

/// A single argument value of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Parameter {
    /// Integer number.
    Integer(i64),
    /// Real number.
    Real(f64),
    /// Enumeration (e.g., `.TRUE.` is `Enum("TRUE")`).
    Enum(String),
    /// Binary as hex digits, leading unused-bits digit included.
    Binary(String),
    /// Text.
    Text(String),
    /// Entity reference (e.g., `#123`).
    Reference(EntityRef),
    /// Null/unset value (`$`).
    Void,
    /// Derived value (`*`).
    Derived,
    /// List of values (nested in parentheses).
    List(Vec<Parameter>),
    /// Typed value: `TYPE_NAME(args)`, e.g. `LENGTH_MEASURE(2.5)`.
    Typed {
        /// The type name.
        type_name: String,
        /// Arguments.
        parameters: Vec<Parameter>,
    },
}

impl Parameter {
    /// Shorthand for an unresolved reference.
    pub fn reference(id: u64) -> Self {
        Parameter::Reference(EntityRef::new(id))
    }

    /// Try to get as an entity reference id.
    pub fn as_reference(&self) -> Option<u64> {
        match self {
            Parameter::Reference(r) => Some(r.id),
            _ => None,
        }
    }

    /// Try to get as a real number (also accepts integer).
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Parameter::Real(v) => Some(*v),
            Parameter::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Parameter::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Parameter::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an enum.
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Parameter::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get a `.T.` / `.F.` enumeration as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_enum()? {
            "T" | "TRUE" => Some(true),
            "F" | "FALSE" => Some(false),
            _ => None,
        }
    }

    /// Try to get as a list.
    pub fn as_list(&self) -> Option<&[Parameter]> {
        match self {
            Parameter::List(v) => Some(v),
            _ => None,
        }
    }

    /// Check if this is `$`.
    pub fn is_void(&self) -> bool {
        matches!(self, Parameter::Void)
    }

    /// Check if this is `*`.
    pub fn is_derived(&self) -> bool {
        matches!(self, Parameter::Derived)
    }

    /// Every reference id inside this parameter, nested ones included.
    pub fn references(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        self.visit_refs(&mut |r| ids.push(r.id));
        ids
    }

    pub(crate) fn visit_refs(&self, f: &mut impl FnMut(&EntityRef)) {
        match self {
            Parameter::Reference(r) => f(r),
            Parameter::List(items) | Parameter::Typed { parameters: items, .. } => {
                for item in items {
                    item.visit_refs(f);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn visit_refs_mut(&mut self, f: &mut impl FnMut(&mut EntityRef)) {
        match self {
            Parameter::Reference(r) => f(r),
            Parameter::List(items) | Parameter::Typed { parameters: items, .. } => {
                for item in items {
                    item.visit_refs_mut(f);
                }
            }
            _ => {}
        }
    }

    fn count(&self) -> usize {
        match self {
            Parameter::List(items) | Parameter::Typed { parameters: items, .. } => {
                1 + items.iter().map(Parameter::count).sum::<usize>()
            }
            _ => 1,
        }
    }
}

/// An entity instance of the data section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Entity id (from `#123`).
    pub id: u64,
    /// Type name; several for a complex instance.
    pub type_names: Vec<String>,
    /// Arguments. For a complex instance, one [`Parameter::List`] per type name.
    pub parameters: Vec<Parameter>,
    /// Line of the `#id`.
    pub line: usize,
    /// Position among all entities in file order.
    pub order: usize,
    /// Index into [`Graph::sections`].
    pub section: usize,
    /// Index into [`Graph::scopes`] of the innermost enclosing scope.
    pub scope: Option<usize>,
}

impl Entity {
    /// First (or only) type name.
    pub fn type_name(&self) -> &str {
        self.type_names.first().map(String::as_str).unwrap_or("")
    }

    /// Whether this is a complex (multi-typed) instance.
    pub fn is_complex(&self) -> bool {
        self.type_names.len() > 1
    }

    /// Whether any of the type names matches.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.type_names.iter().any(|t| t == type_name)
    }

    /// Arguments of one partial of a complex instance.
    ///
    /// For a simple instance this returns all parameters when the type matches.
    pub fn partial(&self, type_name: &str) -> Option<&[Parameter]> {
        if !self.is_complex() {
            return self.has_type(type_name).then_some(self.parameters.as_slice());
        }
        let idx = self.type_names.iter().position(|t| t == type_name)?;
        self.parameters.get(idx).and_then(Parameter::as_list)
    }

    /// Ids this entity references, in parameter order.
    pub fn references(&self) -> Vec<u64> {
        self.parameters.iter().flat_map(Parameter::references).collect()
    }
}

/// A record of the header section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderEntity {
    /// Type name (e.g., `FILE_SCHEMA`).
    pub type_name: String,
    /// Arguments.
    pub parameters: Vec<Parameter>,
    /// Line of the type name.
    pub line: usize,
}

/// One `&SCOPE ... ENDSCOPE` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scope {
    /// Entity that owns the scope, when it is written as `#id = &SCOPE ...`.
    pub owner: Option<u64>,
    /// Enclosing scope.
    pub parent: Option<usize>,
    /// Ids defined directly inside the scope.
    pub members: Vec<u64>,
    /// Ids made visible outside the scope.
    pub exports: Vec<u64>,
    /// Line of `&SCOPE`.
    pub line: usize,
}

/// One `DATA` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSection {
    /// Parameters of `DATA(...)`; empty for a plain `DATA;`.
    pub parameters: Vec<Parameter>,
    /// Line of `DATA`.
    pub line: usize,
}

/// Counts describing a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Header records.
    pub header_entities: usize,
    /// Data entities.
    pub entities: usize,
    /// Complex (multi-typed) entities.
    pub complex_entities: usize,
    /// Parameters, nested ones included.
    pub parameters: usize,
    /// Reference parameters.
    pub references: usize,
    /// References whose target is missing.
    pub dangling_references: usize,
    /// Scope blocks.
    pub scopes: usize,
    /// Data sections.
    pub sections: usize,
}

/// The complete content of a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    /// Header section records, in file order.
    pub header: Vec<HeaderEntity>,
    /// Data section entities, indexed by id.
    pub entities: BTreeMap<u64, Entity>,
    /// Scope blocks, in order of their `&SCOPE`.
    pub scopes: Vec<Scope>,
    /// Data sections, in file order.
    pub sections: Vec<DataSection>,
}

impl Graph {
    /// Get an entity by id.
    pub fn get(&self, id: u64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Follow a reference.
    pub fn resolve(&self, reference: &EntityRef) -> Option<&Entity> {
        self.entities.get(&reference.id)
    }

    /// Number of data entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether there are no data entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get all entities having a given type name.
    pub fn entities_of_type(&self, type_name: &str) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.has_type(type_name))
            .collect()
    }

    /// Entities in the order they appear in the file.
    pub fn in_file_order(&self) -> Vec<&Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_by_key(|e| e.order);
        all
    }

    /// Ids of the entities that reference `id`.
    pub fn referrers(&self, id: u64) -> Vec<u64> {
        self.entities
            .values()
            .filter(|e| e.references().contains(&id))
            .map(|e| e.id)
            .collect()
    }

    /// First header record with the given type name.
    pub fn header_entity(&self, type_name: &str) -> Option<&HeaderEntity> {
        self.header.iter().find(|h| h.type_name == type_name)
    }

    /// Schema names listed in `FILE_SCHEMA`.
    pub fn schema_names(&self) -> Vec<&str> {
        self.header_entity("FILE_SCHEMA")
            .and_then(|h| h.parameters.first())
            .and_then(Parameter::as_list)
            .map(|names| names.iter().filter_map(Parameter::as_text).collect())
            .unwrap_or_default()
    }

    /// Counts describing the graph.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            header_entities: self.header.len(),
            entities: self.entities.len(),
            scopes: self.scopes.len(),
            sections: self.sections.len(),
            ..GraphStats::default()
        };
        let mut dangling = BTreeSet::new();
        for entity in self.entities.values() {
            if entity.is_complex() {
                stats.complex_entities += 1;
            }
            for param in &entity.parameters {
                stats.parameters += param.count();
                param.visit_refs(&mut |r| {
                    stats.references += 1;
                    if r.resolution == Resolution::Dangling {
                        dangling.insert((entity.id, r.id));
                    }
                });
            }
        }
        stats.dangling_references = dangling.len();
        stats
    }
}
