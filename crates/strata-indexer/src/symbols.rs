//! Symbol table for cross-file resolution
//!
//! Filled while the graph is assembled, then read concurrently while
//! per-method edges are resolved.

use crate::extractor::simple_type_name;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use strata_core::NodeId;

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub id: NodeId,
    pub name: String,
    /// `name(T1,T2)`
    pub tail: String,
    pub params: usize,
    pub varargs: bool,
    pub is_constructor: bool,
}

impl MethodSymbol {
    fn accepts(&self, arity: usize) -> bool {
        if self.varargs {
            arity + 1 >= self.params
        } else {
            arity == self.params
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub id: NodeId,
    pub name: String,
    pub ty: String,
}

/// Where a type name is being resolved from.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    pub package: Option<String>,
    pub imports: Vec<String>,
    /// Qualified names of the enclosing types, innermost first.
    pub enclosing: Vec<String>,
}

/// Project symbols keyed by qualified type name and by owning type. Thread-safe for concurrent access.
#[derive(Default)]
pub struct SymbolTable {
    types: DashMap<String, NodeId>,
    simple_types: DashMap<String, Vec<String>>,
    methods: DashMap<NodeId, Vec<MethodSymbol>>,
    by_name: DashMap<(String, usize), Vec<NodeId>>,
    fields: DashMap<NodeId, Vec<FieldSymbol>>,
    supertypes: DashMap<NodeId, Vec<NodeId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Returns `false` when the qualified name is already taken.
    pub fn insert_type(&self, qualified_name: &str, id: NodeId) -> bool {
        if self.types.contains_key(qualified_name) {
            return false;
        }
        self.types.insert(qualified_name.to_string(), id);
        let simple = qualified_name.rsplit('.').next().unwrap_or(qualified_name);
        self.simple_types
            .entry(simple.to_string())
            .or_default()
            .push(qualified_name.to_string());
        true
    }

    pub fn insert_method(&self, owner: NodeId, method: MethodSymbol) {
        if !method.is_constructor {
            self.by_name
                .entry((method.name.clone(), method.params))
                .or_default()
                .push(method.id);
        }
        self.methods.entry(owner).or_default().push(method);
    }

    pub fn insert_field(&self, owner: NodeId, field: FieldSymbol) {
        self.fields.entry(owner).or_default().push(field);
    }

    pub fn add_supertype(&self, owner: NodeId, supertype: NodeId) {
        self.supertypes.entry(owner).or_default().push(supertype);
    }

    pub fn lookup_type(&self, qualified_name: &str) -> Option<NodeId> {
        self.types.get(qualified_name).map(|r| *r.value())
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Resolve a type reference as written in source.
    ///
    /// A simple name that is unique in the project wins outright. Otherwise the
    /// candidates are tried as a nested type of an enclosing type, an explicit
    /// import, a type of the same package, and a wildcard import, in that order.
    pub fn resolve_type(&self, raw: &str, context: &TypeContext) -> Option<NodeId> {
        let raw = raw.trim_end_matches("...").trim_end_matches("[]").trim_end_matches("[]");
        if raw.contains('.') {
            if let Some(id) = self.lookup_type(raw) {
                return Some(id);
            }
            // `Outer.Inner` relative to the package or an enclosing type
            let relative = std::iter::once(context.package.clone())
                .flatten()
                .chain(context.enclosing.iter().cloned())
                .find_map(|prefix| self.lookup_type(&format!("{prefix}.{raw}")));
            if relative.is_some() {
                return relative;
            }
        }

        let simple = simple_type_name(raw);
        let candidates = self.simple_types.get(simple)?;
        if let [only] = candidates.as_slice() {
            return self.lookup_type(only);
        }

        let preferred = context
            .enclosing
            .iter()
            .map(|outer| format!("{outer}.{simple}"))
            .chain(
                context
                    .imports
                    .iter()
                    .filter(|import| import.rsplit('.').next() == Some(simple))
                    .cloned(),
            )
            .chain(context.package.iter().map(|package| format!("{package}.{simple}")))
            .chain(
                context
                    .imports
                    .iter()
                    .filter_map(|import| import.strip_suffix(".*"))
                    .map(|prefix| format!("{prefix}.{simple}")),
            )
            .find(|qualified| candidates.contains(qualified))?;
        self.lookup_type(&preferred)
    }

    /// Methods of `owner` called `name` that accept `arity` arguments, in declaration order.
    pub fn methods_named(&self, owner: NodeId, name: &str, arity: usize) -> Vec<NodeId> {
        self.methods
            .get(&owner)
            .map(|methods| {
                methods
                    .iter()
                    .filter(|m| !m.is_constructor && m.name == name && m.accepts(arity))
                    .map(|m| m.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All methods of `owner` called `name`, regardless of arity.
    pub fn methods_called(&self, owner: NodeId, name: &str) -> Vec<NodeId> {
        self.methods
            .get(&owner)
            .map(|methods| {
                methods
                    .iter()
                    .filter(|m| !m.is_constructor && m.name == name)
                    .map(|m| m.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn constructors(&self, owner: NodeId, arity: usize) -> Vec<NodeId> {
        self.methods
            .get(&owner)
            .map(|methods| {
                methods
                    .iter()
                    .filter(|m| m.is_constructor && m.accepts(arity))
                    .map(|m| m.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn method_with_tail(&self, owner: NodeId, tail: &str) -> Option<NodeId> {
        self.methods
            .get(&owner)?
            .iter()
            .find(|m| !m.is_constructor && m.tail == tail)
            .map(|m| m.id)
    }

    /// The single method in the project with this name and arity, if there is exactly one.
    pub fn unique_method(&self, name: &str, arity: usize) -> Option<NodeId> {
        match self.by_name.get(&(name.to_string(), arity))?.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn field(&self, owner: NodeId, name: &str) -> Option<FieldSymbol> {
        self.fields
            .get(&owner)?
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    /// Transitive supertypes of `owner`, nearest first.
    pub fn ancestors(&self, owner: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::from([owner]);
        let mut queue = VecDeque::from([owner]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            let Some(direct) = self.supertypes.get(&current) else {
                continue;
            };
            for supertype in direct.iter() {
                if seen.insert(*supertype) {
                    out.push(*supertype);
                    queue.push_back(*supertype);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(id: u64, name: &str, params: usize) -> MethodSymbol {
        MethodSymbol {
            id: NodeId(id),
            name: name.to_string(),
            tail: format!("{name}({})", vec!["int"; params].join(",")),
            params,
            varargs: false,
            is_constructor: false,
        }
    }

    #[test]
    fn test_resolve_unique_and_ambiguous_types() {
        let table = SymbolTable::new();
        assert!(table.insert_type("a.Util", NodeId(1)));
        assert!(table.insert_type("a.Node", NodeId(2)));
        assert!(table.insert_type("b.Node", NodeId(3)));
        assert!(!table.insert_type("a.Util", NodeId(9)), "first registration wins");

        let in_a = TypeContext {
            package: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(table.resolve_type("Util", &TypeContext::default()), Some(NodeId(1)));
        assert_eq!(table.resolve_type("Node", &TypeContext::default()), None);
        assert_eq!(table.resolve_type("Node", &in_a), Some(NodeId(2)));
        assert_eq!(table.resolve_type("Node[]", &in_a), Some(NodeId(2)));

        let importing_b = TypeContext {
            package: Some("a".into()),
            imports: vec!["b.Node".into()],
            ..Default::default()
        };
        assert_eq!(table.resolve_type("Node", &importing_b), Some(NodeId(3)), "import beats package");
        assert_eq!(table.resolve_type("b.Node", &in_a), Some(NodeId(3)));
        assert_eq!(table.resolve_type("int", &in_a), None);
    }

    #[test]
    fn test_nested_type_preferred_from_inside() {
        let table = SymbolTable::new();
        table.insert_type("p.Tree.Node", NodeId(1));
        table.insert_type("p.Graph.Node", NodeId(2));
        let inside_graph = TypeContext {
            package: Some("p".into()),
            enclosing: vec!["p.Graph".into()],
            ..Default::default()
        };
        assert_eq!(table.resolve_type("Node", &inside_graph), Some(NodeId(2)));
        assert_eq!(table.resolve_type("Tree.Node", &inside_graph), Some(NodeId(1)));
    }

    #[test]
    fn test_method_lookup() {
        let table = SymbolTable::new();
        let owner = NodeId(10);
        table.insert_method(owner, method(1, "run", 0));
        table.insert_method(owner, method(2, "run", 1));
        table.insert_method(NodeId(11), method(3, "run", 1));
        table.insert_method(NodeId(11), method(4, "stop", 0));
        table.insert_method(
            owner,
            MethodSymbol {
                varargs: true,
                ..method(5, "log", 2)
            },
        );

        assert_eq!(table.methods_named(owner, "run", 1), vec![NodeId(2)]);
        assert_eq!(table.methods_called(owner, "run"), vec![NodeId(1), NodeId(2)]);
        assert_eq!(table.methods_named(owner, "log", 1), vec![NodeId(5)]);
        assert_eq!(table.methods_named(owner, "log", 4), vec![NodeId(5)]);
        assert_eq!(table.unique_method("run", 1), None);
        assert_eq!(table.unique_method("stop", 0), Some(NodeId(4)));
        assert_eq!(table.method_with_tail(owner, "run(int)"), Some(NodeId(2)));
    }

    #[test]
    fn test_ancestors_are_transitive_and_cycle_safe() {
        let table = SymbolTable::new();
        table.add_supertype(NodeId(1), NodeId(2));
        table.add_supertype(NodeId(1), NodeId(3));
        table.add_supertype(NodeId(2), NodeId(4));
        table.add_supertype(NodeId(4), NodeId(1));
        assert_eq!(table.ancestors(NodeId(1)), vec![NodeId(2), NodeId(3), NodeId(4)]);
    }
}
