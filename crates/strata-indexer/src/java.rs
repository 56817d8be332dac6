//! Java snapshot parser: source tree → StructuralGraph

use crate::error::ParseError;
use crate::extractor::{erase_type, FileExtraction, JavaExtractor, MethodDecl, Receiver, TypeDecl};
use crate::symbols::{FieldSymbol, MethodSymbol, SymbolTable, TypeContext};
use anyhow::Context;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use strata_core::{
    meta, CommitInfo, EdgeKind, EdgeTriple, Graph, GraphEdge, GraphNode, NodeId, NodeKind, SnapshotParser,
    StructuralGraph,
};

/// Parses every `.java` file under a root into one structural graph.
///
/// Files are read and parsed in parallel, then assembled in sorted path
/// order so node ids come out the same on every run.
#[derive(Debug, Clone, Default)]
pub struct JavaParser {
    project_name: Option<String>,
}

/// One assembled type, kept for the resolution passes.
struct TypeInfo<'a> {
    id: NodeId,
    decl: &'a TypeDecl,
    context: TypeContext,
    /// Enclosing type ids, innermost first.
    outer_ids: Vec<NodeId>,
}

struct PendingMethod<'a> {
    id: NodeId,
    owner: usize,
    decl: &'a MethodDecl,
}

impl JavaParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for the Project node. Defaults to the root directory's name.
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    fn project_name(&self, root: &Path) -> String {
        if let Some(name) = &self.project_name {
            return name.clone();
        }
        root.canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "project".to_string())
    }

    /// Relative paths of all `.java` files under `root`, sorted.
    pub fn discover(&self, root: &Path) -> Result<Vec<String>, ParseError> {
        if !root.is_dir() {
            return Err(ParseError::Read {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut files: Vec<String> = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "java"))
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .ok()
                    .map(|relative| relative.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Parse the tree under `root` into a graph.
    pub fn parse_dir(&self, root: &Path) -> Result<Graph, ParseError> {
        let start = Instant::now();
        // surface grammar problems once instead of per file
        JavaExtractor::new()?;

        let files = self.discover(root)?;
        tracing::debug!("Found {} Java files under {}", files.len(), root.display());

        let extractions: Vec<FileExtraction> = files
            .par_iter()
            .map_init(JavaExtractor::new, |extractor, relative| {
                let extractor = extractor.as_mut().ok()?;
                let path = root.join(relative);
                let source = match std::fs::read_to_string(&path) {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::warn!("{}", ParseError::Read { path, source: e });
                        return None;
                    }
                };
                match extractor.extract(relative, &source) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let with_errors = extractions.iter().filter(|f| f.has_errors).count();
        if with_errors > 0 {
            tracing::debug!("{} files parsed with syntax errors", with_errors);
        }

        let graph = GraphBuilder::new(&self.project_name(root)).build(&extractions);
        tracing::info!(
            "Parsed {} files into {} nodes and {} edges in {:.2?}",
            extractions.len(),
            graph.node_count(),
            graph.edge_count(),
            start.elapsed()
        );
        Ok(graph)
    }
}

impl SnapshotParser for JavaParser {
    fn parse(&self, root: &Path, commit: &CommitInfo) -> anyhow::Result<StructuralGraph> {
        tracing::debug!("Parsing snapshot {}", commit.short_id);
        self.parse_dir(root)
            .with_context(|| format!("Failed to parse {} at {}", root.display(), commit.short_id))
    }
}

struct GraphBuilder {
    graph: Graph,
    symbols: SymbolTable,
    project: NodeId,
    packages: BTreeMap<String, NodeId>,
    edges: HashSet<EdgeTriple>,
}

impl GraphBuilder {
    fn new(project_name: &str) -> Self {
        let mut graph = Graph::new();
        let project = graph.add_node(GraphNode::new(NodeKind::Project, project_name, project_name));
        GraphBuilder {
            graph,
            symbols: SymbolTable::new(),
            project,
            packages: BTreeMap::new(),
            edges: HashSet::new(),
        }
    }

    fn edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) {
        if self.edges.insert((source, kind, target)) {
            self.graph.add_edge(GraphEdge::new(source, target, kind));
        }
    }

    fn package(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.packages.get(name) {
            return *id;
        }
        let id = self.graph.add_node(GraphNode::new(NodeKind::Package, name, name));
        self.packages.insert(name.to_string(), id);
        self.edge(self.project, id, EdgeKind::HasPackage);
        id
    }

    fn build(mut self, extractions: &[FileExtraction]) -> Graph {
        let mut types: Vec<TypeInfo> = Vec::new();
        let mut methods: Vec<PendingMethod> = Vec::new();

        for file in extractions {
            self.add_file(file, &mut types, &mut methods);
        }
        tracing::debug!("Registered {} types", self.symbols.type_count());

        self.link_hierarchy(&types);

        let resolved: Vec<Vec<(NodeId, EdgeKind, NodeId)>> = methods
            .par_iter()
            .map(|method| resolve_method(&self.symbols, &types, method))
            .collect();
        for (source, kind, target) in resolved.into_iter().flatten() {
            self.edge(source, target, kind);
        }
        self.graph
    }

    fn add_file<'a>(
        &mut self,
        file: &'a FileExtraction,
        types: &mut Vec<TypeInfo<'a>>,
        methods: &mut Vec<PendingMethod<'a>>,
    ) {
        let path = PathBuf::from(&file.path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.path.clone());
        let mut node = GraphNode::new(NodeKind::File, file_name, file.path.as_str())
            .with_file(&path)
            .with_meta(meta::IMPORTS, file.imports.join(","));
        if let Some(package) = &file.package {
            node = node.with_meta(meta::PACKAGE, package.as_str());
        }
        let file_id = self.graph.add_node(node);
        self.edge(self.project, file_id, EdgeKind::Contains);
        let package_id = file.package.as_deref().map(|p| self.package(p));

        // index into `types` per declaration in this file; None when skipped
        let mut local: Vec<Option<usize>> = Vec::with_capacity(file.types.len());
        for decl in &file.types {
            let outer = match decl.outer {
                Some(index) => match local.get(index).copied().flatten() {
                    Some(outer) => Some(outer),
                    None => {
                        local.push(None);
                        continue;
                    }
                },
                None => None,
            };

            if self.symbols.lookup_type(&decl.qualified_name).is_some() {
                tracing::warn!(
                    "Duplicate type {} in {}, keeping the first declaration",
                    decl.qualified_name,
                    file.path
                );
                local.push(None);
                continue;
            }

            let mut node = GraphNode::new(NodeKind::Type, decl.name.as_str(), decl.qualified_name.as_str())
                .with_file(&path)
                .with_lines(decl.lines.0, decl.lines.1)
                .with_source(decl.header.as_str())
                .with_meta(meta::TYPE_KIND, decl.kind.as_str())
                .with_meta(meta::MODIFIERS, decl.modifiers.as_str());
            if let Some(package) = &file.package {
                node = node.with_meta(meta::PACKAGE, package.as_str());
            }
            node.doc = decl.doc.clone();
            let id = self.graph.add_node(node);
            self.symbols.insert_type(&decl.qualified_name, id);

            let mut outer_ids = Vec::new();
            let mut enclosing = vec![decl.qualified_name.clone()];
            match outer {
                Some(index) => {
                    let parent = &types[index];
                    self.edge(parent.id, id, EdgeKind::Declares);
                    outer_ids.push(parent.id);
                    outer_ids.extend(parent.outer_ids.iter().copied());
                    enclosing.extend(parent.context.enclosing.iter().cloned());
                }
                None => self.edge(file_id, id, EdgeKind::DeclaresType),
            }
            if let Some(package_id) = package_id {
                self.edge(id, package_id, EdgeKind::InPackage);
            }

            let owner = types.len();
            self.add_members(id, decl, owner, &path, methods);
            types.push(TypeInfo {
                id,
                decl,
                context: TypeContext {
                    package: file.package.clone(),
                    imports: file.imports.clone(),
                    enclosing,
                },
                outer_ids,
            });
            local.push(Some(owner));
        }
    }

    fn add_members<'a>(
        &mut self,
        type_id: NodeId,
        decl: &'a TypeDecl,
        owner: usize,
        path: &Path,
        methods: &mut Vec<PendingMethod<'a>>,
    ) {
        for field in &decl.fields {
            let qualified = format!("{}#{}", decl.qualified_name, field.name);
            let id = self.graph.add_node(
                GraphNode::new(NodeKind::Field, field.name.as_str(), qualified)
                    .with_file(path)
                    .with_lines(field.lines.0, field.lines.1)
                    .with_source(field.source.as_str())
                    .with_meta(meta::TYPE, field.ty.as_str())
                    .with_meta(meta::MODIFIERS, field.modifiers.as_str()),
            );
            self.edge(type_id, id, EdgeKind::Declares);
            self.symbols.insert_field(
                type_id,
                FieldSymbol {
                    id,
                    name: field.name.clone(),
                    ty: field.ty.clone(),
                },
            );
        }

        let mut seen = HashSet::new();
        for method in &decl.methods {
            let tail = method.signature_tail();
            if !seen.insert(tail.clone()) {
                tracing::warn!("Duplicate method {}#{}, keeping the first", decl.qualified_name, tail);
                continue;
            }
            let mut node = GraphNode::new(
                NodeKind::Method,
                method.name.as_str(),
                format!("{}#{}", decl.qualified_name, tail),
            )
            .with_file(path)
            .with_lines(method.lines.0, method.lines.1)
            .with_source(method.source.as_str())
            .with_meta(meta::MODIFIERS, method.modifiers.as_str())
            .with_meta(
                meta::METHOD_KIND,
                if method.is_constructor { "constructor" } else { "method" },
            );
            if let Some(return_type) = &method.return_type {
                node = node.with_meta(meta::RETURN_TYPE, return_type.as_str());
            }
            node.doc = method.doc.clone();
            let id = self.graph.add_node(node);
            self.edge(type_id, id, EdgeKind::Declares);

            self.symbols.insert_method(
                type_id,
                MethodSymbol {
                    id,
                    name: method.name.clone(),
                    tail,
                    params: method.param_types.len(),
                    varargs: method.param_types.last().is_some_and(|p| p.ends_with("...")),
                    is_constructor: method.is_constructor,
                },
            );
            methods.push(PendingMethod { id, owner, decl: method });
        }
    }

    fn link_hierarchy(&mut self, types: &[TypeInfo]) {
        for info in types {
            let supers = info
                .decl
                .extends
                .iter()
                .map(|name| (name, EdgeKind::Extends))
                .chain(info.decl.implements.iter().map(|name| (name, EdgeKind::Implements)));
            for (name, kind) in supers {
                match self.symbols.resolve_type(name, &info.context) {
                    Some(target) if target != info.id => {
                        self.edge(info.id, target, kind);
                        self.symbols.add_supertype(info.id, target);
                    }
                    _ => tracing::debug!("{} {} is outside the project", info.decl.qualified_name, name),
                }
            }
        }
    }
}

/// Edges leaving one method: calls, field accesses, signature types, overrides and tests.
fn resolve_method(
    symbols: &SymbolTable,
    types: &[TypeInfo],
    method: &PendingMethod,
) -> Vec<(NodeId, EdgeKind, NodeId)> {
    let owner = &types[method.owner];
    let decl = method.decl;
    let context = &owner.context;
    let mut edges = Vec::new();

    // own type, then enclosing types, then inherited
    let scope: Vec<NodeId> = std::iter::once(owner.id)
        .chain(owner.outer_ids.iter().copied())
        .chain(symbols.ancestors(owner.id))
        .collect();

    for call in &decl.calls {
        let target = match &call.receiver {
            Receiver::Own => scope
                .iter()
                .find_map(|t| symbols.methods_named(*t, &call.name, call.arity).first().copied()),
            Receiver::Super => symbols
                .ancestors(owner.id)
                .into_iter()
                .find_map(|t| symbols.methods_named(t, &call.name, call.arity).first().copied()),
            Receiver::Other(receiver) => {
                let receiver = receiver.strip_prefix("this.").unwrap_or(receiver);
                let receiver_type = scope
                    .iter()
                    .find_map(|t| symbols.field(*t, receiver))
                    .and_then(|field| symbols.resolve_type(&erase_type(&field.ty), context))
                    .or_else(|| {
                        receiver
                            .starts_with(char::is_uppercase)
                            .then(|| symbols.resolve_type(receiver, context))
                            .flatten()
                    });
                receiver_type
                    .into_iter()
                    .flat_map(|t| std::iter::once(t).chain(symbols.ancestors(t)))
                    .find_map(|t| symbols.methods_named(t, &call.name, call.arity).first().copied())
                    .or_else(|| symbols.unique_method(&call.name, call.arity))
            }
        };
        match target {
            Some(target) => edges.push((method.id, EdgeKind::Calls, target)),
            None => tracing::trace!("Unresolved call {} in {}", call.name, decl.name),
        }
    }

    for (ty, arity) in &decl.instantiations {
        if let Some(created) = symbols.resolve_type(ty, context) {
            for constructor in symbols.constructors(created, *arity).into_iter().take(1) {
                edges.push((method.id, EdgeKind::Calls, constructor));
            }
        }
    }

    for used in &decl.field_uses {
        if let Some(field) = scope.iter().find_map(|t| symbols.field(*t, &used.name)) {
            let kind = if used.write { EdgeKind::Writes } else { EdgeKind::Reads };
            edges.push((method.id, kind, field.id));
        }
    }

    let signature_types = decl
        .param_types
        .iter()
        .map(|t| (t, EdgeKind::HasParam))
        .chain(decl.return_type.iter().map(|t| (t, EdgeKind::ReturnType)))
        .chain(decl.throws.iter().map(|t| (t, EdgeKind::Throws)));
    for (ty, kind) in signature_types {
        if let Some(target) = symbols.resolve_type(&erase_type(ty), context) {
            edges.push((method.id, kind, target));
        }
    }

    if !decl.is_constructor && !decl.modifiers.split_whitespace().any(|m| m == "static" || m == "private") {
        let tail = decl.signature_tail();
        if let Some(overridden) = symbols
            .ancestors(owner.id)
            .into_iter()
            .find_map(|t| symbols.method_with_tail(t, &tail))
        {
            edges.push((method.id, EdgeKind::Overrides, overridden));
        }
    }

    if let Some(tested) = tested_method(symbols, owner, decl) {
        edges.push((method.id, EdgeKind::Tests, tested));
    }
    edges
}

/// `@Test void testSave()` in `RepoTest` → `Repo#save(..)` or `Repo#testSave(..)`.
fn tested_method(symbols: &SymbolTable, owner: &TypeInfo, decl: &MethodDecl) -> Option<NodeId> {
    if !decl.annotations.iter().any(|a| a == "Test") {
        return None;
    }
    let subject = owner.decl.name.strip_suffix("Test").filter(|s| !s.is_empty())?;
    let subject = symbols.resolve_type(subject, &owner.context)?;

    let mut candidates = vec![decl.name.clone()];
    if let Some(rest) = decl.name.strip_prefix("test").filter(|r| !r.is_empty()) {
        let mut chars = rest.chars();
        if let Some(first) = chars.next() {
            candidates.push(first.to_lowercase().chain(chars).collect());
        }
    }
    candidates
        .iter()
        .find_map(|name| symbols.methods_called(subject, name).first().copied())
}
