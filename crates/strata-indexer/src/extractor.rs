//! Per-file declaration extraction with tree-sitter-java
//!
//! Extraction is pure: one file in, plain data out. Cross-file resolution
//! happens later against the assembled graph.

use crate::error::ParseError;
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

/// Declarations found in one `.java` file.
#[derive(Debug, Clone, Default)]
pub struct FileExtraction {
    /// Relative path with forward slashes.
    pub path: String,
    pub package: Option<String>,
    pub imports: Vec<String>,
    /// Pre-order: an outer type always precedes its nested types.
    pub types: Vec<TypeDecl>,
    pub has_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
}

impl TypeKind {
    fn from_node_kind(kind: &str) -> Option<TypeKind> {
        match kind {
            "class_declaration" => Some(TypeKind::Class),
            "interface_declaration" => Some(TypeKind::Interface),
            "enum_declaration" => Some(TypeKind::Enum),
            "record_declaration" => Some(TypeKind::Record),
            "annotation_type_declaration" => Some(TypeKind::Annotation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Record => "record",
            TypeKind::Annotation => "annotation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    /// `pkg.Outer.Inner`
    pub qualified_name: String,
    pub kind: TypeKind,
    /// Declaration text up to the body.
    pub header: String,
    pub modifiers: String,
    pub doc: Option<String>,
    pub lines: (u32, u32),
    /// Index of the enclosing type in [`FileExtraction::types`].
    pub outer: Option<usize>,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    /// Declared type, whitespace removed.
    pub ty: String,
    pub modifiers: String,
    pub source: String,
    pub lines: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    /// Erased parameter types, e.g. `List`, `int[]`, `String...`.
    pub param_types: Vec<String>,
    pub return_type: Option<String>,
    pub throws: Vec<String>,
    pub modifiers: String,
    pub annotations: Vec<String>,
    pub is_constructor: bool,
    pub source: String,
    pub doc: Option<String>,
    pub lines: (u32, u32),
    pub calls: Vec<CallSite>,
    pub instantiations: Vec<(String, usize)>,
    pub field_uses: Vec<FieldUse>,
}

impl MethodDecl {
    /// `name(T1,T2)`, the part of a signature an override shares with its super method.
    pub fn signature_tail(&self) -> String {
        format!("{}({})", self.name, self.param_types.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// No receiver, or `this`.
    Own,
    Super,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub name: String,
    pub receiver: Receiver,
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUse {
    pub name: String,
    pub write: bool,
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

fn lines(node: &Node) -> (u32, u32) {
    (node.start_position().row as u32 + 1, node.end_position().row as u32 + 1)
}

/// `Map<String, List<Foo>>` → `Map`, `int []` → `int[]`.
pub fn erase_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out
}

/// Last dotted segment without array suffixes: `java.util.List[]` → `List`.
pub fn simple_type_name(erased: &str) -> &str {
    let base = erased.trim_end_matches("...").trim_end_matches("[]");
    let base = base.trim_end_matches("[]");
    base.rsplit('.').next().unwrap_or(base)
}

fn javadoc(node: &Node, source: &str) -> Option<String> {
    let mut sibling = node.prev_sibling();
    while let Some(s) = sibling {
        match s.kind() {
            "block_comment" => {
                let raw = text(&s, source);
                if !raw.starts_with("/**") {
                    return None;
                }
                let cleaned = raw
                    .trim_start_matches("/**")
                    .trim_end_matches("*/")
                    .lines()
                    .map(|l| l.trim().trim_start_matches('*').trim())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                return (!cleaned.is_empty()).then_some(cleaned);
            }
            "line_comment" => sibling = s.prev_sibling(),
            _ => return None,
        }
    }
    None
}

/// Modifier keywords joined by spaces, and annotation simple names.
fn modifiers(node: &Node, source: &str) -> (String, Vec<String>) {
    let mut keywords = Vec::new();
    let mut annotations = Vec::new();
    let mut cursor = node.walk();
    let Some(mods) = node.children(&mut cursor).find(|c| c.kind() == "modifiers") else {
        return (String::new(), annotations);
    };
    let mut cursor = mods.walk();
    for child in mods.children(&mut cursor) {
        match child.kind() {
            "marker_annotation" | "annotation" => {
                if let Some(name) = child.child_by_field_name("name") {
                    let name = text(&name, source);
                    annotations.push(name.rsplit('.').next().unwrap_or(name).to_string());
                }
            }
            "line_comment" | "block_comment" => {}
            _ => keywords.push(text(&child, source).to_string()),
        }
    }
    (keywords.join(" "), annotations)
}

/// Type names listed under a `superclass`, `super_interfaces` or `extends_interfaces` node.
fn type_list(node: &Node, source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "type_identifier" | "scoped_type_identifier" | "generic_type" => {
                out.push(erase_type(text(&current, source)));
            }
            _ => {
                let mut cursor = current.walk();
                let children: Vec<Node> = current.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
        }
    }
    out
}

pub struct JavaExtractor {
    parser: Parser,
}

impl JavaExtractor {
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_java::LANGUAGE.into())?;
        Ok(JavaExtractor { parser })
    }

    pub fn extract(&mut self, path: &str, source: &str) -> Result<FileExtraction, ParseError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ParseError::Syntax { path: path.to_string() })?;
        let root = tree.root_node();

        let mut file = FileExtraction {
            path: path.to_string(),
            has_errors: root.has_error(),
            ..Default::default()
        };
        if file.has_errors {
            tracing::debug!("{} has syntax errors, extracting what parsed", path);
        }

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_declaration" => {
                    let mut inner = child.walk();
                    file.package = child
                        .named_children(&mut inner)
                        .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
                        .map(|c| text(&c, source).to_string());
                }
                "import_declaration" => {
                    let mut inner = child.walk();
                    let mut name = None;
                    let mut wildcard = false;
                    for part in child.named_children(&mut inner) {
                        match part.kind() {
                            "scoped_identifier" | "identifier" => name = Some(text(&part, source)),
                            "asterisk" => wildcard = true,
                            _ => {}
                        }
                    }
                    if let Some(name) = name {
                        file.imports.push(if wildcard { format!("{name}.*") } else { name.to_string() });
                    }
                }
                kind if TypeKind::from_node_kind(kind).is_some() => {
                    visit_type(&child, source, &mut file, None);
                }
                _ => {}
            }
        }
        Ok(file)
    }
}

fn visit_type(node: &Node, source: &str, file: &mut FileExtraction, outer: Option<usize>) {
    let Some(kind) = TypeKind::from_node_kind(node.kind()) else {
        return;
    };
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = text(&name_node, source).to_string();
    let qualified_name = match (outer, &file.package) {
        (Some(index), _) => format!("{}.{}", file.types[index].qualified_name, name),
        (None, Some(package)) => format!("{package}.{name}"),
        (None, None) => name.clone(),
    };

    let body = node.child_by_field_name("body");
    let header_end = body.map(|b| b.start_byte()).unwrap_or(node.end_byte());
    let header = source[node.start_byte()..header_end].trim().to_string();
    let (modifiers, _) = modifiers(node, source);

    let mut extends = Vec::new();
    let mut implements = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "superclass" | "extends_interfaces" => extends.extend(type_list(&child, source)),
            "super_interfaces" => implements.extend(type_list(&child, source)),
            _ => {}
        }
    }

    let index = file.types.len();
    file.types.push(TypeDecl {
        name,
        qualified_name,
        kind,
        header,
        modifiers,
        doc: javadoc(node, source),
        lines: lines(node),
        outer,
        extends,
        implements,
        fields: Vec::new(),
        methods: Vec::new(),
    });

    if kind == TypeKind::Record {
        if let Some(components) = node.child_by_field_name("parameters") {
            let mut cursor = components.walk();
            for component in components.named_children(&mut cursor) {
                if let Some(field) = record_component(&component, source) {
                    file.types[index].fields.push(field);
                }
            }
        }
    }
    if let Some(body) = body {
        visit_body(&body, source, file, index);
    }
}

fn visit_body(body: &Node, source: &str, file: &mut FileExtraction, owner: usize) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                let method = method(&member, source, &file.types[owner]);
                file.types[owner].methods.push(method);
            }
            "field_declaration" | "constant_declaration" => {
                let fields = fields(&member, source);
                file.types[owner].fields.extend(fields);
            }
            "enum_body_declarations" => visit_body(&member, source, file, owner),
            kind if TypeKind::from_node_kind(kind).is_some() => {
                visit_type(&member, source, file, Some(owner));
            }
            _ => {}
        }
    }
}

fn record_component(node: &Node, source: &str) -> Option<FieldDecl> {
    if node.kind() != "formal_parameter" {
        return None;
    }
    let name = node.child_by_field_name("name")?;
    let ty = node.child_by_field_name("type")?;
    Some(FieldDecl {
        name: text(&name, source).to_string(),
        ty: erase_whitespace(text(&ty, source)),
        modifiers: "private final".to_string(),
        source: text(node, source).to_string(),
        lines: lines(node),
    })
}

fn erase_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

fn fields(node: &Node, source: &str) -> Vec<FieldDecl> {
    let Some(ty) = node.child_by_field_name("type") else {
        return Vec::new();
    };
    let raw_ty = text(&ty, source);
    let ty = erase_whitespace(raw_ty);
    let (modifiers, _) = modifiers(node, source);
    let prefix = if modifiers.is_empty() {
        raw_ty.to_string()
    } else {
        format!("{} {}", modifiers, raw_ty)
    };

    // one variable per field: `int a = 1, b;` gives `int a = 1;` and `int b;`
    let mut cursor = node.walk();
    node.children_by_field_name("declarator", &mut cursor)
        .filter_map(|declarator| {
            let name = declarator.child_by_field_name("name")?;
            Some(FieldDecl {
                name: text(&name, source).to_string(),
                ty: ty.clone(),
                modifiers: modifiers.clone(),
                source: format!("{} {};", prefix, text(&declarator, source)),
                lines: lines(node),
            })
        })
        .collect()
}

fn method(node: &Node, source: &str, owner: &TypeDecl) -> MethodDecl {
    let is_constructor = node.kind() != "method_declaration";
    let name = node
        .child_by_field_name("name")
        .map(|n| text(&n, source).to_string())
        .unwrap_or_else(|| owner.name.clone());
    let (modifiers, annotations) = modifiers(node, source);

    let mut param_types = Vec::new();
    let mut locals: HashSet<String> = HashSet::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "formal_parameter" => {
                    if let Some(ty) = param.child_by_field_name("type") {
                        param_types.push(erase_type(text(&ty, source)));
                    }
                    if let Some(name) = param.child_by_field_name("name") {
                        locals.insert(text(&name, source).to_string());
                    }
                }
                "spread_parameter" => {
                    let mut inner = param.walk();
                    for part in param.named_children(&mut inner) {
                        match part.kind() {
                            "modifiers" => {}
                            "variable_declarator" => {
                                if let Some(name) = part.child_by_field_name("name") {
                                    locals.insert(text(&name, source).to_string());
                                }
                            }
                            _ => param_types.push(format!("{}...", erase_type(text(&part, source)))),
                        }
                    }
                }
                _ => {}
            }
        }
    }
    if node.kind() == "compact_constructor_declaration" {
        param_types = owner.fields.iter().map(|f| erase_type(&f.ty)).collect();
    }

    let return_type = node
        .child_by_field_name("type")
        .map(|t| erase_whitespace(text(&t, source)));

    let mut throws = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "throws" {
            throws.extend(type_list(&child, source));
        }
    }

    let mut body = BodyFacts::default();
    if let Some(block) = node.child_by_field_name("body") {
        collect_locals(&block, source, &mut locals);
        body.visit(&block, source, &locals);
    }

    MethodDecl {
        name,
        param_types,
        return_type,
        throws,
        modifiers,
        annotations,
        is_constructor,
        source: text(node, source).to_string(),
        doc: javadoc(node, source),
        lines: lines(node),
        calls: body.calls,
        instantiations: body.instantiations,
        field_uses: body.field_uses,
    }
}

fn collect_locals(node: &Node, source: &str, locals: &mut HashSet<String>) {
    let name_field = match node.kind() {
        "variable_declarator" | "catch_formal_parameter" | "enhanced_for_statement" => Some("name"),
        _ => None,
    };
    if let Some(name) = name_field.and_then(|f| node.child_by_field_name(f)) {
        locals.insert(text(&name, source).to_string());
    }
    if node.kind() == "lambda_expression" {
        if let Some(params) = node.child_by_field_name("parameters") {
            if params.kind() == "identifier" {
                locals.insert(text(&params, source).to_string());
            } else {
                let mut cursor = params.walk();
                for param in params.named_children(&mut cursor) {
                    let name = match param.kind() {
                        "identifier" => Some(param),
                        _ => param.child_by_field_name("name"),
                    };
                    if let Some(name) = name {
                        locals.insert(text(&name, source).to_string());
                    }
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_locals(&child, source, locals);
    }
}

fn is_write(node: &Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "assignment_expression" => parent.child_by_field_name("left") == Some(*node),
        "update_expression" => true,
        _ => false,
    }
}

fn arity(node: &Node) -> usize {
    node.child_by_field_name("arguments")
        .map(|args| {
            let mut cursor = args.walk();
            args.named_children(&mut cursor)
                .filter(|a| !matches!(a.kind(), "line_comment" | "block_comment"))
                .count()
        })
        .unwrap_or(0)
}

#[derive(Default)]
struct BodyFacts {
    calls: Vec<CallSite>,
    instantiations: Vec<(String, usize)>,
    field_uses: Vec<FieldUse>,
}

impl BodyFacts {
    fn visit(&mut self, node: &Node, source: &str, locals: &HashSet<String>) {
        match node.kind() {
            // local and anonymous classes belong to their own types
            "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
            | "class_body" => return,
            "method_invocation" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let receiver = match node.child_by_field_name("object") {
                        None => Receiver::Own,
                        Some(object) => match object.kind() {
                            "this" => Receiver::Own,
                            "super" => Receiver::Super,
                            _ => Receiver::Other(text(&object, source).to_string()),
                        },
                    };
                    self.calls.push(CallSite {
                        name: text(&name, source).to_string(),
                        receiver,
                        arity: arity(node),
                    });
                }
            }
            "object_creation_expression" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    self.instantiations.push((erase_type(text(&ty, source)), arity(node)));
                }
            }
            "field_access" => {
                let on_this = node.child_by_field_name("object").is_some_and(|o| o.kind() == "this");
                if let (true, Some(field)) = (on_this, node.child_by_field_name("field")) {
                    self.field_uses.push(FieldUse {
                        name: text(&field, source).to_string(),
                        write: is_write(node),
                    });
                }
            }
            "identifier" => {
                let name = text(node, source);
                if !locals.contains(name) && is_value_position(node) {
                    self.field_uses.push(FieldUse {
                        name: name.to_string(),
                        write: is_write(node),
                    });
                }
                return;
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if node.kind() == "field_access" && node.child_by_field_name("field") == Some(child) {
                continue;
            }
            self.visit(&child, source, locals);
        }
    }
}

/// Whether a bare identifier is used as a value rather than as a name of something else.
fn is_value_position(node: &Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "method_invocation" => parent.child_by_field_name("name") != Some(*node),
        "variable_declarator" => parent.child_by_field_name("name") != Some(*node),
        "scoped_identifier" | "labeled_statement" | "break_statement" | "continue_statement"
        | "method_reference" | "lambda_expression" | "inferred_parameters" | "catch_formal_parameter"
        | "enhanced_for_statement" | "switch_label" | "annotation" | "marker_annotation" => false,
        _ => true,
    }
}
