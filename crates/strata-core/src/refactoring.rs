//! Refactoring operations reported by a detection service

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::{EdgeKind, NodeKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static KIND_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").ok());

/// Coarse grouping of refactoring kinds that decides edge kind and tracking rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefactoringFamily {
    Rename,
    Move,
    Extract,
    Inline,
    ChangeSignature,
    Other,
}

/// Kind of a refactoring operation, named after RefactoringMiner's type names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefactoringKind {
    // ── Rename ──────────────────────────────────────────────
    RenameClass,
    RenameMethod,
    RenameAttribute,
    RenameParameter,
    RenameVariable,
    RenamePackage,

    // ── Move ────────────────────────────────────────────────
    MoveClass,
    MoveMethod,
    MoveAttribute,
    MoveAndRenameClass,
    MoveAndRenameMethod,
    MoveAndRenameAttribute,

    // ── Extract ─────────────────────────────────────────────
    ExtractMethod,
    ExtractClass,
    ExtractInterface,
    ExtractSuperclass,
    ExtractSubclass,
    ExtractVariable,
    ExtractAndMoveMethod,

    // ── Inline ──────────────────────────────────────────────
    InlineMethod,
    InlineVariable,
    MoveAndInlineMethod,

    // ── Signature changes ───────────────────────────────────
    ChangeParameterType,
    ChangeReturnType,
    AddParameter,
    RemoveParameter,
    ReorderParameter,
    AddThrownExceptionType,
    RemoveThrownExceptionType,
    ChangeMethodAccessModifier,
    ChangeAttributeAccessModifier,

    // ── Other structural refactorings ───────────────────────
    PullUpMethod,
    PullUpAttribute,
    PushDownMethod,
    PushDownAttribute,
    ReplaceVariableWithAttribute,
    ParameterizeVariable,
    MergeParameter,
    MergeVariable,
    MergeClass,
    SplitParameter,
    SplitVariable,
    SplitClass,

    /// Any type name this crate does not know, kept verbatim.
    Other(String),
}

impl RefactoringKind {
    /// Parse a type name such as `"Rename Method"` or `"RENAME_METHOD"`.
    ///
    /// Unknown but well-formed names become [`RefactoringKind::Other`]. Names that
    /// cannot be normalized at all are reported as malformed and also map to `Other`.
    pub fn parse(raw: &str, diagnostics: &mut Diagnostics) -> RefactoringKind {
        let normalized = normalize_kind_name(raw);
        let well_formed = KIND_NAME
            .as_ref()
            .is_some_and(|re| re.is_match(&normalized));
        if !well_formed {
            diagnostics.record(Warning::MalformedOperationDescriptor { raw: raw.to_string() });
            let fallback = if normalized.is_empty() { "UNKNOWN".to_string() } else { normalized };
            return RefactoringKind::Other(fallback);
        }
        RefactoringKind::from_name(&normalized)
    }

    /// Map an already normalized name. Never fails.
    pub fn from_name(name: &str) -> RefactoringKind {
        match name {
            "RENAME_CLASS" => RefactoringKind::RenameClass,
            "RENAME_METHOD" => RefactoringKind::RenameMethod,
            "RENAME_ATTRIBUTE" => RefactoringKind::RenameAttribute,
            "RENAME_PARAMETER" => RefactoringKind::RenameParameter,
            "RENAME_VARIABLE" => RefactoringKind::RenameVariable,
            "RENAME_PACKAGE" => RefactoringKind::RenamePackage,
            "MOVE_CLASS" => RefactoringKind::MoveClass,
            "MOVE_METHOD" | "MOVE_OPERATION" => RefactoringKind::MoveMethod,
            "MOVE_ATTRIBUTE" => RefactoringKind::MoveAttribute,
            "MOVE_AND_RENAME_CLASS" => RefactoringKind::MoveAndRenameClass,
            "MOVE_AND_RENAME_METHOD" | "MOVE_AND_RENAME_OPERATION" => {
                RefactoringKind::MoveAndRenameMethod
            }
            "MOVE_AND_RENAME_ATTRIBUTE" => RefactoringKind::MoveAndRenameAttribute,
            "EXTRACT_METHOD" | "EXTRACT_OPERATION" => RefactoringKind::ExtractMethod,
            "EXTRACT_CLASS" => RefactoringKind::ExtractClass,
            "EXTRACT_INTERFACE" => RefactoringKind::ExtractInterface,
            "EXTRACT_SUPERCLASS" => RefactoringKind::ExtractSuperclass,
            "EXTRACT_SUBCLASS" => RefactoringKind::ExtractSubclass,
            "EXTRACT_VARIABLE" => RefactoringKind::ExtractVariable,
            "EXTRACT_AND_MOVE_METHOD" | "EXTRACT_AND_MOVE_OPERATION" => {
                RefactoringKind::ExtractAndMoveMethod
            }
            "INLINE_METHOD" | "INLINE_OPERATION" => RefactoringKind::InlineMethod,
            "INLINE_VARIABLE" => RefactoringKind::InlineVariable,
            "MOVE_AND_INLINE_METHOD" | "MOVE_AND_INLINE_OPERATION" => {
                RefactoringKind::MoveAndInlineMethod
            }
            "CHANGE_PARAMETER_TYPE" => RefactoringKind::ChangeParameterType,
            "CHANGE_RETURN_TYPE" => RefactoringKind::ChangeReturnType,
            "ADD_PARAMETER" => RefactoringKind::AddParameter,
            "REMOVE_PARAMETER" => RefactoringKind::RemoveParameter,
            "REORDER_PARAMETER" => RefactoringKind::ReorderParameter,
            "ADD_THROWN_EXCEPTION_TYPE" => RefactoringKind::AddThrownExceptionType,
            "REMOVE_THROWN_EXCEPTION_TYPE" => RefactoringKind::RemoveThrownExceptionType,
            "CHANGE_METHOD_ACCESS_MODIFIER" | "CHANGE_OPERATION_ACCESS_MODIFIER" => {
                RefactoringKind::ChangeMethodAccessModifier
            }
            "CHANGE_ATTRIBUTE_ACCESS_MODIFIER" => RefactoringKind::ChangeAttributeAccessModifier,
            "PULL_UP_METHOD" | "PULL_UP_OPERATION" => RefactoringKind::PullUpMethod,
            "PULL_UP_ATTRIBUTE" => RefactoringKind::PullUpAttribute,
            "PUSH_DOWN_METHOD" | "PUSH_DOWN_OPERATION" => RefactoringKind::PushDownMethod,
            "PUSH_DOWN_ATTRIBUTE" => RefactoringKind::PushDownAttribute,
            "REPLACE_VARIABLE_WITH_ATTRIBUTE" => RefactoringKind::ReplaceVariableWithAttribute,
            "PARAMETERIZE_VARIABLE" => RefactoringKind::ParameterizeVariable,
            "MERGE_PARAMETER" => RefactoringKind::MergeParameter,
            "MERGE_VARIABLE" => RefactoringKind::MergeVariable,
            "MERGE_CLASS" => RefactoringKind::MergeClass,
            "SPLIT_PARAMETER" => RefactoringKind::SplitParameter,
            "SPLIT_VARIABLE" => RefactoringKind::SplitVariable,
            "SPLIT_CLASS" => RefactoringKind::SplitClass,
            other => RefactoringKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RefactoringKind::RenameClass => "RENAME_CLASS",
            RefactoringKind::RenameMethod => "RENAME_METHOD",
            RefactoringKind::RenameAttribute => "RENAME_ATTRIBUTE",
            RefactoringKind::RenameParameter => "RENAME_PARAMETER",
            RefactoringKind::RenameVariable => "RENAME_VARIABLE",
            RefactoringKind::RenamePackage => "RENAME_PACKAGE",
            RefactoringKind::MoveClass => "MOVE_CLASS",
            RefactoringKind::MoveMethod => "MOVE_METHOD",
            RefactoringKind::MoveAttribute => "MOVE_ATTRIBUTE",
            RefactoringKind::MoveAndRenameClass => "MOVE_AND_RENAME_CLASS",
            RefactoringKind::MoveAndRenameMethod => "MOVE_AND_RENAME_METHOD",
            RefactoringKind::MoveAndRenameAttribute => "MOVE_AND_RENAME_ATTRIBUTE",
            RefactoringKind::ExtractMethod => "EXTRACT_METHOD",
            RefactoringKind::ExtractClass => "EXTRACT_CLASS",
            RefactoringKind::ExtractInterface => "EXTRACT_INTERFACE",
            RefactoringKind::ExtractSuperclass => "EXTRACT_SUPERCLASS",
            RefactoringKind::ExtractSubclass => "EXTRACT_SUBCLASS",
            RefactoringKind::ExtractVariable => "EXTRACT_VARIABLE",
            RefactoringKind::ExtractAndMoveMethod => "EXTRACT_AND_MOVE_METHOD",
            RefactoringKind::InlineMethod => "INLINE_METHOD",
            RefactoringKind::InlineVariable => "INLINE_VARIABLE",
            RefactoringKind::MoveAndInlineMethod => "MOVE_AND_INLINE_METHOD",
            RefactoringKind::ChangeParameterType => "CHANGE_PARAMETER_TYPE",
            RefactoringKind::ChangeReturnType => "CHANGE_RETURN_TYPE",
            RefactoringKind::AddParameter => "ADD_PARAMETER",
            RefactoringKind::RemoveParameter => "REMOVE_PARAMETER",
            RefactoringKind::ReorderParameter => "REORDER_PARAMETER",
            RefactoringKind::AddThrownExceptionType => "ADD_THROWN_EXCEPTION_TYPE",
            RefactoringKind::RemoveThrownExceptionType => "REMOVE_THROWN_EXCEPTION_TYPE",
            RefactoringKind::ChangeMethodAccessModifier => "CHANGE_METHOD_ACCESS_MODIFIER",
            RefactoringKind::ChangeAttributeAccessModifier => "CHANGE_ATTRIBUTE_ACCESS_MODIFIER",
            RefactoringKind::PullUpMethod => "PULL_UP_METHOD",
            RefactoringKind::PullUpAttribute => "PULL_UP_ATTRIBUTE",
            RefactoringKind::PushDownMethod => "PUSH_DOWN_METHOD",
            RefactoringKind::PushDownAttribute => "PUSH_DOWN_ATTRIBUTE",
            RefactoringKind::ReplaceVariableWithAttribute => "REPLACE_VARIABLE_WITH_ATTRIBUTE",
            RefactoringKind::ParameterizeVariable => "PARAMETERIZE_VARIABLE",
            RefactoringKind::MergeParameter => "MERGE_PARAMETER",
            RefactoringKind::MergeVariable => "MERGE_VARIABLE",
            RefactoringKind::MergeClass => "MERGE_CLASS",
            RefactoringKind::SplitParameter => "SPLIT_PARAMETER",
            RefactoringKind::SplitVariable => "SPLIT_VARIABLE",
            RefactoringKind::SplitClass => "SPLIT_CLASS",
            RefactoringKind::Other(name) => name,
        }
    }

    pub fn family(&self) -> RefactoringFamily {
        use RefactoringKind::*;
        match self {
            RenameClass | RenameMethod | RenameAttribute | RenameParameter | RenameVariable
            | RenamePackage => RefactoringFamily::Rename,
            MoveClass | MoveMethod | MoveAttribute | MoveAndRenameClass | MoveAndRenameMethod
            | MoveAndRenameAttribute => RefactoringFamily::Move,
            ExtractMethod | ExtractClass | ExtractInterface | ExtractSuperclass
            | ExtractSubclass | ExtractVariable | ExtractAndMoveMethod => {
                RefactoringFamily::Extract
            }
            InlineMethod | InlineVariable | MoveAndInlineMethod => RefactoringFamily::Inline,
            ChangeParameterType | ChangeReturnType | AddParameter | RemoveParameter
            | ReorderParameter | AddThrownExceptionType | RemoveThrownExceptionType
            | ChangeMethodAccessModifier | ChangeAttributeAccessModifier => {
                RefactoringFamily::ChangeSignature
            }
            PullUpMethod | PullUpAttribute | PushDownMethod | PushDownAttribute
            | ReplaceVariableWithAttribute | ParameterizeVariable | MergeParameter
            | MergeVariable | MergeClass | SplitParameter | SplitVariable | SplitClass
            | Other(_) => RefactoringFamily::Other,
        }
    }

    /// Evolution edge kind emitted for this operation.
    pub fn edge_kind(&self) -> EdgeKind {
        match self.family() {
            RefactoringFamily::Rename => EdgeKind::Renamed,
            RefactoringFamily::Move => EdgeKind::Moved,
            RefactoringFamily::Extract => EdgeKind::Extracted,
            RefactoringFamily::Inline => EdgeKind::Inlined,
            RefactoringFamily::ChangeSignature => EdgeKind::ChangedSignature,
            RefactoringFamily::Other => EdgeKind::Refactored,
        }
    }

    /// Finer classification stored on the evolution edge.
    pub fn sub_type(&self) -> Option<&'static str> {
        use RefactoringKind::*;
        let sub = match self {
            RenameClass | MoveClass | MoveAndRenameClass | ExtractClass => "class",
            RenameMethod | MoveMethod | MoveAndRenameMethod | ExtractMethod
            | ExtractAndMoveMethod | InlineMethod | MoveAndInlineMethod => "method",
            RenameAttribute | MoveAttribute | MoveAndRenameAttribute => "field",
            RenameParameter => "parameter",
            RenameVariable | ExtractVariable | InlineVariable => "variable",
            RenamePackage => "package",
            ExtractInterface => "interface",
            ExtractSuperclass => "superclass",
            ExtractSubclass => "subclass",
            ChangeParameterType => "parameter_type",
            ChangeReturnType => "return_type",
            AddParameter => "add_parameter",
            RemoveParameter => "remove_parameter",
            ReorderParameter => "reorder_parameter",
            AddThrownExceptionType => "add_exception",
            RemoveThrownExceptionType => "remove_exception",
            ChangeMethodAccessModifier | ChangeAttributeAccessModifier => "modifier",
            PullUpMethod | PullUpAttribute => "pull_up",
            PushDownMethod | PushDownAttribute => "push_down",
            ReplaceVariableWithAttribute => "replace",
            ParameterizeVariable => "parameterize",
            MergeParameter | MergeVariable | MergeClass => "merge",
            SplitParameter | SplitVariable | SplitClass => "split",
            Other(_) => return None,
        };
        Some(sub)
    }

    /// Node kind the operation's locations point at, when the kind implies one.
    pub fn target_kind(&self) -> Option<NodeKind> {
        use RefactoringKind::*;
        match self {
            RenameClass | MoveClass | MoveAndRenameClass | ExtractClass | ExtractInterface
            | ExtractSuperclass | ExtractSubclass | MergeClass | SplitClass => Some(NodeKind::Type),
            RenameAttribute | MoveAttribute | MoveAndRenameAttribute
            | ChangeAttributeAccessModifier | PullUpAttribute | PushDownAttribute => {
                Some(NodeKind::Field)
            }
            RenameMethod | MoveMethod | MoveAndRenameMethod | ExtractMethod
            | ExtractAndMoveMethod | InlineMethod | MoveAndInlineMethod | ChangeParameterType
            | ChangeReturnType | AddParameter | RemoveParameter | ReorderParameter
            | AddThrownExceptionType | RemoveThrownExceptionType | ChangeMethodAccessModifier
            | PullUpMethod | PushDownMethod | RenameParameter | RenameVariable | ExtractVariable
            | InlineVariable | ReplaceVariableWithAttribute | ParameterizeVariable
            | MergeParameter | MergeVariable | SplitParameter | SplitVariable => {
                Some(NodeKind::Method)
            }
            RenamePackage | Other(_) => None,
        }
    }

    /// Whether the operation changes a method's identity key while keeping the entity.
    pub fn rekeys_method(&self) -> bool {
        matches!(
            self.family(),
            RefactoringFamily::Rename | RefactoringFamily::Move | RefactoringFamily::ChangeSignature
        ) && self.target_kind() == Some(NodeKind::Method)
    }
}

/// `"Rename Method"` → `"RENAME_METHOD"`.
fn normalize_kind_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// One side of a refactoring: a code range in one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLocation {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub code_element: Option<String>,
    /// Kind hint derived from the detector's element type, when it reports one.
    pub element_kind: Option<NodeKind>,
}

impl CodeLocation {
    pub fn new(file_path: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        CodeLocation {
            file_path: file_path.into(),
            start_line,
            end_line,
            code_element: None,
            element_kind: None,
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.code_element = Some(element.into());
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.element_kind = Some(kind);
        self
    }

    /// `path:start-end::element`, the form stored on evolution edges.
    pub fn describe(&self) -> String {
        let mut out = format!("{}:{}-{}", self.file_path, self.start_line, self.end_line);
        if let Some(element) = &self.code_element {
            out.push_str("::");
            out.push_str(element.trim());
        }
        out
    }

    /// Simple name of the element, e.g. `foo` for `public foo(a int) : void`.
    pub fn element_name(&self) -> Option<&str> {
        let element = self.code_element.as_deref()?.trim();
        let head = match (element.find('('), element.find(" : ")) {
            (Some(paren), _) => &element[..paren],
            (None, Some(colon)) => &element[..colon],
            (None, None) => element,
        };
        let last = head.split_whitespace().last()?;
        let name = last.rsplit('.').next().unwrap_or(last);
        (!name.is_empty()).then_some(name)
    }

    pub fn is_method_element(&self) -> bool {
        self.code_element
            .as_deref()
            .is_some_and(|e| e.contains('(') && e.contains(')'))
    }

    /// Tracking key `path::element` for method-shaped locations.
    pub fn method_key(&self) -> Option<String> {
        if !self.is_method_element() {
            return None;
        }
        let element = self.code_element.as_deref()?.trim();
        Some(format!("{}::{}", self.file_path, element))
    }
}

/// A refactoring detected between two commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactoringOperation {
    pub kind: RefactoringKind,
    pub description: String,
    pub before: Vec<CodeLocation>,
    pub after: Vec<CodeLocation>,
    /// In `[0, 1]`.
    pub confidence: f32,
}

impl RefactoringOperation {
    pub fn new(kind: RefactoringKind) -> Self {
        RefactoringOperation {
            kind,
            description: String::new(),
            before: Vec::new(),
            after: Vec::new(),
            confidence: 1.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_before(mut self, location: CodeLocation) -> Self {
        self.before.push(location);
        self
    }

    pub fn with_after(mut self, location: CodeLocation) -> Self {
        self.after.push(location);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Kind hint for one location: the location's own, else the operation's.
    pub fn kind_hint(&self, location: &CodeLocation) -> Option<NodeKind> {
        location.element_kind.or_else(|| self.kind.target_kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_names() {
        let mut diagnostics = Diagnostics::new();
        assert_eq!(
            RefactoringKind::parse("Rename Method", &mut diagnostics),
            RefactoringKind::RenameMethod
        );
        assert_eq!(
            RefactoringKind::parse("MOVE_AND_RENAME_OPERATION", &mut diagnostics),
            RefactoringKind::MoveAndRenameMethod
        );
        assert_eq!(
            RefactoringKind::parse("Extract And Move Method", &mut diagnostics),
            RefactoringKind::ExtractAndMoveMethod
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_kind_is_refactored_without_warning() {
        let mut diagnostics = Diagnostics::new();
        let kind = RefactoringKind::parse("Encapsulate Attribute", &mut diagnostics);
        assert_eq!(kind, RefactoringKind::Other("ENCAPSULATE_ATTRIBUTE".to_string()));
        assert_eq!(kind.edge_kind(), EdgeKind::Refactored);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_kind_is_counted() {
        let mut diagnostics = Diagnostics::new();
        let kind = RefactoringKind::parse("  ", &mut diagnostics);
        assert_eq!(kind, RefactoringKind::Other("UNKNOWN".to_string()));
        assert_eq!(kind.edge_kind(), EdgeKind::Refactored);

        RefactoringKind::parse("rename/method?", &mut diagnostics);
        assert_eq!(diagnostics.warning_count(), 2);
    }

    #[test]
    fn test_edge_kind_by_family() {
        assert_eq!(RefactoringKind::RenameMethod.edge_kind(), EdgeKind::Renamed);
        assert_eq!(RefactoringKind::MoveAndRenameClass.edge_kind(), EdgeKind::Moved);
        assert_eq!(RefactoringKind::ExtractAndMoveMethod.edge_kind(), EdgeKind::Extracted);
        assert_eq!(RefactoringKind::MoveAndInlineMethod.edge_kind(), EdgeKind::Inlined);
        assert_eq!(RefactoringKind::AddThrownExceptionType.edge_kind(), EdgeKind::ChangedSignature);
        assert_eq!(RefactoringKind::PullUpMethod.edge_kind(), EdgeKind::Refactored);
        assert_eq!(RefactoringKind::PullUpMethod.sub_type(), Some("pull_up"));
    }

    #[test]
    fn test_rekeys_only_method_identity_changes() {
        assert!(RefactoringKind::RenameMethod.rekeys_method());
        assert!(RefactoringKind::MoveMethod.rekeys_method());
        assert!(RefactoringKind::ChangeReturnType.rekeys_method());
        assert!(!RefactoringKind::RenameClass.rekeys_method());
        assert!(!RefactoringKind::ExtractMethod.rekeys_method());
        assert!(!RefactoringKind::ChangeAttributeAccessModifier.rekeys_method());
    }

    #[test]
    fn test_location_element_name() {
        let method = CodeLocation::new("src/A.java", 3, 9).with_element("public foo(a int) : void");
        assert_eq!(method.element_name(), Some("foo"));
        assert!(method.is_method_element());
        assert_eq!(method.method_key().as_deref(), Some("src/A.java::public foo(a int) : void"));

        let field = CodeLocation::new("src/A.java", 2, 2).with_element("private count : int");
        assert_eq!(field.element_name(), Some("count"));
        assert_eq!(field.method_key(), None);

        let class = CodeLocation::new("src/A.java", 1, 40).with_element("pkg.A");
        assert_eq!(class.element_name(), Some("A"));
        assert_eq!(class.describe(), "src/A.java:1-40::pkg.A");
    }
}
