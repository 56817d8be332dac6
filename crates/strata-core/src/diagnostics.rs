//! Non-fatal issues collected over one run

use crate::model::NodeKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Which side of a refactoring a location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Before,
    After,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Before => f.write_str("before"),
            Side::After => f.write_str("after"),
        }
    }
}

/// A problem that was skipped instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum Warning {
    #[error("identity collision on {kind:?} `{key}`, first-seen node kept")]
    IdentityCollision { kind: NodeKind, key: String },

    #[error("unresolved {side} location `{location}` for {operation}")]
    UnresolvedRefactoringLocation {
        operation: String,
        side: Side,
        location: String,
    },

    #[error("malformed refactoring descriptor `{raw}`, treated as a generic refactoring")]
    MalformedOperationDescriptor { raw: String },
}

/// Discriminant of [`Warning`], used for per-kind counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    IdentityCollision,
    UnresolvedRefactoringLocation,
    MalformedOperationDescriptor,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::IdentityCollision => "IdentityCollision",
            WarningKind::UnresolvedRefactoringLocation => "UnresolvedRefactoringLocation",
            WarningKind::MalformedOperationDescriptor => "MalformedOperationDescriptor",
        }
    }
}

impl Warning {
    pub fn kind(&self) -> WarningKind {
        match self {
            Warning::IdentityCollision { .. } => WarningKind::IdentityCollision,
            Warning::UnresolvedRefactoringLocation { .. } => {
                WarningKind::UnresolvedRefactoringLocation
            }
            Warning::MalformedOperationDescriptor { .. } => {
                WarningKind::MalformedOperationDescriptor
            }
        }
    }
}

/// Per-run warning sink. Create one per run and pass it down explicitly.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    /// Log and keep a warning.
    pub fn record(&mut self, warning: Warning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn count_of(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind() == kind).count()
    }

    /// Warning counts keyed by kind name; kinds without warnings are omitted.
    pub fn by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for warning in &self.warnings {
            *counts.entry(warning.kind().as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Move every warning of `other` into this sink without logging them again.
    pub fn absorb(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }
}
