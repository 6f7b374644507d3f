// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Transform diagnostics.
//!
//! Provides a unified diagnostic type consumed by build tooling. Each pass's
//! error types are converted to `Diagnostic` via the `ToDiagnostic` trait,
//! keeping the transform crate free of rendering concerns.

pub mod codes;
pub mod formatter;
pub mod json;

use serde::Serialize;
use unblock_ir::Location;

// ============================================================================
// Core Types
// ============================================================================

/// A diagnostic against one input method.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    /// Qualified name of the offending method (`Class.method`).
    pub method: Option<String>,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

/// A labeled instruction position within a diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub location: Location,
    pub style: LabelStyle,
    pub message: Option<String>,
}

/// How a label should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// Offending instruction (red underline).
    Primary,
    /// Related position (blue underline).
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// An error code like T0001.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorCode(pub String);

// ============================================================================
// Builder API
// ============================================================================

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            method: None,
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(ErrorCode(code.into()));
        self
    }

    pub fn in_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_label(
        mut self,
        location: Location,
        style: LabelStyle,
        msg: impl Into<String>,
    ) -> Self {
        self.labels.push(Label {
            location,
            style,
            message: Some(msg.into()),
        });
        self
    }

    pub fn with_primary(self, location: Location, msg: impl Into<String>) -> Self {
        self.with_label(location, LabelStyle::Primary, msg)
    }

    pub fn with_secondary(self, location: Location, msg: impl Into<String>) -> Self {
        self.with_label(location, LabelStyle::Secondary, msg)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Returns the primary location (first primary label, or first label).
    pub fn primary_location(&self) -> Option<Location> {
        self.labels
            .iter()
            .find(|l| l.style == LabelStyle::Primary)
            .or(self.labels.first())
            .map(|l| l.location)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

// ============================================================================
// Conversion Trait
// ============================================================================

/// Convert a transform error into a rich diagnostic.
pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}
