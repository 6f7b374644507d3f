//! JSON diagnostic output for build tooling.
//!
//! Produces one structured report per transform run. Every diagnostic carries
//! the offending method, its instruction location and the error category, so
//! a batch over many methods can be triaged without re-running the transform.

use serde::Serialize;
use unblock_ir::Location;

use crate::{codes::ErrorCodeRegistry, Diagnostic, LabelStyle, Severity};

/// A complete JSON diagnostic report for a transform run.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Whether every method transformed (no errors).
    pub success: bool,
    /// The pass that produced these diagnostics.
    pub phase: String,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
}

/// A single diagnostic in JSON form.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// Severity: "error", "warning", or "note".
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error category (e.g., "Suspension", "ExceptionTable").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub labels: Vec<JsonLabel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// A labeled location in JSON form.
#[derive(Debug, Serialize)]
pub struct JsonLabel {
    /// "primary" or "secondary".
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub location: Location,
}

/// Convert diagnostics to a structured JSON report.
pub fn to_json_report(diagnostics: &[Diagnostic], phase: &str) -> DiagnosticReport {
    let registry = ErrorCodeRegistry::default();
    let mut error_count = 0;
    let mut warning_count = 0;

    let json_diags: Vec<JsonDiagnostic> = diagnostics
        .iter()
        .map(|d| {
            if d.is_error() {
                error_count += 1;
            } else if d.severity == Severity::Warning {
                warning_count += 1;
            }
            to_json_diagnostic(d, &registry)
        })
        .collect();

    DiagnosticReport {
        version: 1,
        success: error_count == 0,
        phase: phase.to_string(),
        diagnostics: json_diags,
        error_count,
        warning_count,
    }
}

fn to_json_diagnostic(diag: &Diagnostic, registry: &ErrorCodeRegistry) -> JsonDiagnostic {
    let severity = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
    };

    let code = diag.code.as_ref().map(|c| c.0.clone());
    let category = code
        .as_ref()
        .and_then(|c| registry.get(c))
        .map(|info| info.category.to_string());

    let labels = diag
        .labels
        .iter()
        .map(|l| JsonLabel {
            role: match l.style {
                LabelStyle::Primary => "primary".to_string(),
                LabelStyle::Secondary => "secondary".to_string(),
            },
            message: l.message.clone(),
            location: l.location,
        })
        .collect();

    JsonDiagnostic {
        severity: severity.to_string(),
        code,
        category,
        message: diag.message.clone(),
        method: diag.method.clone(),
        location: diag.primary_location(),
        labels,
        notes: diag.notes.clone(),
        help: diag.help.clone(),
    }
}

/// Serialize a diagnostic report to pretty JSON.
pub fn to_json_string(report: &DiagnosticReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use unblock_ir::BlockId;

    #[test]
    fn report_counts_and_categorizes() {
        let diags = vec![
            Diagnostic::error("held lock")
                .with_code("T0002")
                .in_method("Cache.refresh")
                .with_primary(Location::new(BlockId(3), 1), "suspends here"),
            Diagnostic::warning("nothing to do"),
        ];
        let report = to_json_report(&diags, "transform");
        assert!(!report.success);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.warning_count, 1);
        assert_eq!(
            report.diagnostics[0].category.as_deref(),
            Some("Synchronization")
        );

        let text = to_json_string(&report);
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["diagnostics"][0]["method"], "Cache.refresh");
        assert_eq!(value["diagnostics"][0]["location"]["block"], 3);
        assert_eq!(value["diagnostics"][0]["location"]["offset"], 1);
    }
}
