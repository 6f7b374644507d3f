// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal formatter for diagnostics.
//!
//! Renders the offending instructions straight out of the input method:
//!
//! ```text
//! error[T0001]: suspend marker called with values pending on the operand stack
//!   --> Orders.total bb1:3
//!        |
//!  bb1:3 | invoke Await.await/1 -> int
//!        | ^^^^^^^^^^^^^^^^^^^^^^^^^^^ 1 value beneath the awaited future
//!        |
//!        = help: store the pending value in a local before awaiting
//! ```

use colored::Colorize;

use unblock_ir::{Location, Method};

use crate::{Diagnostic, LabelStyle, Severity};

/// Formats diagnostics for terminal output.
pub struct DiagnosticFormatter<'a> {
    method: Option<&'a Method>,
}

/// One listed instruction with its labels.
struct AnnotatedInstr {
    location: Location,
    text: String,
    annotations: Vec<(LabelStyle, Option<String>)>,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new() -> Self {
        Self { method: None }
    }

    /// Show instruction text from `method` under each label.
    pub fn with_method(mut self, method: &'a Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();

        self.format_header(&mut out, diagnostic);

        let annotated = self.collect_annotated(diagnostic);
        let gutter_width = annotated
            .iter()
            .map(|a| a.location.to_string().len())
            .max()
            .unwrap_or(2)
            .max(2);

        if let Some(first) = diagnostic.primary_location() {
            let method = diagnostic.method.as_deref().unwrap_or("<method>");
            out.push_str(&format!("  {} {} {}\n", "-->".blue(), method, first));
        }

        if !annotated.is_empty() {
            out.push_str(&format!("{} {}\n", " ".repeat(gutter_width + 1), "|".blue()));
            for line in &annotated {
                out.push_str(&format!(
                    "{:>width$} {} {}\n",
                    line.location.to_string().blue().bold(),
                    "|".blue(),
                    line.text,
                    width = gutter_width + 1,
                ));
                self.format_annotations(&mut out, line, gutter_width);
            }
        }

        self.format_footer(&mut out, diagnostic, gutter_width);
        out
    }

    fn format_header(&self, out: &mut String, diagnostic: &Diagnostic) {
        let severity_str = match diagnostic.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Note => "note".blue().bold(),
        };

        if let Some(ref code) = diagnostic.code {
            out.push_str(&format!(
                "{}[{}]: {}\n",
                severity_str,
                code.0.clone().red().bold(),
                diagnostic.message.bold()
            ));
        } else {
            out.push_str(&format!("{}: {}\n", severity_str, diagnostic.message.bold()));
        }
    }

    fn format_footer(&self, out: &mut String, diagnostic: &Diagnostic, gutter_width: usize) {
        for note in &diagnostic.notes {
            out.push_str(&format!(
                "{} {} {}: {}\n",
                " ".repeat(gutter_width + 1),
                "=".cyan(),
                "note".cyan().bold(),
                note
            ));
        }
        if let Some(ref help) = diagnostic.help {
            out.push_str(&format!(
                "{} {} {}: {}\n",
                " ".repeat(gutter_width + 1),
                "=".cyan(),
                "help".cyan().bold(),
                help
            ));
        }
    }

    fn collect_annotated(&self, diagnostic: &Diagnostic) -> Vec<AnnotatedInstr> {
        let mut by_location: std::collections::BTreeMap<Location, AnnotatedInstr> =
            std::collections::BTreeMap::new();

        for label in &diagnostic.labels {
            let entry = by_location
                .entry(label.location)
                .or_insert_with(|| AnnotatedInstr {
                    location: label.location,
                    text: self.instr_text(label.location),
                    annotations: Vec::new(),
                });
            entry.annotations.push((label.style, label.message.clone()));
        }

        by_location.into_values().collect()
    }

    fn format_annotations(&self, out: &mut String, line: &AnnotatedInstr, gutter_width: usize) {
        let width = line.text.chars().count().max(1);
        for (style, message) in &line.annotations {
            let underline = match style {
                LabelStyle::Primary => "^".repeat(width).red().bold(),
                LabelStyle::Secondary => "-".repeat(width).blue(),
            };
            let msg = match (style, message) {
                (LabelStyle::Primary, Some(m)) => m.red().bold().to_string(),
                (LabelStyle::Secondary, Some(m)) => m.blue().to_string(),
                (_, None) => String::new(),
            };
            out.push_str(&format!(
                "{} {} {} {}\n",
                " ".repeat(gutter_width + 1),
                "|".blue(),
                underline,
                msg
            ));
        }
    }

    /// Text of the instruction (or terminator) at `location`.
    fn instr_text(&self, location: Location) -> String {
        let Some(block) = self.method.and_then(|m| m.block(location.block)) else {
            return String::from("<unavailable>");
        };
        let offset = location.offset as usize;
        match block.instrs.get(offset) {
            Some(instr) => instr.to_string(),
            None => block.terminator.to_string(),
        }
    }
}

impl Default for DiagnosticFormatter<'_> {
    fn default() -> Self {
        Self::new()
    }
}
