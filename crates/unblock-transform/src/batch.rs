// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Batch surface: transform every method of a set of class units.
//!
//! Methods are independent. A failing method is left out of the output
//! and reported; the rest of its class still transforms. Closure bodies
//! are ordinary (lambda-flagged) methods and go through the same path.

use rayon::prelude::*;
use serde::Serialize;

use unblock_diagnostics::json::{to_json_report, to_json_string};
use unblock_diagnostics::{Diagnostic, ToDiagnostic};
use unblock_ir::{ClassUnit, Location, Method};

use crate::{transform_method, FailureKind, MethodOutput, TransformError, TransformOptions};

#[derive(Debug, Clone)]
pub struct ClassOutput {
    pub class: String,
    /// Successful outputs in input order.
    pub methods: Vec<MethodOutput>,
}

impl ClassOutput {
    /// The class as it should be emitted: entries, dispatchers and
    /// untouched methods.
    pub fn to_unit(&self) -> ClassUnit {
        let methods = self
            .methods
            .iter()
            .flat_map(|m| m.methods().into_iter().cloned())
            .collect();
        ClassUnit::new(self.class.clone(), methods)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub class: String,
    pub method: String,
    pub kind: FailureKind,
    pub location: Location,
    pub detail: String,
    #[serde(skip)]
    pub error: TransformError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub failures: Vec<Failure>,
    pub transformed: usize,
    pub unchanged: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.failures.iter().map(|f| f.error.to_diagnostic()).collect()
    }

    pub fn to_json(&self) -> String {
        to_json_string(&to_json_report(&self.diagnostics(), "transform"))
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub classes: Vec<ClassOutput>,
    pub report: BatchReport,
}

impl BatchOutput {
    pub fn units(&self) -> Vec<ClassUnit> {
        self.classes.iter().map(ClassOutput::to_unit).collect()
    }
}

pub fn transform_batch(units: &[ClassUnit], options: &TransformOptions) -> BatchOutput {
    let _span = tracing::info_span!(target: "unblock::batch", "transform_batch", classes = units.len())
        .entered();

    let jobs: Vec<(usize, &ClassUnit, &Method)> = units
        .iter()
        .enumerate()
        .flat_map(|(i, unit)| unit.methods.iter().map(move |m| (i, unit, m)))
        .collect();

    let run = |(idx, unit, method): &(usize, &ClassUnit, &Method)| {
        (*idx, run_one(unit, method, options))
    };
    let results: Vec<(usize, Result<MethodOutput, TransformError>)> = if options.parallel {
        jobs.par_iter().map(run).collect()
    } else {
        jobs.iter().map(run).collect()
    };

    let mut classes: Vec<ClassOutput> = units
        .iter()
        .map(|u| ClassOutput {
            class: u.name.clone(),
            methods: Vec::new(),
        })
        .collect();
    let mut report = BatchReport::default();

    for ((idx, result), (_, unit, method)) in results.into_iter().zip(&jobs) {
        match result {
            Ok(output) => {
                match output {
                    MethodOutput::Transformed(_) => report.transformed += 1,
                    MethodOutput::Unchanged(_) => report.unchanged += 1,
                }
                classes[idx].methods.push(output);
            }
            Err(error) => {
                tracing::warn!(
                    target: "unblock::batch",
                    method = error.method(),
                    kind = %error.kind(),
                    "method left untransformed"
                );
                report.failures.push(Failure {
                    class: unit.name.clone(),
                    method: method.name.clone(),
                    kind: error.kind(),
                    location: error.location(),
                    detail: error.detail(),
                    error,
                });
            }
        }
    }

    tracing::info!(
        target: "unblock::batch",
        transformed = report.transformed,
        unchanged = report.unchanged,
        failed = report.failures.len(),
        "batch finished"
    );
    BatchOutput { classes, report }
}

fn run_one(
    unit: &ClassUnit,
    method: &Method,
    options: &TransformOptions,
) -> Result<MethodOutput, TransformError> {
    let output = transform_method(method, &unit.name, options)?;
    if let MethodOutput::Transformed(pair) = &output {
        if unit.method(&pair.dispatcher.name).is_some() {
            return Err(TransformError::MalformedCode {
                method: method.qualified(&unit.name),
                at: Location::new(method.entry_block, 0),
                detail: format!(
                    "dispatcher name `{}` is already taken in the class",
                    pair.dispatcher.name
                ),
            });
        }
    }
    Ok(output)
}
