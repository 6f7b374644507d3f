// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Direct-style to continuation transform.
//!
//! A method that calls a suspend marker (`Await.await(future)`) is split
//! into an entry method and a dispatcher. The entry returns a future right
//! away; the dispatcher is a state machine with one state per suspension
//! point that resumes the method piecewise as each awaited future settles,
//! without ever blocking a thread.
//!
//! Pipeline per method:
//!
//! 1. structural checks (`verify`)
//! 2. finally normalization (`finally`)
//! 3. suspension-split CFG (`cfg`), stack and monitor discipline (`flow`)
//! 4. liveness and suspension points (`liveness`, `suspend`)
//! 5. segmentation (`segment`)
//! 6. dispatcher, region rewriting, entry (`dispatch`, `regions`, `entry`)
//!
//! Any failure aborts that method only; see [`transform_batch`].

pub mod batch;
pub mod cfg;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod finally;
pub mod flow;
pub mod liveness;
pub mod options;
pub mod regions;
pub mod segment;
pub mod suspend;
pub mod verify;

pub use batch::{transform_batch, BatchOutput, BatchReport, ClassOutput, Failure};
pub use error::{FailureKind, TransformError};
pub use liveness::LiveSet;
pub use options::{OptionsError, TransformOptions};
pub use regions::RegionPiece;
pub use segment::{Segment, SegmentExit};
pub use suspend::SuspensionPoint;

use unblock_ir::{Instr, Location, Method};

use crate::cfg::Cfg;
use crate::liveness::Liveness;

/// Entry method plus dispatcher, with the analysis that shaped them.
#[derive(Debug, Clone)]
pub struct GeneratedMethodPair {
    pub entry: Method,
    pub dispatcher: Method,
    /// States 1..=N in order.
    pub suspension_points: Vec<SuspensionPoint>,
    pub segments: Vec<Segment>,
    /// Rewritten regions in dispatcher table order (the catch-all excluded).
    pub regions: Vec<RegionPiece>,
}

/// Result for one input method.
#[derive(Debug, Clone)]
pub enum MethodOutput {
    Transformed(Box<GeneratedMethodPair>),
    /// No suspend marker; the method is passed through as is.
    Unchanged(Method),
}

impl MethodOutput {
    /// Methods to emit in place of the input.
    pub fn methods(&self) -> Vec<&Method> {
        match self {
            MethodOutput::Transformed(pair) => vec![&pair.entry, &pair.dispatcher],
            MethodOutput::Unchanged(method) => vec![method],
        }
    }

    pub fn as_pair(&self) -> Option<&GeneratedMethodPair> {
        match self {
            MethodOutput::Transformed(pair) => Some(pair),
            MethodOutput::Unchanged(_) => None,
        }
    }
}

/// Per-method context: qualified name for diagnostics plus options.
pub struct MethodCtx<'a> {
    pub qualified: &'a str,
    pub options: &'a TransformOptions,
}

impl<'a> MethodCtx<'a> {
    pub fn new(qualified: &'a str, options: &'a TransformOptions) -> Self {
        Self { qualified, options }
    }

    pub fn is_marker(&self, instr: &Instr) -> bool {
        matches!(instr, Instr::Invoke { func } if self.options.is_suspend_marker(&func.name))
    }

    pub fn malformed(&self, at: Location, detail: impl Into<String>) -> TransformError {
        TransformError::MalformedCode {
            method: self.qualified.to_string(),
            at,
            detail: detail.into(),
        }
    }

    pub fn unbalanced(&self, at: Location, detail: impl Into<String>) -> TransformError {
        TransformError::UnbalancedSynchronizedRegion {
            method: self.qualified.to_string(),
            at,
            detail: detail.into(),
        }
    }
}

/// Check if a method calls any configured suspend marker.
pub fn has_suspension_points(method: &Method, options: &TransformOptions) -> bool {
    method.calls_any(|name| options.is_suspend_marker(name))
}

/// Transform one method of class `class`.
///
/// Methods without suspend markers come back [`MethodOutput::Unchanged`],
/// which makes re-running the transform on its own output a no-op.
pub fn transform_method(
    method: &Method,
    class: &str,
    options: &TransformOptions,
) -> Result<MethodOutput, TransformError> {
    if !has_suspension_points(method, options) {
        return Ok(MethodOutput::Unchanged(method.clone()));
    }

    let qualified = method.qualified(class);
    let ctx = MethodCtx::new(&qualified, options);
    let _span = tracing::debug_span!(target: "unblock::analyze", "transform", method = %qualified)
        .entered();

    verify::check_references(method, &ctx)?;
    verify::check_marker_arity(method, &ctx)?;
    verify::check_region_shape(method, &ctx)?;
    verify::check_reachable_suspensions(method, &ctx)?;

    let normalized = finally::normalize(method, &ctx)?;
    let cfg = Cfg::build(&normalized, &ctx);
    let facts = flow::check(&cfg, &normalized.ret_ty, &ctx)?;
    verify::check_entered_suspensions(method, &cfg, &facts.reachable, &ctx)?;
    let liveness = Liveness::analyze(&cfg, &normalized, &facts.reachable);

    let order = suspend::walk_order(&cfg, &facts.reachable);
    let points = suspend::collect(&cfg, &normalized, &order, &liveness);
    let seg = segment::segment(&cfg, &normalized, &points, &facts.reachable);

    let emitted = dispatch::emit(&normalized, &cfg, &points, &seg, &ctx);
    let pieces = regions::rewrite(&cfg, &seg, &points, &emitted);
    let dispatcher = emitted.finish(&normalized, &pieces);
    let entry = entry::synthesize(method, &dispatcher.name);

    tracing::debug!(
        target: "unblock::synth",
        method = %qualified,
        states = points.len() + 1,
        blocks = dispatcher.blocks.len(),
        "dispatcher generated"
    );

    Ok(MethodOutput::Transformed(Box::new(GeneratedMethodPair {
        entry,
        dispatcher,
        suspension_points: points,
        segments: seg.segments,
        regions: pieces,
    })))
}
