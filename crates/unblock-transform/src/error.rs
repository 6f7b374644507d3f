// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Transform errors and their diagnostic rendering.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use unblock_diagnostics::{Diagnostic, ToDiagnostic};
use unblock_ir::{Location, RegionId};

/// Failure category of a rejected method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    UnsupportedSuspensionPosition,
    UnbalancedSynchronizedRegion,
    UnreachableSuspensionState,
    AmbiguousExceptionRegion,
    MalformedCode,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::UnsupportedSuspensionPosition => "T0001",
            FailureKind::UnbalancedSynchronizedRegion => "T0002",
            FailureKind::UnreachableSuspensionState => "T0003",
            FailureKind::AmbiguousExceptionRegion => "T0004",
            FailureKind::MalformedCode => "T0005",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::UnsupportedSuspensionPosition => "unsupported suspension position",
            FailureKind::UnbalancedSynchronizedRegion => "unbalanced synchronized region",
            FailureKind::UnreachableSuspensionState => "unreachable suspension state",
            FailureKind::AmbiguousExceptionRegion => "ambiguous exception region",
            FailureKind::MalformedCode => "malformed code",
        };
        f.write_str(name)
    }
}

/// Why a method could not be transformed. `method` is the qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("suspend marker in unsupported position in `{method}` at {at}: {detail}")]
    UnsupportedSuspensionPosition {
        method: String,
        at: Location,
        detail: String,
    },

    #[error("unbalanced synchronized region in `{method}` at {at}: {detail}")]
    UnbalancedSynchronizedRegion {
        method: String,
        at: Location,
        detail: String,
    },

    #[error("suspension point in `{method}` at {at} is unreachable")]
    UnreachableSuspensionState { method: String, at: Location },

    #[error("ambiguous exception regions r{} and r{} in `{method}`: {detail}", .first.0, .second.0)]
    AmbiguousExceptionRegion {
        method: String,
        first: RegionId,
        second: RegionId,
        at: Location,
        /// Handler entries of `first` and `second`.
        handlers: (Location, Location),
        detail: String,
    },

    #[error("malformed code in `{method}` at {at}: {detail}")]
    MalformedCode {
        method: String,
        at: Location,
        detail: String,
    },
}

impl TransformError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransformError::UnsupportedSuspensionPosition { .. } => {
                FailureKind::UnsupportedSuspensionPosition
            }
            TransformError::UnbalancedSynchronizedRegion { .. } => {
                FailureKind::UnbalancedSynchronizedRegion
            }
            TransformError::UnreachableSuspensionState { .. } => {
                FailureKind::UnreachableSuspensionState
            }
            TransformError::AmbiguousExceptionRegion { .. } => FailureKind::AmbiguousExceptionRegion,
            TransformError::MalformedCode { .. } => FailureKind::MalformedCode,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            TransformError::UnsupportedSuspensionPosition { method, .. }
            | TransformError::UnbalancedSynchronizedRegion { method, .. }
            | TransformError::UnreachableSuspensionState { method, .. }
            | TransformError::AmbiguousExceptionRegion { method, .. }
            | TransformError::MalformedCode { method, .. } => method,
        }
    }

    /// Offending position in the input method.
    pub fn location(&self) -> Location {
        match self {
            TransformError::UnsupportedSuspensionPosition { at, .. }
            | TransformError::UnbalancedSynchronizedRegion { at, .. }
            | TransformError::UnreachableSuspensionState { at, .. }
            | TransformError::AmbiguousExceptionRegion { at, .. }
            | TransformError::MalformedCode { at, .. } => *at,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            TransformError::UnsupportedSuspensionPosition { detail, .. }
            | TransformError::UnbalancedSynchronizedRegion { detail, .. }
            | TransformError::AmbiguousExceptionRegion { detail, .. }
            | TransformError::MalformedCode { detail, .. } => detail.clone(),
            TransformError::UnreachableSuspensionState { .. } => {
                "no path from the method entry reaches this suspend marker".to_string()
            }
        }
    }
}

impl ToDiagnostic for TransformError {
    fn to_diagnostic(&self) -> Diagnostic {
        let kind = self.kind();
        let diag = Diagnostic::error(self.to_string())
            .with_code(kind.code())
            .in_method(self.method());

        match self {
            TransformError::UnsupportedSuspensionPosition { at, detail, .. } => diag
                .with_primary(*at, detail.clone())
                .with_help("store pending operands in locals before awaiting"),
            TransformError::UnbalancedSynchronizedRegion { at, detail, .. } => diag
                .with_primary(*at, detail.clone())
                .with_note("a monitor cannot be held across a suspension")
                .with_help("release the lock before awaiting, or await outside the synchronized block"),
            TransformError::UnreachableSuspensionState { at, .. } => diag
                .with_primary(*at, "never executed")
                .with_help("remove the dead code containing this await"),
            TransformError::AmbiguousExceptionRegion {
                first,
                second,
                at,
                handlers,
                ..
            } => diag
                .with_primary(*at, format!("covered by r{} and r{}", first.0, second.0))
                .with_secondary(handlers.0, format!("handler of r{}", first.0))
                .with_secondary(handlers.1, format!("handler of r{}", second.0))
                .with_note("regions must nest, innermost listed first"),
            TransformError::MalformedCode { at, detail, .. } => {
                diag.with_primary(*at, detail.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unblock_diagnostics::LabelStyle;
    use unblock_ir::BlockId;

    #[test]
    fn diagnostic_carries_code_method_and_location() {
        let err = TransformError::UnbalancedSynchronizedRegion {
            method: "Cache.refresh".into(),
            at: Location::new(BlockId(2), 4),
            detail: "suspends while holding 1 monitor".into(),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_ref().map(|c| c.0.as_str()), Some("T0002"));
        assert_eq!(diag.method.as_deref(), Some("Cache.refresh"));
        assert_eq!(diag.primary_location(), Some(Location::new(BlockId(2), 4)));
        assert_eq!(err.kind(), FailureKind::UnbalancedSynchronizedRegion);
    }

    #[test]
    fn message_names_both_regions() {
        let err = TransformError::AmbiguousExceptionRegion {
            method: "A.b".into(),
            first: RegionId(0),
            second: RegionId(1),
            at: Location::new(BlockId(1), 0),
            handlers: (Location::new(BlockId(4), 0), Location::new(BlockId(5), 0)),
            detail: "try-sets partially overlap".into(),
        };
        assert_eq!(
            err.to_string(),
            "ambiguous exception regions r0 and r1 in `A.b`: try-sets partially overlap"
        );

        let diag = err.to_diagnostic();
        assert_eq!(diag.primary_location(), Some(Location::new(BlockId(1), 0)));
        let secondary: Vec<Location> = diag
            .labels
            .iter()
            .filter(|l| l.style == LabelStyle::Secondary)
            .map(|l| l.location)
            .collect();
        assert_eq!(
            secondary,
            vec![Location::new(BlockId(4), 0), Location::new(BlockId(5), 0)]
        );
    }
}
