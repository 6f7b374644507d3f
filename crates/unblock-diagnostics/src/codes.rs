//! Error code registry.
//!
//! Maps transform error codes (T0001, ...) to titles and categories.

use std::collections::HashMap;

/// Registry of all known error codes.
pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

/// Information about a single error code.
pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub category: ErrorCategory,
}

/// Error category for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Suspension,
    Synchronization,
    Reachability,
    ExceptionTable,
    Verification,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Suspension => write!(f, "Suspension"),
            ErrorCategory::Synchronization => write!(f, "Synchronization"),
            ErrorCategory::Reachability => write!(f, "Reachability"),
            ErrorCategory::ExceptionTable => write!(f, "ExceptionTable"),
            ErrorCategory::Verification => write!(f, "Verification"),
        }
    }
}

macro_rules! register_codes {
    ($($code:literal => ($title:literal, $cat:expr)),* $(,)?) => {{
        let mut map = HashMap::new();
        $(
            map.insert($code, ErrorCodeInfo {
                code: $code,
                title: $title,
                category: $cat,
            });
        )*
        map
    }};
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        use ErrorCategory::*;

        Self {
            codes: register_codes! {
                "T0001" => ("unsupported suspension position", Suspension),
                "T0002" => ("unbalanced synchronized region", Synchronization),
                "T0003" => ("unreachable suspension state", Reachability),
                "T0004" => ("ambiguous exception region", ExceptionTable),
                "T0005" => ("malformed method body", Verification),
            },
        }
    }
}

impl ErrorCodeRegistry {
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    pub fn all(&self) -> impl Iterator<Item = &ErrorCodeInfo> {
        self.codes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_is_registered_once() {
        let registry = ErrorCodeRegistry::default();
        assert_eq!(registry.all().count(), 5);
        let info = registry.get("T0002").expect("T0002 registered");
        assert_eq!(info.category, ErrorCategory::Synchronization);
        assert!(registry.get("E0308").is_none());
    }
}
