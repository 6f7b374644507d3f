// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Transform configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options controlling marker recognition, naming and batch execution.
///
/// Deserializes from JSON; absent keys take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Function names recognized as the suspend marker. A marker call
    /// takes exactly one future and evaluates to its value.
    pub suspend_markers: Vec<String>,
    /// Appended to the source method name to name the dispatcher.
    pub dispatcher_suffix: String,
    /// Transform methods of a batch on the rayon pool.
    pub parallel: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            suspend_markers: vec!["Await.await".to_string(), "suspend".to_string()],
            dispatcher_suffix: "$dispatch".to_string(),
            parallel: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid transform options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no suspend markers configured")]
    NoMarkers,

    #[error("dispatcher suffix must not be empty")]
    EmptySuffix,
}

impl TransformOptions {
    pub fn from_json(text: &str) -> Result<Self, OptionsError> {
        let options: TransformOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.suspend_markers.is_empty() {
            return Err(OptionsError::NoMarkers);
        }
        if self.dispatcher_suffix.is_empty() {
            return Err(OptionsError::EmptySuffix);
        }
        Ok(())
    }

    pub fn is_suspend_marker(&self, name: &str) -> bool {
        self.suspend_markers.iter().any(|m| m == name)
    }

    pub fn dispatcher_name(&self, method: &str) -> String {
        format!("{}{}", method, self.dispatcher_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_keys_take_defaults() {
        let options = TransformOptions::from_json(r#"{ "parallel": false }"#).expect("parses");
        assert!(!options.parallel);
        assert!(options.is_suspend_marker("Await.await"));
        assert_eq!(options.dispatcher_name("load"), "load$dispatch");
    }

    #[test]
    fn custom_markers_replace_defaults() {
        let options =
            TransformOptions::from_json(r#"{ "suspend_markers": ["Task.join"] }"#).expect("parses");
        assert!(options.is_suspend_marker("Task.join"));
        assert!(!options.is_suspend_marker("Await.await"));
    }

    #[test]
    fn empty_marker_list_is_rejected() {
        let err = TransformOptions::from_json(r#"{ "suspend_markers": [] }"#).unwrap_err();
        assert!(matches!(err, OptionsError::NoMarkers));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = TransformOptions::from_json("{ suspend_markers").unwrap_err();
        assert!(matches!(err, OptionsError::Parse(_)));
    }
}
