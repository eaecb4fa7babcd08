//! Input validation for tool and resource arguments.
//!
//! Validation collects every offending field instead of stopping at the first
//! one, so callers get a complete list of issues in a single response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation trait for request types.
pub trait Validate {
    /// Validate the request, returning every issue found.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Which rule a field violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Value outside an allowed numeric range.
    Range,
    /// Value is not an integer where one is required.
    Integer,
    /// Value not in an allowed set.
    Enum,
    /// Mutually exclusive fields were both set or both missing.
    Exclusive,
    /// Value has the wrong shape or type.
    Type,
    /// A required field is missing.
    Required,
}

/// A single offending field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the field, e.g. `origin.lat`.
    pub path: String,
    pub message: String,
    pub rule: Rule,
}

/// Structured input-validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            message: message.into(),
            issues,
        }
    }

    /// A failure for a single field.
    pub fn field(path: impl Into<String>, message: impl Into<String>, rule: Rule) -> Self {
        let mut issues = Issues::default();
        issues.push(path, message, rule);
        Self::new("Invalid input data", issues.0)
    }

    /// Wrap a deserialization failure of the raw arguments.
    pub fn from_serde(err: &serde_json::Error) -> Self {
        let rule = if err.to_string().starts_with("missing field") {
            Rule::Required
        } else {
            Rule::Type
        };
        Self::field("arguments", err.to_string(), rule)
    }
}

/// Accumulator used by [`Validate`] implementations.
#[derive(Debug, Default)]
pub struct Issues(Vec<ValidationIssue>);

impl Issues {
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>, rule: Rule) {
        self.0.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
            rule,
        });
    }

    /// Record a range issue unless `min <= value <= max`.
    pub fn check_range(&mut self, path: &str, value: f64, min: f64, max: f64, message: &str) {
        if !value.is_finite() || value < min || value > max {
            self.push(path, message, Rule::Range);
        }
    }

    /// Check a latitude/longitude pair under `prefix`.
    pub fn check_coordinate(&mut self, prefix: &str, lat: f64, lon: f64) {
        self.check_range(
            &format!("{prefix}.lat"),
            lat,
            -90.0,
            90.0,
            "Latitude must be between -90 and 90",
        );
        self.check_range(
            &format!("{prefix}.lon"),
            lon,
            -180.0,
            180.0,
            "Longitude must be between -180 and 180",
        );
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finish validation: `Ok` when nothing was recorded.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new("Invalid input data", self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_issues_is_ok() {
        let mut issues = Issues::default();
        issues.check_coordinate("origin", 45.0, 7.0);
        assert!(issues.finish().is_ok());
    }

    #[test]
    fn test_out_of_range_latitude_reports_path() {
        let mut issues = Issues::default();
        issues.check_coordinate("origin", 200.0, 7.0);
        let err = issues.finish().unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "origin.lat");
        assert_eq!(err.issues[0].rule, Rule::Range);
    }

    #[test]
    fn test_collects_every_issue() {
        let mut issues = Issues::default();
        issues.check_coordinate("origin", 200.0, -500.0);
        issues.check_coordinate("destination", f64::NAN, 0.0);
        assert_eq!(issues.finish().unwrap_err().issues.len(), 3);
    }

    #[test]
    fn test_from_serde_missing_field() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Input {
            origin: f64,
        }
        let err = serde_json::from_str::<Input>("{}").unwrap_err();
        let validation = ValidationError::from_serde(&err);
        assert_eq!(validation.issues[0].rule, Rule::Required);
        assert!(validation.issues[0].message.contains("origin"));
    }

    #[test]
    fn test_issue_serialization() {
        let err = ValidationError::field("z", "Zoom level must be between 0 and 18", Rule::Range);
        let json = serde_json::to_value(&err.issues).unwrap();
        assert_eq!(json[0]["path"], "z");
        assert_eq!(json[0]["rule"], "range");
    }
}
