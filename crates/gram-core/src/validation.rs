//! Attachment validation
//!
//! Checks are accumulated so a single failed request reports every offense
//! at once. A [`ValidationError`] is classified as `Unsupported` only when
//! every violation is an out-of-set value; otherwise it is `Invalid`.

use std::fmt;

use uuid::Uuid;

use crate::error::ErrorKind;

pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_SLUG_LENGTH: usize = 128;

/// Function runtimes accepted for functions attachments.
pub const SUPPORTED_RUNTIMES: &[&str] = &["nodejs:22", "python:3.12"];

pub fn is_supported_runtime(runtime: &str) -> bool {
    SUPPORTED_RUNTIMES.contains(&runtime)
}

/// Lowercase letters and digits separated by single hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > MAX_SLUG_LENGTH {
        return false;
    }
    slug.split('-').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Invalid,
    Unsupported,
}

/// One offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn kind(&self) -> ErrorKind {
        let all_unsupported = !self.violations.is_empty()
            && self
                .violations
                .iter()
                .all(|v| v.kind == ViolationKind::Unsupported);
        if all_unsupported {
            ErrorKind::Unsupported
        } else {
            ErrorKind::Invalid
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request ({} problem", self.violations.len())?;
        if self.violations.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str("):")?;
        for violation in &self.violations {
            write!(f, "\n{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collects violations across any number of fields.
#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalid(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            field: field.into(),
            message: message.into(),
            kind: ViolationKind::Invalid,
        });
    }

    pub fn unsupported(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            field: field.into(),
            message: message.into(),
            kind: ViolationKind::Unsupported,
        });
    }

    /// Parse a non-nil identifier, recording a violation on failure.
    pub fn asset_id(&mut self, field: &str, raw: &str) -> Option<Uuid> {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) if id.is_nil() => {
                self.invalid(field, "asset id must not be nil");
                None
            }
            Ok(id) => Some(id),
            Err(_) => {
                self.invalid(field, format!("{raw:?} is not a valid asset id"));
                None
            }
        }
    }

    pub fn name(&mut self, field: &str, name: &str) {
        if name.trim().is_empty() {
            self.invalid(field, "name is required");
        } else if name.chars().count() > MAX_NAME_LENGTH {
            self.invalid(
                field,
                format!("name must be at most {MAX_NAME_LENGTH} characters"),
            );
        }
    }

    pub fn slug(&mut self, field: &str, slug: &str) {
        if slug.len() > MAX_SLUG_LENGTH {
            self.invalid(
                field,
                format!("slug must be at most {MAX_SLUG_LENGTH} characters"),
            );
        } else if !is_valid_slug(slug) {
            self.invalid(
                field,
                format!(
                    "{slug:?} is not a valid slug (lowercase letters, digits and single hyphens, no leading or trailing hyphen)"
                ),
            );
        }
    }

    pub fn runtime(&mut self, field: &str, runtime: &str) {
        if runtime.trim().is_empty() {
            self.invalid(field, "runtime is required");
        } else if !is_supported_runtime(runtime) {
            self.unsupported(
                field,
                format!(
                    "unsupported runtime {runtime:?} (expected one of: {})",
                    SUPPORTED_RUNTIMES.join(", ")
                ),
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }
}
