// ABOUTME: Diagnostics accumulator for non-fatal warnings during a deployment run.
// ABOUTME: Collects problems that shouldn't fail a deployment but should reach the caller.

use serde::Serialize;

/// Collects non-fatal warnings during a deployment run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn log_persistence(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LogPersistence,
            message: message.into(),
        }
    }

    pub fn readiness_unconfirmed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ReadinessUnconfirmed,
            message: message.into(),
        }
    }

    pub fn status_commit(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StatusCommit,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Log lines reached the live buffer but not the store.
    LogPersistence,
    /// The readiness probe gave up; configuration went ahead anyway.
    ReadinessUnconfirmed,
    /// The terminal FAILED status could not be stored.
    StatusCommit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::log_persistence("2 log lines were not persisted"));
        diag.warn(Warning::readiness_unconfirmed("gave up after 30 attempts"));

        assert!(diag.has_warnings());
        let warnings = diag.into_warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].kind, WarningKind::LogPersistence);
        assert_eq!(warnings[1].kind, WarningKind::ReadinessUnconfirmed);
    }

    #[test]
    fn warning_kind_serializes_snake_case() {
        let json = serde_json::to_value(Warning::status_commit("store down")).unwrap();
        assert_eq!(json["kind"], "status_commit");
    }
}
