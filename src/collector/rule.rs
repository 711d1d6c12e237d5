//! Extraction rules and the per-pass derived context they share.

use crate::metrics::Stage;
use crate::snapshot::{MissingField, Snapshot};

/// Values derived once per pass and shared by every rule of that pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassContext {
    elected: Option<f64>,
}

impl PassContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elected(elected: f64) -> Self {
        Self {
            elected: Some(elected),
        }
    }

    /// Leader flag reported by the source in this pass, if any.
    pub fn elected(&self) -> Option<f64> {
        self.elected
    }

    /// Leader flag as a label value; empty when the source did not report it.
    pub fn elected_label(&self) -> String {
        self.elected.map(|v| v.to_string()).unwrap_or_default()
    }
}

/// Derives the [`PassContext`] of a pass before any rule runs.
pub type ContextRule = fn(&Snapshot) -> PassContext;

/// Context rule for sources that share nothing between rules.
pub fn no_context(_: &Snapshot) -> PassContext {
    PassContext::default()
}

/// Maps a snapshot to staged values on one buffered metric.
///
/// A rule reads only the snapshot and context. If any key it needs is
/// missing it returns [`MissingField`] and whatever it staged is discarded.
pub trait ExtractionRule: Send + Sync {
    fn extract(
        &self,
        snapshot: &Snapshot,
        context: &PassContext,
        out: &mut Stage<'_>,
    ) -> Result<(), MissingField>;
}

impl<F> ExtractionRule for F
where
    F: Fn(&Snapshot, &PassContext, &mut Stage<'_>) -> Result<(), MissingField> + Send + Sync,
{
    fn extract(
        &self,
        snapshot: &Snapshot,
        context: &PassContext,
        out: &mut Stage<'_>,
    ) -> Result<(), MissingField> {
        self(snapshot, context, out)
    }
}

/// Stages every configured key that is present, labeled with the key itself.
///
/// Absent keys are skipped rather than failing the rule, since the list
/// comes from operator configuration and may name optional entries.
#[derive(Debug, Clone)]
pub struct VerbatimKeys {
    keys: Vec<String>,
}

impl VerbatimKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

impl ExtractionRule for VerbatimKeys {
    fn extract(
        &self,
        snapshot: &Snapshot,
        _context: &PassContext,
        out: &mut Stage<'_>,
    ) -> Result<(), MissingField> {
        for key in &self.keys {
            if let Some(value) = snapshot.lookup(key) {
                out.set(value, &[key.as_str()]);
            }
        }
        Ok(())
    }
}
