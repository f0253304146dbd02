//! Host adapter.
//!
//! The only component that knows both the host's error conventions and the
//! bridge contract. It makes the engine ready, pushes one operation through
//! the bridge, and converts any failure into a [`HostError`] carrying a
//! machine-distinguishable kind plus enough context (operation description,
//! underlying message) to diagnose without source access.
//!
//! Every mutating operation issued here is re-entrant: a failed attach,
//! create, or insert leaves no half-state behind, so the host can always
//! retry the same operation.

use std::fmt;

use tracing::debug;

use crate::EngineConfig;
use crate::bridge;
use crate::engine::ops::{CatalogOperation, OperationOutput};
use crate::error::{ErrorKind, LakeError};

/// Failure in the host's vocabulary: a kind the host can branch on and a
/// detail string for the user.
#[derive(Debug)]
pub struct HostError {
    pub kind: ErrorKind,
    pub operation: String,
    pub detail: String,
    pub retryable: bool,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "catalog operation failed ({:?}): {} (while trying to {})",
            self.kind, self.detail, self.operation
        )
    }
}

impl std::error::Error for HostError {}

pub struct HostAdapter {
    config: EngineConfig,
}

impl HostAdapter {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn wrap(&self, op: &CatalogOperation, err: LakeError) -> HostError {
        HostError {
            kind: err.kind(),
            operation: op.describe(),
            detail: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    /// Run one catalog operation end to end: ensure the engine and its
    /// extensions are ready, cross the bridge, decode the output.
    pub fn run_catalog_operation(
        &self,
        op: &CatalogOperation,
    ) -> Result<OperationOutput, HostError> {
        bridge::ensure_ready(&self.config).map_err(|e| self.wrap(op, e))?;
        for extension in &self.config.autoload_extensions {
            bridge::ensure_extension_loaded(extension).map_err(|e| self.wrap(op, e))?;
        }

        let envelope = serde_json::to_string(op).map_err(|e| self.wrap(op, LakeError::from(e)))?;
        debug!(operation = %op.describe(), "forwarding operation across bridge");
        let output = bridge::execute_envelope(&envelope).map_err(|e| self.wrap(op, e))?;
        serde_json::from_str(&output).map_err(|e| self.wrap(op, LakeError::from(e)))
    }

    /// Convenience for operations whose output is rows.
    pub fn run_for_rows(
        &self,
        op: &CatalogOperation,
    ) -> Result<Vec<crate::engine::ops::Row>, HostError> {
        Ok(self.run_catalog_operation(op)?.into_rows())
    }
}
