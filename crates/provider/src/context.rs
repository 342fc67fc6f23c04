//! Per-operation context and scoped project handles.

use crate::diagnostics::{Diagnostics, ErrorKind};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use stratum_core::AccessGrant;
use stratum_storage::{Network, Project};
use tokio_util::sync::CancellationToken;

/// Everything one resource operation needs from the configured provider.
#[derive(Clone)]
pub struct OperationContext {
    network: Arc<dyn Network>,
    grant: AccessGrant,
    auth_service_address: String,
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new(
        network: Arc<dyn Network>,
        grant: AccessGrant,
        auth_service_address: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            network,
            grant,
            auth_service_address: auth_service_address.into(),
            cancel,
        }
    }

    /// The provider's access grant, used for bucket and object operations.
    pub fn grant(&self) -> &AccessGrant {
        &self.grant
    }

    /// Auth service used when an edge credentials resource names none.
    pub fn auth_service_address(&self) -> &str {
        &self.auth_service_address
    }

    /// Fail fast if the host already cancelled the operation.
    pub fn ensure_active(&self, step: &str) -> Result<(), Diagnostics> {
        if self.cancel.is_cancelled() {
            Err(Diagnostics::cancelled(step))
        } else {
            Ok(())
        }
    }

    /// Run one step, racing it against cancellation.
    ///
    /// A failure becomes an error diagnostic with `summary` and the upstream
    /// error text as detail.
    pub async fn run<T, E, F>(&self, kind: ErrorKind, summary: &str, step: F) -> Result<T, Diagnostics>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Diagnostics::cancelled(summary)),
            result = step => result.map_err(|e| Diagnostics::error(kind, summary, e)),
        }
    }

    /// Open a project for the provider grant.
    pub async fn open_project(&self) -> Result<ProjectGuard, Diagnostics> {
        let project = self
            .run(
                ErrorKind::Storage,
                "Failed to open project",
                self.network.open_project(&self.grant),
            )
            .await?;
        Ok(ProjectGuard {
            project: Arc::from(project),
            closed: false,
        })
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("network", &self.network.backend_name())
            .field("auth_service_address", &self.auth_service_address)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A project that is closed on every exit path.
///
/// Call [`ProjectGuard::finish`] to close it and fold a close failure into the
/// operation's result. If the guard is dropped instead (a panic, or the
/// operation future being dropped), the close is spawned onto the runtime.
pub struct ProjectGuard {
    project: Arc<dyn Project>,
    closed: bool,
}

impl ProjectGuard {
    /// Close the project and return `result`.
    ///
    /// A close failure is appended as a warning to a failed result and logged
    /// for a successful one.
    pub async fn finish<T>(mut self, result: Result<T, Diagnostics>) -> Result<T, Diagnostics> {
        self.closed = true;
        match (self.project.close().await, result) {
            (Ok(()), result) => result,
            (Err(e), Ok(value)) => {
                tracing::warn!(error = %e, "failed to close project");
                Ok(value)
            }
            (Err(e), Err(mut diags)) => {
                diags.push_warning(ErrorKind::Storage, "Failed to close project", e);
                Err(diags)
            }
        }
    }
}

impl Deref for ProjectGuard {
    type Target = dyn Project;

    fn deref(&self) -> &Self::Target {
        self.project.as_ref()
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let project = self.project.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = project.close().await {
                        tracing::warn!(error = %e, "failed to close dropped project");
                    }
                });
            }
            Err(_) => tracing::warn!("project dropped outside a runtime; not closed"),
        }
    }
}
