//! Local caller authorization for administrative operations.

use service_core::error::AppError;

/// Identity of a local caller, taken from the OS credentials of its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub uid: u32,
    pub pid: Option<i32>,
}

impl Caller {
    pub fn from_uid(uid: u32) -> Self {
        Self { uid, pid: None }
    }

    pub fn root() -> Self {
        Self::from_uid(0)
    }
}

pub trait Authorizer: Send + Sync {
    fn authorize(&self, caller: &Caller, operation: &str) -> Result<(), AppError>;
}

/// Admits only uid 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootOnly;

impl Authorizer for RootOnly {
    fn authorize(&self, caller: &Caller, operation: &str) -> Result<(), AppError> {
        if caller.uid == 0 {
            Ok(())
        } else {
            tracing::warn!(uid = caller.uid, operation, "Rejected non-root caller");
            Err(AppError::Forbidden(anyhow::anyhow!(
                "{} is restricted to the provider administrator",
                operation
            )))
        }
    }
}
