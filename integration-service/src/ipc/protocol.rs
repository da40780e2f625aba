//! Wire format of the administrative channel.
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! -> {"method":"maintenance.retrieve","params":{"id":"4"}}
//! <- {"ok":{"id":"4","specification":{...}}}
//! <- {"error":{"status":404,"message":"..."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;

pub const MAINTENANCE_CREATE: &str = "maintenance.create";
pub const MAINTENANCE_UPDATE: &str = "maintenance.update";
pub const MAINTENANCE_BROWSE: &str = "maintenance.browse";
pub const MAINTENANCE_RETRIEVE: &str = "maintenance.retrieve";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcError {
    pub status: u16,
    pub message: String,
}

impl From<&AppError> for IpcError {
    fn from(err: &AppError) -> Self {
        Self {
            status: err.status_code().as_u16(),
            message: err.to_string(),
        }
    }
}

impl From<IpcError> for AppError {
    fn from(err: IpcError) -> Self {
        AppError::from_status(err.status, err.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpcResponse {
    Ok(Value),
    Error(IpcError),
}

impl IpcResponse {
    pub fn from_result(result: Result<Value, AppError>) -> Self {
        match result {
            Ok(value) => IpcResponse::Ok(value),
            Err(err) => IpcResponse::Error(IpcError::from(&err)),
        }
    }

    pub fn into_result(self) -> Result<Value, AppError> {
        match self {
            IpcResponse::Ok(value) => Ok(value),
            IpcResponse::Error(err) => Err(err.into()),
        }
    }
}
