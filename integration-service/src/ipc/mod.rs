//! Local administrative channel.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{IpcError, IpcRequest, IpcResponse};
pub use server::{dispatch, IpcServer};
