// 进程间通信模块

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

// 导出公共接口
pub use client::IpcClient;
pub use error::{IpcError, Result};
pub use protocol::{IpcCommand, IpcResponse};
pub use server::IpcServer;
