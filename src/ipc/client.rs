// IPC 客户端实现

use super::error::{IpcError, Result};
use super::protocol::{IPC_PATH, IpcCommand, IpcResponse, MAX_FRAME_LEN};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

// IPC 客户端：每个命令使用一条新连接
pub struct IpcClient {
    socket_path: PathBuf,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(IPC_PATH),
        }
    }
}

impl IpcClient {
    // 创建连接指定路径的客户端
    pub fn with_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::Other(format!("连接服务失败: {}", e)))
    }

    async fn write_command(stream: &mut UnixStream, command: &IpcCommand) -> Result<()> {
        let command_json = serde_json::to_string(command)?;
        let command_bytes = command_json.as_bytes();

        let len = command_bytes.len() as u32;
        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(command_bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_response(stream: &mut UnixStream) -> Result<IpcResponse> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let response_len = u32::from_le_bytes(len_buf) as usize;

        if response_len > MAX_FRAME_LEN {
            return Err(IpcError::Other("响应数据过大".to_string()));
        }

        let mut response_buf = vec![0u8; response_len];
        stream.read_exact(&mut response_buf).await?;
        Ok(serde_json::from_slice(&response_buf)?)
    }

    // 发送单个命令并等待响应
    pub async fn send_command(&self, command: IpcCommand) -> Result<IpcResponse> {
        let mut stream = self.connect().await?;
        Self::write_command(&mut stream, &command).await?;
        Self::read_response(&mut stream).await
    }

    // 订阅实时日志流，逐行交给回调；回调返回 false 时结束订阅
    pub async fn stream_logs<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(String) -> bool,
    {
        let mut stream = self.connect().await?;
        Self::write_command(&mut stream, &IpcCommand::StreamLogs).await?;

        // 服务端先回复一条确认
        match Self::read_response(&mut stream).await? {
            IpcResponse::Success { .. } => {}
            IpcResponse::Error { message, .. } => {
                return Err(IpcError::Other(format!("订阅日志流被拒绝: {}", message)));
            }
            other => {
                return Err(IpcError::Other(format!("意外的响应: {:?}", other)));
            }
        }

        loop {
            let response = match Self::read_response(&mut stream).await {
                Ok(response) => response,
                // 服务端关闭即视为流结束
                Err(IpcError::Io(_)) => break,
                Err(e) => return Err(e),
            };

            if let IpcResponse::LogStream { line } = response {
                if !callback(line) {
                    break;
                }
            }
        }

        Ok(())
    }
}
