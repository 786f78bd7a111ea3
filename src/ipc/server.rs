// IPC 服务端实现

use super::error::{IpcError, Result};
use super::protocol::{IPC_PATH, IpcCommand, IpcResponse, MAX_FRAME_LEN};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

// 命令处理器类型（异步）
pub type CommandHandler =
    Arc<dyn Fn(IpcCommand) -> Pin<Box<dyn Future<Output = IpcResponse> + Send>> + Send + Sync>;

// IPC 服务端
pub struct IpcServer {
    handler: CommandHandler,
    socket_path: PathBuf,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl IpcServer {
    // 创建新的 IPC 服务端，监听默认路径
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(IpcCommand) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResponse> + Send + 'static,
    {
        Self::with_path(handler, IPC_PATH)
    }

    // 创建监听指定路径的 IPC 服务端
    pub fn with_path<F, Fut>(handler: F, socket_path: impl Into<PathBuf>) -> Self
    where
        F: Fn(IpcCommand) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResponse> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |cmd| {
                Box::pin(handler(cmd)) as Pin<Box<dyn Future<Output = IpcResponse> + Send>>
            }),
            socket_path: socket_path.into(),
            shutdown_tx: None,
        }
    }

    // 请求服务端停止接受新连接
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(()).await;
        }
    }

    // 启动服务端（阻塞直到关闭）
    pub async fn run(&mut self) -> Result<()> {
        // 删除旧的 IPC 文件
        let _ = std::fs::remove_file(&self.socket_path);

        // 创建关闭通道
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        log::info!("IPC 服务端启动，监听: {}", self.socket_path.display());

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| IpcError::Other(format!("创建 Unix Socket 失败: {}", e)))?;

        // Socket 文件权限 0660：所有者与属组可读写，属组由安装器指向主程序
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))
                .map_err(|e| IpcError::Other(format!("设置 Unix Socket 权限失败: {}", e)))?;
        }

        loop {
            tokio::select! {
                // 接受新连接
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_client(stream, handler).await {
                                    log::error!("处理客户端连接失败: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            log::error!("接受连接失败: {}", e);
                        }
                    }
                }

                // 接收关闭信号
                _ = shutdown_rx.recv() => {
                    log::info!("收到关闭信号，停止 IPC 服务端");
                    break;
                }
            }
        }

        // 清理
        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }

    // 处理客户端连接：一次连接承载一对请求/响应
    async fn handle_client(mut stream: UnixStream, handler: CommandHandler) -> Result<()> {
        let command = Self::read_command(&mut stream).await?;
        log::trace!("收到命令: {:?}", command);

        // StreamLogs 不走请求/响应，转入持续推送
        if matches!(command, IpcCommand::StreamLogs) {
            log::info!("启动日志流订阅");
            return Self::handle_log_stream(stream).await;
        }

        let response = handler(command).await;

        // 避免日志递归：GetLogs 的响应不打印完整内容
        match &response {
            IpcResponse::Logs { lines } => {
                log::trace!("返回响应: Logs (共 {} 行)", lines.len());
            }
            _ => {
                log::trace!("返回响应: {:?}", response);
            }
        }

        Self::write_response(&mut stream, &response).await?;
        Ok(())
    }

    async fn read_command(stream: &mut UnixStream) -> Result<IpcCommand> {
        // 读取命令长度
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let command_len = u32::from_le_bytes(len_buf) as usize;

        // 防止恶意请求
        if command_len > MAX_FRAME_LEN {
            return Err(IpcError::Other("命令数据过大".to_string()));
        }

        // 读取命令数据并反序列化
        let mut command_buf = vec![0u8; command_len];
        stream.read_exact(&mut command_buf).await?;
        Ok(serde_json::from_slice(&command_buf)?)
    }

    async fn write_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
        let response_json = serde_json::to_string(response)?;
        let response_bytes = response_json.as_bytes();

        // 发送响应长度 + 响应数据
        let len = response_bytes.len() as u32;
        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(response_bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    // 处理日志流订阅（持续推送）
    async fn handle_log_stream(mut stream: UnixStream) -> Result<()> {
        use crate::logger;

        // 订阅日志流
        let mut log_receiver = logger::subscribe_logs();

        // 发送初始成功响应
        let initial_response = IpcResponse::Success {
            message: Some("日志流已启用".to_string()),
        };
        Self::write_response(&mut stream, &initial_response).await?;

        log::debug!("日志流订阅已激活，开始推送日志");

        // 持续推送日志
        loop {
            match log_receiver.recv().await {
                Ok(log_line) => {
                    let log_response = IpcResponse::LogStream { line: log_line };
                    if let Err(e) = Self::write_response(&mut stream, &log_response).await {
                        log::debug!("日志流客户端断开连接: {}", e);
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("日志流客户端处理过慢，跳过了 {} 条日志", skipped);
                    // 继续处理，不中断连接
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    log::info!("日志广播通道已关闭，停止日志流");
                    break;
                }
            }
        }

        log::info!("日志流订阅结束");
        Ok(())
    }
}
