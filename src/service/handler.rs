// IPC 命令处理器

use crate::ipc::{IpcCommand, IpcResponse};
use crate::proxy::ProxyConfigService;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

// 创建命令处理器（异步）
pub fn create_handler(
    proxy: Arc<ProxyConfigService>,
    last_heartbeat: Arc<RwLock<Instant>>,
) -> impl Fn(IpcCommand) -> std::pin::Pin<Box<dyn std::future::Future<Output = IpcResponse> + Send>>
+ Send
+ Sync {
    move |command: IpcCommand| {
        let proxy = proxy.clone();
        let last_heartbeat = last_heartbeat.clone();

        Box::pin(async move {
            match command {
                IpcCommand::GetVersion => {
                    let version = proxy.version();
                    log::debug!("收到获取版本命令, 版本: {}", version);
                    IpcResponse::Version { version }
                }

                IpcCommand::EnableProxy {
                    http_port,
                    socks_port,
                } => {
                    log::info!(
                        "收到启用系统代理命令: HTTP/HTTPS={}, SOCKS={}",
                        http_port,
                        socks_port
                    );
                    let report = proxy.enable_proxy(http_port, socks_port).await;
                    match report.summarize("启用系统代理") {
                        Ok(message) => {
                            log::info!("{}", message);
                            IpcResponse::Success {
                                message: Some(message),
                            }
                        }
                        Err(message) => {
                            log::error!("{}", message);
                            IpcResponse::Error {
                                code: 2001,
                                message,
                            }
                        }
                    }
                }

                IpcCommand::DisableProxy => {
                    log::info!("收到关闭系统代理命令");
                    let report = proxy.disable_proxy().await;
                    match report.summarize("关闭系统代理") {
                        Ok(message) => {
                            log::info!("{}", message);
                            IpcResponse::Success {
                                message: Some(message),
                            }
                        }
                        Err(message) => {
                            log::error!("{}", message);
                            IpcResponse::Error {
                                code: 2002,
                                message,
                            }
                        }
                    }
                }

                IpcCommand::RestoreProxy {
                    http_port,
                    socks_port,
                    snapshot,
                } => {
                    log::info!("收到恢复系统代理命令, 快照包含 {} 个服务", snapshot.len());
                    if snapshot.is_empty() {
                        // 空快照没有可恢复的内容，调用方应当改用关闭命令
                        return IpcResponse::Success {
                            message: Some("快照为空，无需恢复".to_string()),
                        };
                    }
                    let report = proxy.restore_proxy(http_port, socks_port, &snapshot).await;
                    match report.summarize("恢复系统代理") {
                        Ok(message) => {
                            log::info!("{}", message);
                            IpcResponse::Success {
                                message: Some(message),
                            }
                        }
                        Err(message) => {
                            log::error!("{}", message);
                            IpcResponse::Error {
                                code: 2003,
                                message,
                            }
                        }
                    }
                }

                IpcCommand::GetProxySettings => {
                    log::debug!("收到读取代理配置命令");
                    match proxy.current_settings() {
                        Ok(snapshot) => IpcResponse::ProxySettings { snapshot },
                        Err(e) => {
                            log::error!("读取代理配置失败: {}", e);
                            IpcResponse::Error {
                                code: 2004,
                                message: format!("读取代理配置失败: {}", e),
                            }
                        }
                    }
                }

                IpcCommand::GetLogs { lines } => {
                    log::trace!("收到获取日志命令 (请求 {} 行)", lines);
                    let log_lines = crate::logger::get_recent_logs(lines);
                    IpcResponse::Logs { lines: log_lines }
                }

                IpcCommand::StreamLogs => {
                    // 流式推送在服务端连接层处理，这里只需确认
                    log::debug!("收到日志流订阅命令");
                    IpcResponse::Success {
                        message: Some("日志流已启用".to_string()),
                    }
                }

                IpcCommand::Heartbeat => {
                    log::debug!("收到主程序心跳");
                    *last_heartbeat.write().await = Instant::now();
                    IpcResponse::HeartbeatAck
                }
            }
        })
    }
}
