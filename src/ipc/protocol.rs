// IPC 协议定义：命令、响应与传输常量

use crate::proxy::ProxySnapshot;
use serde::{Deserialize, Serialize};

// Unix Socket 路径；属组由安装器调整，供主程序连接
pub const IPC_PATH: &str = "/var/run/proxyconf-helper.sock";

// 单帧最大长度，防止恶意请求
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

// 主程序 → 服务 的命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpcCommand {
    // 查询服务版本，主程序用于在变更操作之前检测过期的助手
    GetVersion,
    // 启用系统代理：HTTP/HTTPS 指向 http_port，SOCKS 指向 socks_port
    EnableProxy { http_port: u16, socks_port: u16 },
    // 关闭全部系统代理
    DisableProxy,
    // 按快照恢复系统代理；http_port/socks_port 是本助手当前写入的端口
    RestoreProxy {
        http_port: u16,
        socks_port: u16,
        snapshot: ProxySnapshot,
    },
    // 读取当前全部代理配置，主程序用它构造之后恢复用的快照
    GetProxySettings,
    // 获取最近的服务日志
    GetLogs { lines: usize },
    // 订阅实时日志流
    StreamLogs,
    // 主程序心跳
    Heartbeat,
}

// 服务 → 主程序 的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpcResponse {
    Success { message: Option<String> },
    Error { code: u32, message: String },
    Version { version: String },
    ProxySettings { snapshot: ProxySnapshot },
    Logs { lines: Vec<String> },
    LogStream { line: String },
    HeartbeatAck,
}
