// 代理配置错误定义

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    // 针对单次写入的权限校验失败
    #[error("权限不足，无法修改网络服务 {service} 的 {protocol} 代理")]
    PermissionDenied { service: String, protocol: String },

    // 网络服务在枚举之后消失
    #[error("网络服务不存在: {0}")]
    ServiceNotFound(String),

    // 启用状态下端口越界或 host 非法
    #[error("代理端点非法: {reason}")]
    InvalidEndpoint { reason: String },

    // 系统配置工具本身调用失败
    #[error("执行 {tool} 失败: {message}")]
    CommandFailed { tool: String, message: String },

    // 无法枚举网络服务列表
    #[error("无法获取网络服务列表: {0}")]
    Unavailable(String),
}
