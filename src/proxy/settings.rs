// 代理配置数据模型

use serde::{Deserialize, Serialize};

// 代理协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks,
}

impl ProxyProtocol {
    // 固定的遍历顺序，应用与恢复都按此顺序逐项处理
    pub const ALL: [ProxyProtocol; 3] = [
        ProxyProtocol::Http,
        ProxyProtocol::Https,
        ProxyProtocol::Socks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks => "socks",
        }
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// 单个协议在单个网络服务上的代理端点
//
// enabled 为 false 时 host/port 依然原样保留，
// 恢复快照时需要把“曾经是关闭状态”也一并还原
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    // 已启用的端点
    pub fn enabled(host: impl Into<String>, port: u16) -> Self {
        Self {
            enabled: true,
            host: host.into(),
            port,
        }
    }

    // 关闭状态的空端点
    pub fn disabled() -> Self {
        Self::default()
    }

    // 校验端点是否可以写入系统配置
    pub fn validate(&self) -> Result<(), crate::proxy::ProxyError> {
        if self.enabled {
            if self.host.is_empty() {
                return Err(crate::proxy::ProxyError::InvalidEndpoint {
                    reason: "启用状态下 host 不能为空".to_string(),
                });
            }
            if self.port == 0 {
                return Err(crate::proxy::ProxyError::InvalidEndpoint {
                    reason: format!("端口 {} 超出有效范围 1-65535", self.port),
                });
            }
        }
        Ok(())
    }
}

// 一个网络服务的全部代理配置（HTTP/HTTPS/SOCKS 各自独立）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProxyConfig {
    pub http: ProxyEndpoint,
    pub https: ProxyEndpoint,
    pub socks: ProxyEndpoint,
}

impl ServiceProxyConfig {
    pub fn endpoint(&self, protocol: ProxyProtocol) -> &ProxyEndpoint {
        match protocol {
            ProxyProtocol::Http => &self.http,
            ProxyProtocol::Https => &self.https,
            ProxyProtocol::Socks => &self.socks,
        }
    }

    pub fn endpoint_mut(&mut self, protocol: ProxyProtocol) -> &mut ProxyEndpoint {
        match protocol {
            ProxyProtocol::Http => &mut self.http,
            ProxyProtocol::Https => &mut self.https,
            ProxyProtocol::Socks => &mut self.socks,
        }
    }
}

// 快照条目：一个网络服务与它被捕获时的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service: String,
    pub config: ServiceProxyConfig,
}

// 全量快照：按系统自身的枚举顺序保存全部网络服务的代理配置
//
// 快照由调用方持有，服务端不保留任何副本；顺序不允许重新排序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySnapshot {
    pub services: Vec<ServiceSnapshot>,
}

impl ProxySnapshot {
    pub fn push(&mut self, service: impl Into<String>, config: ServiceProxyConfig) {
        self.services.push(ServiceSnapshot {
            service: service.into(),
            config,
        });
    }

    pub fn get(&self, service: &str) -> Option<&ServiceProxyConfig> {
        self.services
            .iter()
            .find(|entry| entry.service == service)
            .map(|entry| &entry.config)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
