// 系统代理配置存取层

use crate::proxy::error::ProxyError;
use crate::proxy::settings::{ProxyEndpoint, ProxyProtocol, ServiceProxyConfig};
use std::collections::HashSet;
use std::sync::Mutex;

// 代理配置存取接口：整个进程里唯一允许接触系统网络配置的入口
//
// 多服务操作的调用方在操作开始时枚举一次服务列表，
// 之后逐个服务独立处理，单个服务失败不影响其余服务
pub trait SettingStore: Send + Sync {
    // 按系统自身的顺序枚举当前注册的网络服务，每次调用重新枚举，不做缓存
    fn list_network_services(&self) -> Result<Vec<String>, ProxyError>;

    // 读取一个网络服务的全部代理配置
    fn read_proxy_config(&self, service: &str) -> Result<ServiceProxyConfig, ProxyError>;

    // 写入一个网络服务单个协议的代理配置
    fn write_proxy_config(
        &self,
        service: &str,
        protocol: ProxyProtocol,
        endpoint: &ProxyEndpoint,
    ) -> Result<(), ProxyError>;

    // 关闭一个网络服务单个协议的代理，等价于写入 enabled=false 的端点
    fn clear_proxy_config(&self, service: &str, protocol: ProxyProtocol) -> Result<(), ProxyError>;
}

// 内存实现：配置保存在进程内，用于测试与无特权环境下的演练
//
// 通过 deny_writes / set_ghost 可以注入权限失败与
// “服务在枚举后消失”两类故障
pub struct MemoryStore {
    // 按枚举顺序保存 (服务名, 配置)
    services: Mutex<Vec<(String, ServiceProxyConfig)>>,
    // 写入时返回权限错误的服务
    denied: Mutex<HashSet<String>>,
    // 仍出现在枚举结果里，但读写都报告不存在的服务
    ghosts: Mutex<HashSet<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            services: Mutex::new(Vec::new()),
            denied: Mutex::new(HashSet::new()),
            ghosts: Mutex::new(HashSet::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // 用给定的服务名初始化，全部协议处于关闭状态
    pub fn with_services(names: &[&str]) -> Self {
        let store = Self::new();
        for name in names {
            store.add_service(name, ServiceProxyConfig::default());
        }
        store
    }

    pub fn add_service(&self, name: &str, config: ServiceProxyConfig) {
        let mut services = self.services.lock().unwrap_or_else(|e| {
            log::warn!("Services 锁中毒，正在恢复");
            e.into_inner()
        });
        services.push((name.to_string(), config));
    }

    pub fn remove_service(&self, name: &str) {
        let mut services = self.services.lock().unwrap_or_else(|e| {
            log::warn!("Services 锁中毒，正在恢复");
            e.into_inner()
        });
        services.retain(|(existing, _)| existing != name);
    }

    // 之后对该服务的写入都返回权限错误
    pub fn deny_writes(&self, name: &str) {
        let mut denied = self.denied.lock().unwrap_or_else(|e| {
            log::warn!("Denied 锁中毒，正在恢复");
            e.into_inner()
        });
        denied.insert(name.to_string());
    }

    // 模拟服务在枚举之后消失：枚举仍然返回它，读写报告不存在
    pub fn set_ghost(&self, name: &str) {
        let mut ghosts = self.ghosts.lock().unwrap_or_else(|e| {
            log::warn!("Ghosts 锁中毒，正在恢复");
            e.into_inner()
        });
        ghosts.insert(name.to_string());
    }

    fn is_ghost(&self, name: &str) -> bool {
        self.ghosts
            .lock()
            .unwrap_or_else(|e| {
                log::warn!("Ghosts 锁中毒，正在恢复");
                e.into_inner()
            })
            .contains(name)
    }

    fn is_denied(&self, name: &str) -> bool {
        self.denied
            .lock()
            .unwrap_or_else(|e| {
                log::warn!("Denied 锁中毒，正在恢复");
                e.into_inner()
            })
            .contains(name)
    }
}

impl SettingStore for MemoryStore {
    fn list_network_services(&self) -> Result<Vec<String>, ProxyError> {
        let services = self.services.lock().unwrap_or_else(|e| {
            log::warn!("Services 锁中毒，正在恢复");
            e.into_inner()
        });
        Ok(services.iter().map(|(name, _)| name.clone()).collect())
    }

    fn read_proxy_config(&self, service: &str) -> Result<ServiceProxyConfig, ProxyError> {
        if self.is_ghost(service) {
            return Err(ProxyError::ServiceNotFound(service.to_string()));
        }
        let services = self.services.lock().unwrap_or_else(|e| {
            log::warn!("Services 锁中毒，正在恢复");
            e.into_inner()
        });
        services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, config)| config.clone())
            .ok_or_else(|| ProxyError::ServiceNotFound(service.to_string()))
    }

    fn write_proxy_config(
        &self,
        service: &str,
        protocol: ProxyProtocol,
        endpoint: &ProxyEndpoint,
    ) -> Result<(), ProxyError> {
        endpoint.validate()?;
        if self.is_ghost(service) {
            return Err(ProxyError::ServiceNotFound(service.to_string()));
        }
        if self.is_denied(service) {
            return Err(ProxyError::PermissionDenied {
                service: service.to_string(),
                protocol: protocol.as_str().to_string(),
            });
        }
        let mut services = self.services.lock().unwrap_or_else(|e| {
            log::warn!("Services 锁中毒，正在恢复");
            e.into_inner()
        });
        let config = services
            .iter_mut()
            .find(|(name, _)| name == service)
            .map(|(_, config)| config)
            .ok_or_else(|| ProxyError::ServiceNotFound(service.to_string()))?;
        *config.endpoint_mut(protocol) = endpoint.clone();
        Ok(())
    }

    fn clear_proxy_config(&self, service: &str, protocol: ProxyProtocol) -> Result<(), ProxyError> {
        if self.is_ghost(service) {
            return Err(ProxyError::ServiceNotFound(service.to_string()));
        }
        if self.is_denied(service) {
            return Err(ProxyError::PermissionDenied {
                service: service.to_string(),
                protocol: protocol.as_str().to_string(),
            });
        }
        let mut services = self.services.lock().unwrap_or_else(|e| {
            log::warn!("Services 锁中毒，正在恢复");
            e.into_inner()
        });
        let config = services
            .iter_mut()
            .find(|(name, _)| name == service)
            .map(|(_, config)| config)
            .ok_or_else(|| ProxyError::ServiceNotFound(service.to_string()))?;
        // 与系统行为一致：只翻转开关，host/port 原样保留
        config.endpoint_mut(protocol).enabled = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_preserves_registration_order() {
        let store = MemoryStore::with_services(&["Wi-Fi", "Thunderbolt Bridge", "Ethernet"]);
        assert_eq!(
            store.list_network_services().unwrap(),
            ["Wi-Fi", "Thunderbolt Bridge", "Ethernet"]
        );
    }

    #[test]
    fn read_unknown_service_fails() {
        let store = MemoryStore::with_services(&["Wi-Fi"]);
        assert!(matches!(
            store.read_proxy_config("Ethernet"),
            Err(ProxyError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = MemoryStore::with_services(&["Wi-Fi"]);
        let endpoint = ProxyEndpoint::enabled("127.0.0.1", 7890);
        store
            .write_proxy_config("Wi-Fi", ProxyProtocol::Http, &endpoint)
            .unwrap();

        let config = store.read_proxy_config("Wi-Fi").unwrap();
        assert_eq!(config.http, endpoint);
        assert_eq!(config.https, ProxyEndpoint::disabled());
    }

    #[test]
    fn write_rejects_invalid_endpoint() {
        let store = MemoryStore::with_services(&["Wi-Fi"]);
        let invalid = ProxyEndpoint {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        assert!(matches!(
            store.write_proxy_config("Wi-Fi", ProxyProtocol::Http, &invalid),
            Err(ProxyError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn denied_service_reports_permission_error() {
        let store = MemoryStore::with_services(&["Wi-Fi"]);
        store.deny_writes("Wi-Fi");
        let endpoint = ProxyEndpoint::enabled("127.0.0.1", 7890);
        assert!(matches!(
            store.write_proxy_config("Wi-Fi", ProxyProtocol::Http, &endpoint),
            Err(ProxyError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn ghost_service_listed_but_unreachable() {
        let store = MemoryStore::with_services(&["Wi-Fi", "Ethernet"]);
        store.set_ghost("Ethernet");

        // 枚举结果仍然包含它
        assert!(
            store
                .list_network_services()
                .unwrap()
                .contains(&"Ethernet".to_string())
        );
        // 实际访问时已经不存在
        assert!(matches!(
            store.read_proxy_config("Ethernet"),
            Err(ProxyError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn clear_keeps_host_and_port() {
        let store = MemoryStore::with_services(&["Wi-Fi"]);
        store
            .write_proxy_config(
                "Wi-Fi",
                ProxyProtocol::Socks,
                &ProxyEndpoint::enabled("127.0.0.1", 7891),
            )
            .unwrap();
        store
            .clear_proxy_config("Wi-Fi", ProxyProtocol::Socks)
            .unwrap();

        let config = store.read_proxy_config("Wi-Fi").unwrap();
        assert!(!config.socks.enabled);
        assert_eq!(config.socks.host, "127.0.0.1");
        assert_eq!(config.socks.port, 7891);
    }
}
