// 代理配置服务门面：校验请求、编排存取层、聚合逐项结果

use crate::proxy::error::ProxyError;
use crate::proxy::settings::{ProxyEndpoint, ProxyProtocol, ProxySnapshot};
use crate::proxy::store::SettingStore;
use std::sync::Arc;
use tokio::sync::Mutex;

// 本助手写入系统配置时使用的代理主机
pub const PROXY_HOST: &str = "127.0.0.1";

// 单个服务/协议的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    // 配置已写入
    Applied,
    // 快照值已恢复
    Restored,
    // 现值已被外部修改，保持原样
    Skipped,
    // 操作失败
    Failed(ProxyError),
}

// 报告条目；protocol 为 None 表示服务级失败（如枚举后消失）
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub service: String,
    pub protocol: Option<ProxyProtocol>,
    pub outcome: Outcome,
}

// 一次多服务操作的逐项结果
//
// 结构化列表贯穿内部流程，只在协议边界折叠成一条摘要文本
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub entries: Vec<ReportEntry>,
}

impl ApplyReport {
    // 请求在进入多服务处理之前就被拒绝
    fn rejected(error: ProxyError) -> Self {
        Self {
            entries: vec![ReportEntry {
                service: String::new(),
                protocol: None,
                outcome: Outcome::Failed(error),
            }],
        }
    }

    fn record(&mut self, service: &str, protocol: Option<ProxyProtocol>, outcome: Outcome) {
        self.entries.push(ReportEntry {
            service: service.to_string(),
            protocol,
            outcome,
        });
    }

    pub fn is_total_failure(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|entry| matches!(entry.outcome, Outcome::Failed(_)))
    }

    pub fn first_error(&self) -> Option<&ProxyError> {
        self.entries.iter().find_map(|entry| match &entry.outcome {
            Outcome::Failed(error) => Some(error),
            _ => None,
        })
    }

    // 出现过失败的服务名，按首次出现顺序去重
    pub fn failed_services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if matches!(entry.outcome, Outcome::Failed(_))
                && !entry.service.is_empty()
                && !names.contains(&entry.service.as_str())
            {
                names.push(entry.service.as_str());
            }
        }
        names
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome == Outcome::Skipped)
            .count()
    }

    pub fn restored_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome == Outcome::Restored)
            .count()
    }

    // 折叠为一条给调用方展示的摘要
    //
    // 全部失败（或没有可配置的服务）视为操作失败，返回第一个错误；
    // 只要有一个服务成功就算成功，失败与跳过的服务在摘要里注明
    pub fn summarize(&self, action: &str) -> Result<String, String> {
        if self.entries.is_empty() {
            return Err(format!("{}失败: 未找到可配置的网络服务", action));
        }
        if self.is_total_failure() {
            let first = self
                .first_error()
                .map(|error| error.to_string())
                .unwrap_or_default();
            return Err(format!("{}失败: {}", action, first));
        }

        let mut message = format!("{}完成", action);
        let failed = self.failed_services();
        if !failed.is_empty() {
            message.push_str(&format!("，以下网络服务未生效: {}", failed.join(", ")));
        }
        let skipped = self.skipped_count();
        if skipped > 0 {
            message.push_str(&format!("，{} 项配置已被外部修改，保持原样", skipped));
        }
        Ok(message)
    }
}

// 远程可调用的门面
//
// 变更操作全程持有进程级互斥锁：系统代理是全局、无版本、无事务的状态，
// 两次多服务写入交错会让一部分服务停留在另一次调用的配置上
pub struct ProxyConfigService {
    store: Arc<dyn SettingStore>,
    mutation_lock: Mutex<()>,
}

impl ProxyConfigService {
    pub fn new(store: Arc<dyn SettingStore>) -> Self {
        Self {
            store,
            mutation_lock: Mutex::new(()),
        }
    }

    // 版本号，调用方用于检测过期的助手
    pub fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    // 本助手在启用时为各协议写入的端点
    fn helper_endpoint(protocol: ProxyProtocol, http_port: u16, socks_port: u16) -> ProxyEndpoint {
        match protocol {
            ProxyProtocol::Socks => ProxyEndpoint::enabled(PROXY_HOST, socks_port),
            _ => ProxyEndpoint::enabled(PROXY_HOST, http_port),
        }
    }

    // 启用系统代理：HTTP/HTTPS 指向 http_port，SOCKS 指向 socks_port
    //
    // 逐服务独立处理，单个服务失败不中断其余服务；幂等
    pub async fn enable_proxy(&self, http_port: u16, socks_port: u16) -> ApplyReport {
        if http_port == 0 || socks_port == 0 {
            return ApplyReport::rejected(ProxyError::InvalidEndpoint {
                reason: format!("端口不可为 0: http={}, socks={}", http_port, socks_port),
            });
        }

        let _guard = self.mutation_lock.lock().await;
        let services = match self.store.list_network_services() {
            Ok(services) => services,
            Err(error) => return ApplyReport::rejected(error),
        };

        let mut report = ApplyReport::default();
        for service in &services {
            for protocol in ProxyProtocol::ALL {
                let endpoint = Self::helper_endpoint(protocol, http_port, socks_port);
                match self.store.write_proxy_config(service, protocol, &endpoint) {
                    Ok(()) => report.record(service, Some(protocol), Outcome::Applied),
                    Err(error) => {
                        log::warn!("服务 {} 的 {} 代理写入失败: {}", service, protocol, error);
                        report.record(service, Some(protocol), Outcome::Failed(error));
                    }
                }
            }
        }
        report
    }

    // 关闭全部系统代理；幂等
    pub async fn disable_proxy(&self) -> ApplyReport {
        let _guard = self.mutation_lock.lock().await;
        let services = match self.store.list_network_services() {
            Ok(services) => services,
            Err(error) => return ApplyReport::rejected(error),
        };

        let mut report = ApplyReport::default();
        for service in &services {
            for protocol in ProxyProtocol::ALL {
                match self.store.clear_proxy_config(service, protocol) {
                    Ok(()) => report.record(service, Some(protocol), Outcome::Applied),
                    Err(error) => {
                        log::warn!("服务 {} 的 {} 代理关闭失败: {}", service, protocol, error);
                        report.record(service, Some(protocol), Outcome::Failed(error));
                    }
                }
            }
        }
        report
    }

    // 按快照恢复系统代理
    //
    // current_* 是本助手当前写入的端口。只有当现值仍然与本助手写入的
    // 配置完全一致（host、port、enabled 三者严格相等）时才写回快照值；
    // 现值被用户或其他工具改动过的条目保持原样，绝不覆盖
    pub async fn restore_proxy(
        &self,
        current_http_port: u16,
        current_socks_port: u16,
        snapshot: &ProxySnapshot,
    ) -> ApplyReport {
        let _guard = self.mutation_lock.lock().await;

        let mut report = ApplyReport::default();
        for entry in &snapshot.services {
            let live = match self.store.read_proxy_config(&entry.service) {
                Ok(config) => config,
                Err(error) => {
                    log::warn!("服务 {} 无法读取，跳过恢复: {}", entry.service, error);
                    report.record(&entry.service, None, Outcome::Failed(error));
                    continue;
                }
            };

            for protocol in ProxyProtocol::ALL {
                let expected =
                    Self::helper_endpoint(protocol, current_http_port, current_socks_port);
                if *live.endpoint(protocol) != expected {
                    log::debug!(
                        "服务 {} 的 {} 代理已被外部修改，保持原样",
                        entry.service,
                        protocol
                    );
                    report.record(&entry.service, Some(protocol), Outcome::Skipped);
                    continue;
                }

                let saved = entry.config.endpoint(protocol);
                match self
                    .store
                    .write_proxy_config(&entry.service, protocol, saved)
                {
                    Ok(()) => report.record(&entry.service, Some(protocol), Outcome::Restored),
                    Err(error) => {
                        log::warn!(
                            "服务 {} 的 {} 代理恢复失败: {}",
                            entry.service,
                            protocol,
                            error
                        );
                        report.record(&entry.service, Some(protocol), Outcome::Failed(error));
                    }
                }
            }
        }
        report
    }

    // 读取当前全部代理配置，作为之后恢复用的快照
    //
    // 纯读取，不持有变更锁；枚举后消失的服务直接跳过，读取随时可用
    pub fn current_settings(&self) -> Result<ProxySnapshot, ProxyError> {
        let services = self.store.list_network_services()?;

        let mut snapshot = ProxySnapshot::default();
        for service in services {
            match self.store.read_proxy_config(&service) {
                Ok(config) => snapshot.push(service, config),
                Err(error) => {
                    log::warn!("服务 {} 读取失败，不计入快照: {}", service, error);
                }
            }
        }
        Ok(snapshot)
    }
}
