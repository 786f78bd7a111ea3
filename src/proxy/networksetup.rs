// 基于 macOS networksetup 命令行工具的存取实现

use crate::proxy::error::ProxyError;
use crate::proxy::settings::{ProxyEndpoint, ProxyProtocol, ServiceProxyConfig};
use crate::proxy::store::SettingStore;
use std::process::Command;

const NETWORKSETUP: &str = "/usr/sbin/networksetup";

// 每种协议对应的 networksetup 子命令
fn subcommands(protocol: ProxyProtocol) -> (&'static str, &'static str, &'static str) {
    match protocol {
        ProxyProtocol::Http => ("-getwebproxy", "-setwebproxy", "-setwebproxystate"),
        ProxyProtocol::Https => (
            "-getsecurewebproxy",
            "-setsecurewebproxy",
            "-setsecurewebproxystate",
        ),
        ProxyProtocol::Socks => (
            "-getsocksfirewallproxy",
            "-setsocksfirewallproxy",
            "-setsocksfirewallproxystate",
        ),
    }
}

// 解析 -listallnetworkservices 输出
//
// 首行是说明文字，带 * 前缀的服务处于停用状态，两者都不参与配置
fn parse_service_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.is_empty() && !line.contains('*'))
        .map(|line| line.to_string())
        .collect()
}

// 解析 -getwebproxy 一类命令的输出
//
// 形如：
//   Enabled: Yes
//   Server: 127.0.0.1
//   Port: 7890
//   Authenticated Proxy Enabled: 0
fn parse_endpoint(stdout: &str) -> ProxyEndpoint {
    let mut endpoint = ProxyEndpoint::disabled();
    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("Enabled:") {
            endpoint.enabled = value.contains("Yes");
        } else if let Some(value) = line.strip_prefix("Server:") {
            endpoint.host = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Port:") {
            endpoint.port = value.trim().parse().unwrap_or(0);
        }
    }
    endpoint
}

// 把 networksetup 的诊断文本归类为结构化错误
fn classify_failure(service: &str, protocol: ProxyProtocol, text: &str) -> ProxyError {
    if text.contains("is not a recognized network service") {
        return ProxyError::ServiceNotFound(service.to_string());
    }
    let lowered = text.to_lowercase();
    if lowered.contains("permission") || lowered.contains("admin") {
        return ProxyError::PermissionDenied {
            service: service.to_string(),
            protocol: protocol.as_str().to_string(),
        };
    }
    ProxyError::CommandFailed {
        tool: "networksetup".to_string(),
        message: text.trim().to_string(),
    }
}

// networksetup 实现：逐条调用系统工具，配置由操作系统持久化
#[derive(Default)]
pub struct NetworksetupStore;

impl NetworksetupStore {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, service: &str, protocol: ProxyProtocol, args: &[&str]) -> Result<String, ProxyError> {
        log::debug!("执行 networksetup {:?}", args);
        let output = Command::new(NETWORKSETUP).args(args).output().map_err(|e| {
            ProxyError::CommandFailed {
                tool: "networksetup".to_string(),
                message: e.to_string(),
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let text = if stderr.trim().is_empty() {
                stdout.as_str()
            } else {
                stderr.as_ref()
            };
            return Err(classify_failure(service, protocol, text));
        }

        // networksetup 对未知服务也可能返回 0，错误只出现在输出文本里
        if stdout.contains("is not a recognized network service") {
            return Err(ProxyError::ServiceNotFound(service.to_string()));
        }

        Ok(stdout)
    }
}

impl SettingStore for NetworksetupStore {
    fn list_network_services(&self) -> Result<Vec<String>, ProxyError> {
        let output = Command::new(NETWORKSETUP)
            .arg("-listallnetworkservices")
            .output()
            .map_err(|e| ProxyError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProxyError::Unavailable(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let services = parse_service_list(&stdout);
        log::debug!("枚举到 {} 个网络服务", services.len());
        Ok(services)
    }

    fn read_proxy_config(&self, service: &str) -> Result<ServiceProxyConfig, ProxyError> {
        let mut config = ServiceProxyConfig::default();
        for protocol in ProxyProtocol::ALL {
            let (get, _, _) = subcommands(protocol);
            let stdout = self.run(service, protocol, &[get, service])?;
            *config.endpoint_mut(protocol) = parse_endpoint(&stdout);
        }
        Ok(config)
    }

    fn write_proxy_config(
        &self,
        service: &str,
        protocol: ProxyProtocol,
        endpoint: &ProxyEndpoint,
    ) -> Result<(), ProxyError> {
        endpoint.validate()?;
        let (_, set, state) = subcommands(protocol);
        let port = endpoint.port.to_string();

        if endpoint.enabled {
            self.run(service, protocol, &[set, service, &endpoint.host, &port])?;
            self.run(service, protocol, &[state, service, "on"])?;
        } else {
            // 关闭状态也要把快照里的 host/port 原样写回，再关掉开关
            if !endpoint.host.is_empty() && endpoint.port != 0 {
                self.run(service, protocol, &[set, service, &endpoint.host, &port])?;
            }
            self.run(service, protocol, &[state, service, "off"])?;
        }
        Ok(())
    }

    fn clear_proxy_config(&self, service: &str, protocol: ProxyProtocol) -> Result<(), ProxyError> {
        let (_, _, state) = subcommands(protocol);
        self.run(service, protocol, &[state, service, "off"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_list_skips_banner_and_disabled_entries() {
        let stdout = "An asterisk (*) denotes that a network service is disabled.\n\
                      Wi-Fi\n\
                      *Thunderbolt Bridge\n\
                      Ethernet\n";
        assert_eq!(parse_service_list(stdout), ["Wi-Fi", "Ethernet"]);
    }

    #[test]
    fn endpoint_output_parses_enabled_proxy() {
        let stdout = "Enabled: Yes\nServer: 127.0.0.1\nPort: 7890\nAuthenticated Proxy Enabled: 0\n";
        let endpoint = parse_endpoint(stdout);
        assert!(endpoint.enabled);
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 7890);
    }

    #[test]
    fn endpoint_output_parses_disabled_proxy() {
        let stdout = "Enabled: No\nServer: \nPort: 0\nAuthenticated Proxy Enabled: 0\n";
        let endpoint = parse_endpoint(stdout);
        assert!(!endpoint.enabled);
        assert_eq!(endpoint.host, "");
        assert_eq!(endpoint.port, 0);
    }

    #[test]
    fn unknown_service_text_maps_to_service_not_found() {
        let error = classify_failure(
            "Ethernet",
            ProxyProtocol::Http,
            "Ethernet is not a recognized network service.",
        );
        assert_eq!(error, ProxyError::ServiceNotFound("Ethernet".to_string()));
    }

    #[test]
    fn permission_text_maps_to_permission_denied() {
        let error = classify_failure(
            "Wi-Fi",
            ProxyProtocol::Socks,
            "You must run this tool with admin privileges.",
        );
        assert!(matches!(error, ProxyError::PermissionDenied { .. }));
    }

    #[test]
    fn other_diagnostics_map_to_command_failed() {
        let error = classify_failure("Wi-Fi", ProxyProtocol::Http, "** Error: unexpected state");
        assert!(matches!(error, ProxyError::CommandFailed { .. }));
    }
}
