// IPC 全链路测试：通过真实 Unix Socket 驱动核心命令

use proxyconf_helper::ipc::{IpcClient, IpcCommand, IpcResponse, IpcServer};
use proxyconf_helper::proxy::{
    MemoryStore, ProxyConfigService, ProxyEndpoint, ProxySnapshot, ServiceProxyConfig,
};
use proxyconf_helper::service::handler::create_handler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

fn test_socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("proxyconf-helper-{}-{}.sock", name, std::process::id()))
}

// 在给定的 socket 路径上启动一个以内存存取层为后端的服务端
async fn spawn_server(path: &PathBuf, store: Arc<MemoryStore>) -> IpcClient {
    let proxy = Arc::new(ProxyConfigService::new(store));
    let last_heartbeat = Arc::new(RwLock::new(Instant::now()));
    let handler = create_handler(proxy, last_heartbeat);
    let mut server = IpcServer::with_path(handler, path.clone());
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // 等待 socket 文件出现
    for _ in 0..100 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(path.exists(), "IPC 服务端未能启动");

    IpcClient::with_path(path.clone())
}

async fn fetch_snapshot(client: &IpcClient) -> ProxySnapshot {
    match client.send_command(IpcCommand::GetProxySettings).await.unwrap() {
        IpcResponse::ProxySettings { snapshot } => snapshot,
        other => panic!("意外的响应: {:?}", other),
    }
}

#[tokio::test]
async fn core_commands_round_trip() {
    let path = test_socket_path("core");
    let store = Arc::new(MemoryStore::new());
    store.add_service(
        "Wi-Fi",
        ServiceProxyConfig {
            http: ProxyEndpoint::enabled("proxy.corp.example", 8080),
            https: ProxyEndpoint::disabled(),
            socks: ProxyEndpoint::disabled(),
        },
    );
    store.add_service("Ethernet", ServiceProxyConfig::default());
    let client = spawn_server(&path, store).await;

    // 版本检查
    match client.send_command(IpcCommand::GetVersion).await.unwrap() {
        IpcResponse::Version { version } => assert_eq!(version, env!("CARGO_PKG_VERSION")),
        other => panic!("意外的响应: {:?}", other),
    }

    // 捕获快照
    let snapshot = fetch_snapshot(&client).await;
    assert_eq!(snapshot.len(), 2);

    // 启用
    match client
        .send_command(IpcCommand::EnableProxy {
            http_port: 7890,
            socks_port: 7891,
        })
        .await
        .unwrap()
    {
        IpcResponse::Success { .. } => {}
        other => panic!("意外的响应: {:?}", other),
    }

    let enabled = fetch_snapshot(&client).await;
    for entry in &enabled.services {
        assert_eq!(entry.config.http, ProxyEndpoint::enabled("127.0.0.1", 7890));
        assert_eq!(entry.config.socks, ProxyEndpoint::enabled("127.0.0.1", 7891));
    }

    // 按快照恢复
    match client
        .send_command(IpcCommand::RestoreProxy {
            http_port: 7890,
            socks_port: 7891,
            snapshot: snapshot.clone(),
        })
        .await
        .unwrap()
    {
        IpcResponse::Success { .. } => {}
        other => panic!("意外的响应: {:?}", other),
    }
    assert_eq!(fetch_snapshot(&client).await, snapshot);

    // 关闭
    match client.send_command(IpcCommand::DisableProxy).await.unwrap() {
        IpcResponse::Success { .. } => {}
        other => panic!("意外的响应: {:?}", other),
    }
    let disabled = fetch_snapshot(&client).await;
    for entry in &disabled.services {
        assert!(!entry.config.http.enabled);
        assert!(!entry.config.https.enabled);
        assert!(!entry.config.socks.enabled);
    }

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn total_failure_crosses_the_wire_as_error_reply() {
    let path = test_socket_path("denied");
    let store = Arc::new(MemoryStore::with_services(&["Wi-Fi"]));
    store.deny_writes("Wi-Fi");
    let client = spawn_server(&path, store).await;

    match client
        .send_command(IpcCommand::EnableProxy {
            http_port: 7890,
            socks_port: 7891,
        })
        .await
        .unwrap()
    {
        IpcResponse::Error { code, message } => {
            assert_eq!(code, 2001);
            assert!(message.contains("权限不足"));
        }
        other => panic!("意外的响应: {:?}", other),
    }

    // 一次请求失败后，服务必须还能处理下一次请求
    match client.send_command(IpcCommand::GetVersion).await.unwrap() {
        IpcResponse::Version { .. } => {}
        other => panic!("意外的响应: {:?}", other),
    }

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn heartbeat_and_logs_commands_reply() {
    let path = test_socket_path("ambient");
    let store = Arc::new(MemoryStore::with_services(&["Wi-Fi"]));
    let client = spawn_server(&path, store).await;

    match client.send_command(IpcCommand::Heartbeat).await.unwrap() {
        IpcResponse::HeartbeatAck => {}
        other => panic!("意外的响应: {:?}", other),
    }

    match client
        .send_command(IpcCommand::GetLogs { lines: 100 })
        .await
        .unwrap()
    {
        IpcResponse::Logs { .. } => {}
        other => panic!("意外的响应: {:?}", other),
    }

    let _ = std::fs::remove_file(&path);
}
