// ProxyConf Helper Library
//
// 特权助手进程，负责以管理员权限写入与恢复系统代理配置

pub mod ipc;
pub mod logger;
pub mod proxy;
pub mod service;

use anyhow::Result;
use proxy::{NetworksetupStore, ProxyConfigService};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};

// 命令行入口
pub fn cli() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // 无参数时：尝试作为系统服务运行，否则显示帮助
    if args.len() <= 1 {
        // macOS: 作为 launchd 服务运行（launchd 启动时不带参数且无 TTY）
        #[cfg(target_os = "macos")]
        {
            use std::io::IsTerminal;
            if !std::io::stdin().is_terminal() {
                logger::init_logger();
                let rt = tokio::runtime::Runtime::new()?;
                return rt.block_on(run_console_mode());
            }
        }

        // 用户直接运行，显示帮助
        print_usage();
        return Ok(());
    }

    // 这些命令不需要管理员权限
    let no_admin_required = matches!(args[1].as_str(), "logs" | "version" | "-v" | "--version");

    // 需要权限的命令检查权限
    if !no_admin_required && !check_privileges() {
        print_privilege_error();
        std::process::exit(1);
    }

    handle_command(&args)?;
    Ok(())
}

// 检查是否有足够的权限运行
fn check_privileges() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

// 打印权限不足的错误信息
pub fn print_privilege_error() {
    eprintln!("错误: 此操作需要管理员权限");
    eprintln!();
    eprintln!("请使用 sudo 运行此命令");
}

// 打印使用说明
pub fn print_usage() {
    println!("ProxyConf Helper v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("可用命令：");
    println!("  run        - 以控制台模式运行服务（调试用）");
    println!("  logs       - 实时监控服务日志");
    println!("  version    - 显示版本号");
    println!();
    println!("注意：run 需要 root 权限；服务的安装与卸载由主程序的安装器完成");
}

// 控制台模式运行（launchd 启动与手动调试共用）
pub async fn run_console_mode() -> Result<()> {
    log::info!("ProxyConf Helper v{} 启动", env!("CARGO_PKG_VERSION"));

    // 创建一个 channel 用于优雅关闭
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    // 注册 Ctrl+C 信号处理器
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("无法注册 Ctrl+C 处理器");
        log::info!("收到 Ctrl+C 信号");
        let _ = shutdown_tx_clone.send(()).await;
    });

    // 注册 SIGTERM 处理器（launchd 通过 SIGTERM 停止服务）
    #[cfg(unix)]
    {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = signal(SignalKind::terminate()).expect("无法注册 SIGTERM");
            sigterm.recv().await;
            log::info!("收到 SIGTERM 信号");
            let _ = shutdown_tx_clone.send(()).await;
        });
    }

    // 创建共享状态：networksetup 存取层 + 门面服务
    let proxy_service = Arc::new(ProxyConfigService::new(Arc::new(NetworksetupStore::new())));
    let last_heartbeat = Arc::new(RwLock::new(Instant::now()));

    // 创建 IPC 服务端和处理器
    let handler = service::handler::create_handler(proxy_service.clone(), last_heartbeat.clone());
    let mut ipc_server = ipc::IpcServer::new(handler);

    // 启动心跳监控器任务
    // 主程序崩溃或退出后不能把用户留在一个已经失效的代理后面，
    // 心跳超时即自动关闭系统代理，服务本身继续运行等待重连
    let monitor_proxy = proxy_service.clone();
    let monitor_heartbeat = last_heartbeat.clone();
    let heartbeat_handle = tokio::spawn(async move {
        const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(70);
        const CHECK_INTERVAL: Duration = Duration::from_secs(30);

        log::info!("启动心跳监控器，超时时间: {}s", HEARTBEAT_TIMEOUT.as_secs());

        // 记录上一次检查的时间，用于检测系统休眠
        let mut last_check_time = Instant::now();

        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;

            let now = Instant::now();
            let check_elapsed = now.duration_since(last_check_time);
            last_check_time = now;

            // 检测系统休眠唤醒：两次检查之间的间隔远大于 CHECK_INTERVAL
            if check_elapsed > Duration::from_secs(60) {
                log::info!(
                    "检测到系统休眠唤醒（检查间隔: {}s），重置心跳计时器",
                    check_elapsed.as_secs()
                );
                *monitor_heartbeat.write().await = Instant::now();
                continue;
            }

            let elapsed = monitor_heartbeat.read().await.elapsed();
            if elapsed > HEARTBEAT_TIMEOUT {
                log::warn!(
                    "超过 {} 秒未收到主程序心跳，自动关闭系统代理（服务继续运行）",
                    HEARTBEAT_TIMEOUT.as_secs()
                );

                let report = monitor_proxy.disable_proxy().await;
                match report.summarize("关闭系统代理") {
                    Ok(message) => log::info!("心跳超时，{}", message),
                    Err(message) => log::error!("心跳超时，{}", message),
                }

                // 重置心跳时间，避免反复触发
                *monitor_heartbeat.write().await = Instant::now();
            } else {
                log::debug!("心跳正常，距离上次心跳: {}s", elapsed.as_secs());
            }
        }
    });

    // 运行 IPC 服务端
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.run().await {
            log::error!("IPC 服务器运行失败: {e}");
        }
    });

    log::info!("服务运行中");

    // 等待关闭信号
    shutdown_rx.recv().await;
    log::info!("正在停止服务...");

    // 系统代理配置由操作系统持久化，服务退出时保持原样，
    // 是否恢复由主程序下一次通过快照决定
    heartbeat_handle.abort();
    ipc_handle.abort();
    log::info!("服务已停止");
    Ok(())
}

// 处理命令行参数
pub fn handle_command(args: &[String]) -> Result<Option<()>> {
    if args.len() <= 1 {
        // 无命令，显示帮助信息
        print_usage();
        return Ok(Some(()));
    }

    match args[1].as_str() {
        "run" => {
            logger::init_logger();
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_console_mode())?;
            Ok(Some(()))
        }
        "logs" => {
            tokio::runtime::Runtime::new()?.block_on(async { follow_logs().await })?;
            Ok(Some(()))
        }
        "version" | "-v" | "--version" => {
            println!("ProxyConf Helper v{}", env!("CARGO_PKG_VERSION"));
            Ok(Some(()))
        }
        _ => {
            eprintln!("未知命令: {}", args[1]);
            println!();
            print_usage();
            Ok(Some(()))
        }
    }
}

// 实时监控服务日志
async fn follow_logs() -> Result<()> {
    use ipc::IpcClient;
    use ipc::protocol::{IpcCommand, IpcResponse};

    let client = IpcClient::default();

    // 先获取历史日志（最近 500 条）
    match client.send_command(IpcCommand::GetLogs { lines: 500 }).await {
        Ok(IpcResponse::Logs { lines: log_lines }) => {
            for line in log_lines {
                println!("{}", line);
            }
        }
        Ok(_) => {}
        Err(_) => {
            println!("服务未运行，请先启动服务");
            return Ok(());
        }
    }

    // 接收实时日志流
    let _ = client
        .stream_logs(|line| {
            println!("{}", line);
            true
        })
        .await;

    println!("\n日志流已断开");
    Ok(())
}
