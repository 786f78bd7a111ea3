// 服务日志系统：内存环形缓冲 + 实时广播 + 文件落盘

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use tokio::sync::broadcast;

// 环形缓冲区容量，GetLogs 只能取到最近这么多行
const RING_CAPACITY: usize = 2000;
// 广播通道容量，慢速订阅者会丢失早期日志
const STREAM_CAPACITY: usize = 256;
// 日志文件路径
const LOG_FILE: &str = "/var/log/proxyconf-helper.log";

struct ServiceLogger {
    ring: Mutex<VecDeque<String>>,
    stream: broadcast::Sender<String>,
    file: Mutex<Option<File>>,
}

static LOGGER: Lazy<ServiceLogger> = Lazy::new(|| {
    let (stream, _) = broadcast::channel(STREAM_CAPACITY);
    // 打不开日志文件时只保留内存日志，服务照常运行
    let file = OpenOptions::new().create(true).append(true).open(LOG_FILE).ok();
    ServiceLogger {
        ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
        stream,
        file: Mutex::new(file),
    }
});

impl Log for ServiceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!(
            "[{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        );

        {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(line.clone());
        }

        // 没有订阅者时发送失败是正常情况
        let _ = self.stream.send(line.clone());

        if let Some(file) = self.file.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            let _ = writeln!(file, "{}", line);
        }

        eprintln!("{}", line);
    }

    fn flush(&self) {
        if let Some(file) = self.file.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            let _ = file.flush();
        }
    }
}

// 初始化全局日志
pub fn init_logger() {
    let level = if std::env::var("PROXYCONF_DEBUG").is_ok() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if log::set_logger(&*LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// 获取最近 n 行日志
pub fn get_recent_logs(lines: usize) -> Vec<String> {
    let ring = LOGGER.ring.lock().unwrap_or_else(|e| e.into_inner());
    let skip = ring.len().saturating_sub(lines);
    ring.iter().skip(skip).cloned().collect()
}

// 订阅实时日志流
pub fn subscribe_logs() -> broadcast::Receiver<String> {
    LOGGER.stream.subscribe()
}
