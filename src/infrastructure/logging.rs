use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;

use crate::domain::{FileRecord, SearchOutcome, WalkStats};
use crate::infrastructure::WriterStats;

/// 调试日志中的一条搜索事件
#[derive(Debug, Clone, Copy)]
pub enum SearchEvent<'a> {
    /// 一次搜索开始，输出路径已解析
    Started {
        root: &'a Path,
        filters: &'a [String],
        output: &'a Path,
    },
    /// 文件名匹配，记录已交给写入器
    Matched(&'a FileRecord),
    /// 文件或目录无法访问，已跳过
    Skipped { path: &'a Path, reason: &'a str },
    /// 输出文件已创建并写入表头
    WriterOpened(&'a Path),
    /// 一次刷新写出了记录或失败
    Drained {
        written: u64,
        pending: usize,
        failed: bool,
    },
    /// 写入线程结束，文件已关闭
    WriterClosed {
        path: &'a Path,
        stats: &'a WriterStats,
    },
    /// 收到取消请求
    CancelRequested,
}

impl SearchEvent<'_> {
    /// 日志行中的事件标签
    pub fn tag(&self) -> &'static str {
        match self {
            SearchEvent::Started { .. } => "START",
            SearchEvent::Matched(_) => "MATCH",
            SearchEvent::Skipped { .. } => "SKIP",
            SearchEvent::WriterOpened(_) => "OPEN",
            SearchEvent::Drained { .. } => "DRAIN",
            SearchEvent::WriterClosed { .. } => "CLOSE",
            SearchEvent::CancelRequested => "CANCEL",
        }
    }
}

impl fmt::Display for SearchEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchEvent::Started { root, filters, output } => {
                let filters = if filters.is_empty() {
                    "(全部文件)".to_string()
                } else {
                    filters.join(";")
                };
                write!(f, "目录: {} | 过滤: {} | 输出: {}", root.display(), filters, output.display())
            }
            SearchEvent::Matched(record) => write!(
                f,
                "{} | {} 字节 | 修改于 {}",
                record.full_path.display(),
                record.size_bytes,
                record.modified_at.format("%Y-%m-%d %H:%M:%S")
            ),
            SearchEvent::Skipped { path, reason } => write!(f, "{} | {}", path.display(), reason),
            SearchEvent::WriterOpened(path) => write!(f, "{}", path.display()),
            SearchEvent::Drained { written, pending, failed } => {
                write!(f, "写入 {} 条 | 待写 {} 条", written, pending)?;
                if *failed {
                    write!(f, " | 失败，下次重试")?;
                }
                Ok(())
            }
            SearchEvent::WriterClosed { path, stats } => write!(
                f,
                "{} | 记录 {} 条 | 刷新 {} 次 | 失败 {} 次",
                path.display(),
                stats.records_written,
                stats.drain_passes,
                stats.failed_passes
            ),
            SearchEvent::CancelRequested => write!(f, "已通知遍历线程停止"),
        }
    }
}

/// 日志记录器trait
pub trait LoggerTrait: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn log_message(&self, message: &str) -> Result<()>;
    fn log_event(&self, event: &SearchEvent<'_>) -> Result<()>;
    fn finalize(
        &self,
        outcome: &SearchOutcome,
        walk: &WalkStats,
        writer: &WriterStats,
        duration: Duration,
    ) -> Result<()>;
}

/// 调试日志记录器，按事件记录一次搜索的全过程
pub struct Logger {
    log_file: Arc<Mutex<Option<File>>>,
    log_path: PathBuf,
    enabled: bool,
}

impl Logger {
    /// 日志文件写到当前目录
    pub fn new(enabled: bool) -> Result<Self> {
        Self::in_dir(enabled, Path::new("."))
    }

    /// 日志文件写到指定目录，文件名带启动时间
    pub fn in_dir(enabled: bool, dir: &Path) -> Result<Self> {
        if !enabled {
            return Ok(Self {
                log_file: Arc::new(Mutex::new(None)),
                log_path: PathBuf::new(),
                enabled: false,
            });
        }

        let now = Local::now();
        fs::create_dir_all(dir)
            .with_context(|| format!("无法创建日志目录: {}", dir.display()))?;
        let log_path = dir.join(format!("file_report_debug_{}.log", now.format("%Y%m%d_%H%M%S")));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("无法创建日志文件: {}", log_path.display()))?;

        // UTF-8 BOM，方便在记事本中正确显示中文
        file.write_all(&[0xEF, 0xBB, 0xBF])?;
        writeln!(file, "# FileReport 调试日志 ({})", now.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file, "# START 搜索参数 | MATCH 匹配文件 | SKIP 跳过项目")?;
        writeln!(file, "# OPEN / DRAIN / CLOSE 输出文件写入 | CANCEL 取消请求")?;
        file.flush()?;

        Ok(Self {
            log_file: Arc::new(Mutex::new(Some(file))),
            log_path,
            enabled: true,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn with_file<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        if !self.enabled {
            return Ok(());
        }

        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(file) = guard.as_mut() {
                write(file)?;
                file.flush()?;
            }
        }

        Ok(())
    }
}

fn timestamp() -> impl fmt::Display {
    Local::now().format("%H:%M:%S%.3f")
}

impl LoggerTrait for Logger {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn log_message(&self, message: &str) -> Result<()> {
        self.with_file(|file| writeln!(file, "[{}] {:<6} {}", timestamp(), "INFO", message))
    }

    fn log_event(&self, event: &SearchEvent<'_>) -> Result<()> {
        self.with_file(|file| writeln!(file, "[{}] {:<6} {}", timestamp(), event.tag(), event))
    }

    fn finalize(
        &self,
        outcome: &SearchOutcome,
        walk: &WalkStats,
        writer: &WriterStats,
        duration: Duration,
    ) -> Result<()> {
        self.with_file(|file| {
            writeln!(file, "# --------------------------------------------")?;
            writeln!(file, "# 结果: {} (用时 {:.3} 秒)", outcome, duration.as_secs_f64())?;
            writeln!(file, "# 扫描 {} | 匹配 {} | 写入 {}", walk.scanned, walk.matched, writer.records_written)?;
            writeln!(file, "# 跳过文件 {} | 跳过目录 {}", walk.skipped_entries, walk.skipped_dirs)?;
            writeln!(file, "# 刷新 {} 次，其中失败 {} 次", writer.drain_passes, writer.failed_passes)
        })
    }
}
