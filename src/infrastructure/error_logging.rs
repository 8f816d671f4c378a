use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Local;

/// 错误类型分类
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// 单个文件无法访问 (元数据读取失败、权限不足)
    EntryAccess,
    /// 目录无法列出，整个子树被跳过
    DirectoryAccess,
    /// 写入输出文件失败，下次刷新时重试
    WriterFlush,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::EntryAccess => "文件访问",
            ErrorType::DirectoryAccess => "目录访问",
            ErrorType::WriterFlush => "输出写入",
        }
    }
}

/// 错误日志记录器
///
/// 错误计数总是启用；只有启用时才写入错误日志文件。
pub struct ErrorLogger {
    error_file: Arc<Mutex<Option<File>>>,
    error_path: PathBuf,
    enabled: bool,
    error_counts: Arc<Mutex<HashMap<ErrorType, usize>>>,
}

impl ErrorLogger {
    /// 创建新的错误日志记录器，日志文件写到当前目录
    pub fn new(enabled: bool) -> Result<Self> {
        Self::in_dir(enabled, Path::new("."))
    }

    /// 创建新的错误日志记录器，日志文件写到指定目录
    pub fn in_dir(enabled: bool, dir: &Path) -> Result<Self> {
        if !enabled {
            return Ok(Self {
                error_file: Arc::new(Mutex::new(None)),
                error_path: PathBuf::new(),
                enabled: false,
                error_counts: Arc::new(Mutex::new(HashMap::new())),
            });
        }

        let now = Local::now();
        let timestamp = now.format("%Y%m%d_%H%M%S");

        fs::create_dir_all(dir)?;
        let error_path = dir.join(format!("file_report_error_{}.log", timestamp));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(&error_path)?;

        // 写入UTF-8 BOM以确保文件被正确识别为UTF-8
        let mut file_clone = file.try_clone()?;
        file_clone.write_all(&[0xEF, 0xBB, 0xBF])?;

        writeln!(file_clone, "# FileReport 错误日志")?;
        writeln!(file_clone, "# 开始时间: {}", now.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file_clone, "# ============================================")?;
        writeln!(file_clone)?;

        Ok(Self {
            error_file: Arc::new(Mutex::new(Some(file))),
            error_path,
            enabled: true,
            error_counts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// 记录错误
    pub fn log_error(
        &self,
        error_type: ErrorType,
        file_path: Option<&str>,
        message: &str,
        details: Option<&str>,
    ) -> Result<()> {
        if let Ok(mut counts) = self.error_counts.lock() {
            *counts.entry(error_type.clone()).or_insert(0) += 1;
        }

        if !self.enabled {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        if let Ok(mut file_guard) = self.error_file.lock() {
            if let Some(ref mut file) = *file_guard {
                writeln!(file, "[{}] {} - {}",
                    timestamp,
                    error_type.as_str(),
                    message
                )?;

                if let Some(path) = file_path {
                    writeln!(file, "  文件路径: {}", path)?;
                }

                if let Some(detail) = details {
                    writeln!(file, "  详细信息: {}", detail)?;
                }

                writeln!(file)?;
                file.flush()?;
            }
        }

        Ok(())
    }

    /// 获取错误统计信息
    pub fn get_error_summary(&self) -> HashMap<ErrorType, usize> {
        if let Ok(counts) = self.error_counts.lock() {
            counts.clone()
        } else {
            HashMap::new()
        }
    }

    /// 获取某类错误的次数
    pub fn count_of(&self, error_type: &ErrorType) -> usize {
        self.get_error_summary().get(error_type).copied().unwrap_or(0)
    }

    /// 获取总错误数
    pub fn get_total_errors(&self) -> usize {
        if let Ok(counts) = self.error_counts.lock() {
            counts.values().sum()
        } else {
            0
        }
    }

    /// 检查是否有错误
    pub fn has_errors(&self) -> bool {
        self.get_total_errors() > 0
    }

    /// 完成错误日志记录
    pub fn finalize(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Ok(mut file_guard) = self.error_file.lock() {
            if let Some(ref mut file) = *file_guard {
                let now = Local::now();
                writeln!(file, "# ============================================")?;
                writeln!(file, "# 结束时间: {}", now.format("%Y-%m-%d %H:%M:%S"))?;

                let summary = self.get_error_summary();
                if !summary.is_empty() {
                    writeln!(file, "# 错误统计:")?;
                    for (error_type, count) in &summary {
                        writeln!(file, "#   {}: {} 次", error_type.as_str(), count)?;
                    }
                    writeln!(file, "#   总计: {} 个错误", self.get_total_errors())?;
                } else {
                    writeln!(file, "# 无错误记录")?;
                }

                file.flush()?;
            }
        }

        Ok(())
    }

    /// 打印错误摘要到控制台
    pub fn print_error_summary(&self) {
        if !self.has_errors() {
            return;
        }

        println!("\n⚠️  搜索过程中跳过了以下内容:");
        println!("----------------------------");

        let summary = self.get_error_summary();
        for (error_type, count) in &summary {
            println!("  {}: {} 次", error_type.as_str(), count);
        }

        println!("  总计: {} 个错误", self.get_total_errors());
        if self.enabled {
            println!("  详细错误信息请查看: {}", self.error_path.display());
        }
    }
}
