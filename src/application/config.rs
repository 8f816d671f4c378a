use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::WalkOptions;
use crate::infrastructure::WriterOptions;

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 搜索相关配置
    pub search: SearchConfig,
    /// 遍历相关配置
    pub walk: WalkConfig,
    /// 输出写入配置
    pub writer: WriterConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// 默认搜索路径
    pub root_path: String,
    /// 输出文件路径模板，可以包含 `{yyyy-MM-dd}` 这样的日期标记
    pub output_template: String,
    /// 文件名过滤条件，为空时匹配所有文件
    pub filters: Vec<String>,
}

/// 遍历配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    /// 是否遵循 .gitignore 规则
    pub respect_gitignore: bool,
    /// 是否跟随符号链接
    pub follow_links: bool,
}

/// 输出写入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// 缓冲区刷新间隔毫秒数
    pub flush_interval_ms: u64,
    /// 结束时刷新失败的重试次数
    pub final_flush_retries: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 是否写入调试日志和错误日志
    pub enabled: bool,
    /// 日志文件目录
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                root_path: ".".to_string(),
                output_template: "file_report_{yyyy-MM-dd_HHmmss}.csv".to_string(),
                filters: vec![],
            },
            walk: WalkConfig {
                respect_gitignore: false,
                follow_links: false,
            },
            writer: WriterConfig {
                flush_interval_ms: 100,
                final_flush_retries: 3,
            },
            logging: LoggingConfig {
                enabled: false,
                log_dir: ".".to_string(),
            },
        }
    }
}

impl Config {
    /// 从配置文件加载配置，如果文件不存在则创建默认配置文件
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let config = Self::default();
            config.save_to_file(config_path)?;
            println!("已创建默认配置文件: {}", config_path.display());
            Ok(config)
        }
    }

    /// 从文件加载配置
    pub fn load_from_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("无法读取配置文件: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", config_path.display()))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .context("无法序列化配置")?;

        fs::write(config_path, content)
            .with_context(|| format!("无法写入配置文件: {}", config_path.display()))?;

        Ok(())
    }

    /// 获取配置文件的默认路径 (程序所在目录下的 file_report.toml)
    pub fn default_config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe()
            .context("无法获取程序路径")?;

        let exe_dir = exe_path.parent()
            .context("无法获取程序目录")?;

        Ok(exe_dir.join("file_report.toml"))
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.writer.flush_interval_ms < 10 || self.writer.flush_interval_ms > 10000 {
            anyhow::bail!("flush_interval_ms 必须在 10-10000 之间");
        }

        if self.writer.final_flush_retries > 10 {
            anyhow::bail!("final_flush_retries 不能超过 10");
        }

        if self.logging.enabled && self.logging.log_dir.trim().is_empty() {
            anyhow::bail!("启用日志时 log_dir 不能为空");
        }

        Ok(())
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            respect_gitignore: self.walk.respect_gitignore,
            follow_links: self.walk.follow_links,
        }
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            flush_interval: Duration::from_millis(self.writer.flush_interval_ms),
            final_flush_retries: self.writer.final_flush_retries,
        }
    }
}
