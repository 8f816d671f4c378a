use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::{ProgressSink, SearchReport};
use crate::domain::{ProgressSnapshot, SearchOutcome};

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    }
}

/// 搜索过程中的进度指示器
pub struct ProgressDisplay {
    progress: ProgressBar,
}

impl ProgressDisplay {
    /// 创建进度指示器，quiet 时不输出任何内容
    pub fn new(quiet: bool) -> Self {
        let progress = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        progress.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress.set_message("正在搜索...");
        progress.enable_steady_tick(Duration::from_millis(100));

        Self { progress }
    }

    /// 结束进度显示
    pub fn finish(&self, outcome: &SearchOutcome) {
        self.progress.finish_with_message(format!("搜索{}", outcome));
    }
}

impl ProgressSink for ProgressDisplay {
    fn publish(&self, snapshot: ProgressSnapshot) {
        let last = snapshot
            .last_match
            .as_ref()
            .map(|record| record.name.as_str())
            .unwrap_or("");
        self.progress.set_message(format!(
            "已匹配 {} / 已扫描 {} 文件 | {}",
            snapshot.matched_count, snapshot.total_scanned_count, last
        ));
    }
}

/// 搜索摘要
pub struct SearchSummary {
    pub duration: Duration,
    pub scanned_files: u64,
    pub matched_files: u64,
    pub written_records: u64,
    pub matched_bytes: u64,
    pub skipped: u64,
    pub outcome: SearchOutcome,
}

impl SearchSummary {
    pub fn from_report(report: &SearchReport) -> Self {
        Self {
            duration: report.elapsed,
            scanned_files: report.walk.scanned,
            matched_files: report.walk.matched,
            written_records: report.writer.records_written,
            matched_bytes: report.matched_bytes,
            skipped: report.walk.skipped_entries + report.walk.skipped_dirs,
            outcome: report.outcome.clone(),
        }
    }

    pub fn print(&self, output_path: Option<&Path>) -> Result<()> {
        let mut stdout = io::stdout().lock();
        self.write_to(&mut stdout, output_path)
    }

    fn write_to(&self, out: &mut impl Write, output_path: Option<&Path>) -> Result<()> {
        writeln!(out, "\n搜索摘要:")?;
        writeln!(out, "----------------------------")?;
        writeln!(out, "结果: {}", self.outcome)?;
        writeln!(out, "总用时: {}", format_duration(self.duration))?;
        writeln!(out, "扫描文件: {}", self.scanned_files)?;
        writeln!(out, "匹配文件: {} ({})", self.matched_files, format_size(self.matched_bytes, BINARY))?;
        writeln!(out, "写入记录: {}", self.written_records)?;
        if self.skipped > 0 {
            writeln!(out, "跳过项目: {}", self.skipped)?;
        }
        if let Some(path) = output_path {
            writeln!(out, "输出文件: {}", path.display())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_summary_output() {
        let summary = SearchSummary {
            duration: Duration::from_secs(2),
            scanned_files: 10,
            matched_files: 3,
            written_records: 3,
            matched_bytes: 2048,
            skipped: 1,
            outcome: SearchOutcome::Cancelled,
        };

        let mut buffer = Vec::new();
        summary.write_to(&mut buffer, Some(Path::new("/tmp/report.csv"))).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("结果: 已取消"));
        assert!(text.contains("匹配文件: 3 (2 KiB)"));
        assert!(text.contains("跳过项目: 1"));
        assert!(text.contains("/tmp/report.csv"));
    }

    #[test]
    fn test_hidden_progress_accepts_snapshots() {
        let display = ProgressDisplay::new(true);
        display.publish(ProgressSnapshot {
            matched_count: 1,
            total_scanned_count: 4,
            last_match: None,
        });
        display.finish(&SearchOutcome::Completed);
    }
}
