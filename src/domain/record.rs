use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::domain::error::SearchError;

/// CSV 报告的表头
pub const CSV_HEADER: &str = "FileName,FilePath,FileSize,CreationTime,LastModifiedTime";

/// 报告中时间字段的格式 (本地时间, 24 小时制)
const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 一次搜索的请求参数，创建时完成校验，之后不可修改
#[derive(Debug, Clone)]
pub struct SearchRequest {
    root_path: PathBuf,
    output_template: String,
    filters: Vec<String>,
}

impl SearchRequest {
    /// 校验并创建搜索请求
    pub fn new(
        root_path: impl Into<PathBuf>,
        output_template: impl Into<String>,
        filters: Vec<String>,
    ) -> Result<Self, SearchError> {
        let root_path = root_path.into();
        let output_template = output_template.into();

        if root_path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(SearchError::EmptyRootPath);
        }
        if output_template.trim().is_empty() {
            return Err(SearchError::EmptyOutputPath);
        }
        if !root_path.exists() {
            return Err(SearchError::RootNotFound(root_path));
        }
        if !root_path.is_dir() {
            return Err(SearchError::RootNotDirectory(root_path));
        }

        Ok(Self {
            root_path,
            output_template,
            filters,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn output_template(&self) -> &str {
        &self.output_template
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }
}

/// 一个匹配到的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub full_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Local>,
    pub modified_at: DateTime<Local>,
}

impl FileRecord {
    /// 从文件元数据构建记录
    ///
    /// 不支持创建时间的文件系统上，创建时间取修改时间。
    pub fn from_metadata(name: String, full_path: PathBuf, metadata: &Metadata) -> std::io::Result<Self> {
        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);

        Ok(Self {
            name,
            full_path,
            size_bytes: metadata.len(),
            created_at: DateTime::<Local>::from(created),
            modified_at: DateTime::<Local>::from(modified),
        })
    }

    /// 转换为一行 CSV (不含换行符)
    ///
    /// 文件名和路径用双引号包裹，但内部的双引号不做转义。
    pub fn to_csv_line(&self) -> String {
        format!(
            "\"{}\",\"{}\",{},{},{}",
            self.name,
            self.full_path.display(),
            self.size_bytes,
            self.created_at.format(CSV_TIME_FORMAT),
            self.modified_at.format(CSV_TIME_FORMAT),
        )
    }
}

/// 进度快照，每次匹配时发布一次
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub matched_count: u64,
    pub total_scanned_count: u64,
    pub last_match: Option<FileRecord>,
}

/// 搜索的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl SearchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SearchOutcome::Completed)
    }
}

impl std::fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchOutcome::Completed => write!(f, "已完成"),
            SearchOutcome::Cancelled => write!(f, "已取消"),
            SearchOutcome::Failed(reason) => write!(f, "失败: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample_record() -> FileRecord {
        let created = Local.with_ymd_and_hms(2024, 3, 11, 9, 5, 7).unwrap();
        let modified = Local.with_ymd_and_hms(2024, 3, 12, 17, 30, 0).unwrap();
        FileRecord {
            name: "a.txt".to_string(),
            full_path: PathBuf::from("/data/a.txt"),
            size_bytes: 1234,
            created_at: created,
            modified_at: modified,
        }
    }

    #[test]
    fn test_csv_line_format() {
        assert_eq!(
            sample_record().to_csv_line(),
            "\"a.txt\",\"/data/a.txt\",1234,2024-03-11 09:05:07,2024-03-12 17:30:00"
        );
    }

    #[test]
    fn test_csv_line_keeps_embedded_quotes() {
        let mut record = sample_record();
        record.name = "say \"hi\".txt".to_string();
        assert!(record.to_csv_line().starts_with("\"say \"hi\".txt\","));
    }

    #[test]
    fn test_request_validation() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("plain.txt");
        std::fs::write(&file_path, b"x").unwrap();

        assert!(matches!(
            SearchRequest::new("", "out.csv", vec![]),
            Err(SearchError::EmptyRootPath)
        ));
        assert!(matches!(
            SearchRequest::new(temp_dir.path(), "  ", vec![]),
            Err(SearchError::EmptyOutputPath)
        ));
        assert!(matches!(
            SearchRequest::new(temp_dir.path().join("missing"), "out.csv", vec![]),
            Err(SearchError::RootNotFound(_))
        ));
        assert!(matches!(
            SearchRequest::new(&file_path, "out.csv", vec![]),
            Err(SearchError::RootNotDirectory(_))
        ));

        let request = SearchRequest::new(temp_dir.path(), "out.csv", vec!["*.txt".to_string()]).unwrap();
        assert_eq!(request.root_path(), temp_dir.path());
        assert_eq!(request.filters(), &["*.txt".to_string()]);
    }

    #[test]
    fn test_record_from_metadata() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, vec![0u8; 42]).unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let record = FileRecord::from_metadata("data.bin".to_string(), path.clone(), &metadata).unwrap();
        assert_eq!(record.size_bytes, 42);
        assert_eq!(record.full_path, path);
        assert!(record.created_at <= Local::now());
    }
}
