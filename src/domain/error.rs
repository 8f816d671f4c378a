use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 搜索过程中会暴露给调用方的错误
///
/// 单个文件或目录的访问错误不在这里，它们由遍历器跳过并记录到错误日志。
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("搜索路径不能为空")]
    EmptyRootPath,

    #[error("输出路径不能为空")]
    EmptyOutputPath,

    #[error("搜索目录不存在: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("搜索路径不是目录: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("无法打开输出文件 {}: {source}", .path.display())]
    WriterOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无法写入输出文件 {}: {source}", .path.display())]
    WriterFlush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SearchError {
    /// 是否属于请求校验错误
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyRootPath
                | SearchError::EmptyOutputPath
                | SearchError::RootNotFound(_)
                | SearchError::RootNotDirectory(_)
        )
    }
}
