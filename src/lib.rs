// 三层架构模块
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

// 重新导出主要类型
pub use domain::{FileRecord, FilterSet, ProgressSnapshot, SearchError, SearchOutcome, SearchRequest};
pub use application::{Config, ProgressChannel, ProgressSink, SearchCoordinator, SearchReport};
pub use infrastructure::{Logger, LoggerTrait, SearchEvent, ErrorLogger, ErrorType};
pub use presentation::{SearchSummary, ProgressDisplay};
