pub mod logging;
pub mod error_logging;
pub mod result_writer;

pub use logging::{Logger, LoggerTrait, SearchEvent};
pub use error_logging::{ErrorLogger, ErrorType};
pub use result_writer::{RecordSink, ResultWriter, RunningWriter, WriterOptions, WriterStats};
