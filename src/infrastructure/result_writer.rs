use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};

use crate::domain::record::{FileRecord, CSV_HEADER};
use crate::domain::SearchError;
use crate::infrastructure::{ErrorLogger, ErrorType, LoggerTrait, SearchEvent};

/// 写入线程的选项
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// 两次刷新之间的间隔
    pub flush_interval: Duration,
    /// 停止时最后一次刷新失败后的重试次数
    pub final_flush_retries: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            final_flush_retries: 3,
        }
    }
}

/// 写入统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    pub drain_passes: u64,
    pub failed_passes: u64,
}

/// 已打开的 CSV 输出，表头已写入
pub struct ResultWriter<W = BufWriter<File>> {
    out: W,
    path: PathBuf,
    logger: Arc<dyn LoggerTrait>,
    errors: Arc<ErrorLogger>,
}

impl ResultWriter {
    /// 创建输出文件 (必要时创建父目录) 并立即写入表头
    pub fn open(
        path: &Path,
        logger: Arc<dyn LoggerTrait>,
        errors: Arc<ErrorLogger>,
    ) -> Result<Self, SearchError> {
        let open_error = |source| SearchError::WriterOpen {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_error)?;
        }

        let file = File::create(path).map_err(open_error)?;
        ResultWriter::from_writer(BufWriter::new(file), path, logger, errors)
    }
}

impl<W: Write + Send + 'static> ResultWriter<W> {
    /// 在任意输出上写入表头，`path` 只用于日志和错误信息
    pub fn from_writer(
        mut out: W,
        path: &Path,
        logger: Arc<dyn LoggerTrait>,
        errors: Arc<ErrorLogger>,
    ) -> Result<Self, SearchError> {
        let open_error = |source| SearchError::WriterOpen {
            path: path.to_path_buf(),
            source,
        };

        out.write_all(format!("{}\n", CSV_HEADER).as_bytes()).map_err(open_error)?;
        out.flush().map_err(open_error)?;

        if logger.is_enabled() {
            let _ = logger.log_event(&SearchEvent::WriterOpened(path));
        }

        Ok(Self {
            out,
            path: path.to_path_buf(),
            logger,
            errors,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 启动后台刷新线程
    pub fn start(self, options: WriterOptions) -> RunningWriter {
        let (record_tx, record_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded(1);
        let path = self.path.clone();
        let logger = Arc::clone(&self.logger);

        let drain = DrainLoop {
            writer: self,
            pending: Vec::new(),
            stats: WriterStats::default(),
        };
        let spawned = thread::Builder::new()
            .name("result-writer".to_string())
            .spawn(move || drain.run(record_rx, stop_rx, options));

        // 线程创建失败时 stop 会返回错误
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                if logger.is_enabled() {
                    let _ = logger.log_message(&format!("无法启动写入线程: {}", err));
                }
                None
            }
        };

        RunningWriter {
            sink: RecordSink(record_tx),
            stop_tx,
            handle,
            path,
        }
    }
}

/// 记录队列的发送端，可以在多个生产者之间克隆
#[derive(Debug, Clone)]
pub struct RecordSink(Sender<FileRecord>);

impl RecordSink {
    /// 追加一条记录，不会阻塞
    pub fn enqueue(&self, record: FileRecord) {
        // 接收端只在写入线程结束后才会关闭
        let _ = self.0.send(record);
    }
}

/// 正在运行的写入器
pub struct RunningWriter {
    sink: RecordSink,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<Result<WriterStats, SearchError>>>,
    path: PathBuf,
}

impl RunningWriter {
    pub fn enqueue(&self, record: FileRecord) {
        self.sink.enqueue(record);
    }

    pub fn sink(&self) -> RecordSink {
        self.sink.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 通知写入线程做最后一次刷新并关闭文件，等待其结束
    pub fn stop(mut self) -> Result<WriterStats, SearchError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<WriterStats, SearchError> {
        let _ = self.stop_tx.try_send(());

        let handle = self.handle.take().ok_or_else(|| SearchError::WriterFlush {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "写入线程未运行"),
        })?;

        handle.join().unwrap_or_else(|_| {
            Err(SearchError::WriterFlush {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "写入线程异常退出"),
            })
        })
    }
}

impl Drop for RunningWriter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// 写入线程的状态
struct DrainLoop<W> {
    writer: ResultWriter<W>,
    /// 已取出但尚未成功写入的记录
    pending: Vec<FileRecord>,
    stats: WriterStats,
}

impl<W: Write> DrainLoop<W> {
    fn run(
        mut self,
        records: Receiver<FileRecord>,
        stop: Receiver<()>,
        options: WriterOptions,
    ) -> Result<WriterStats, SearchError> {
        let ticker = tick(options.flush_interval);

        loop {
            select! {
                recv(ticker) -> _ => {
                    let _ = self.drain_pass(&records);
                }
                // 发送端被丢弃也视为停止
                recv(stop) -> _ => break,
            }
        }

        self.finish(&records, options)
    }

    /// 取出队列中的全部记录并写入文件
    fn drain_pass(&mut self, records: &Receiver<FileRecord>) -> std::io::Result<()> {
        self.pending.extend(records.try_iter());
        self.stats.drain_passes += 1;

        let before = self.stats.records_written;
        let result = self.write_pending();
        let written = self.stats.records_written - before;

        if self.writer.logger.is_enabled() && (written > 0 || result.is_err()) {
            let _ = self.writer.logger.log_event(&SearchEvent::Drained {
                written,
                pending: self.pending.len(),
                failed: result.is_err(),
            });
        }
        if let Err(err) = &result {
            self.stats.failed_passes += 1;
            let path = self.writer.path.to_string_lossy();
            let details = err.to_string();
            let _ = self.writer.errors.log_error(
                ErrorType::WriterFlush,
                Some(path.as_ref()),
                "刷新输出文件失败，将在下次重试",
                Some(details.as_str()),
            );
        }
        result
    }

    fn write_pending(&mut self) -> std::io::Result<()> {
        let mut written = 0;
        let mut result = Ok(());

        // 每行连同换行符一次写出，失败的记录留到下次完整重写
        for record in &self.pending {
            let mut line = record.to_csv_line();
            line.push('\n');
            if let Err(err) = self.writer.out.write_all(line.as_bytes()) {
                result = Err(err);
                break;
            }
            written += 1;
        }

        self.pending.drain(..written);
        self.stats.records_written += written as u64;
        result?;

        self.writer.out.flush()
    }

    /// 最后一次刷新，失败时按配置重试
    fn finish(
        mut self,
        records: &Receiver<FileRecord>,
        options: WriterOptions,
    ) -> Result<WriterStats, SearchError> {
        let mut attempt = 0;
        loop {
            match self.drain_pass(records) {
                Ok(()) => break,
                Err(source) if attempt >= options.final_flush_retries => {
                    return Err(SearchError::WriterFlush {
                        path: self.writer.path.clone(),
                        source,
                    });
                }
                Err(_) => {
                    attempt += 1;
                    thread::sleep(options.flush_interval);
                }
            }
        }

        if self.writer.logger.is_enabled() {
            let _ = self.writer.logger.log_event(&SearchEvent::WriterClosed {
                path: &self.writer.path,
                stats: &self.stats,
            });
        }

        Ok(self.stats)
    }
}
