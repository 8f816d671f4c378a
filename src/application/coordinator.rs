use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::application::Config;
use crate::domain::template;
use crate::domain::{
    CancelToken, DirectoryWalker, FileRecord, FilterSet, ProgressSnapshot, SearchOutcome,
    SearchRequest, WalkOptions, WalkStats,
};
use crate::infrastructure::{
    ErrorLogger, LoggerTrait, ResultWriter, SearchEvent, WriterOptions, WriterStats,
};

/// 遍历线程的栈大小，深层目录递归需要更大的栈
const WALKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// 进度通知的接收方
///
/// 通知在遍历线程上发出，调用方需要自行处理线程切换。
pub trait ProgressSink: Sync {
    fn publish(&self, snapshot: ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressSnapshot) + Sync,
{
    fn publish(&self, snapshot: ProgressSnapshot) {
        self(snapshot)
    }
}

/// 通过通道转发进度，接收端由调用方持有
#[derive(Debug, Clone)]
pub struct ProgressChannel(Sender<ProgressSnapshot>);

impl ProgressChannel {
    pub fn new() -> (Self, Receiver<ProgressSnapshot>) {
        let (tx, rx) = unbounded();
        (Self(tx), rx)
    }
}

impl ProgressSink for ProgressChannel {
    fn publish(&self, snapshot: ProgressSnapshot) {
        // 接收端已关闭时丢弃通知即可
        let _ = self.0.send(snapshot);
    }
}

/// 一次搜索的完整报告
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    /// 解析后的输出文件路径
    pub output_path: Option<PathBuf>,
    pub walk: WalkStats,
    pub writer: WriterStats,
    /// 匹配文件的总大小
    pub matched_bytes: u64,
    pub elapsed: Duration,
}

impl SearchReport {
    fn failed(reason: String, output_path: Option<PathBuf>, started: Instant) -> Self {
        Self {
            outcome: SearchOutcome::Failed(reason),
            output_path,
            walk: WalkStats::default(),
            writer: WriterStats::default(),
            matched_bytes: 0,
            elapsed: started.elapsed(),
        }
    }
}

/// 搜索协调器：并发运行目录遍历和结果写入，负责取消与进度汇总
pub struct SearchCoordinator {
    walk_options: WalkOptions,
    writer_options: WriterOptions,
    logger: Arc<dyn LoggerTrait>,
    errors: Arc<ErrorLogger>,
    /// 正在进行的搜索的取消标记
    active: Mutex<Option<CancelToken>>,
}

impl SearchCoordinator {
    pub fn new(
        walk_options: WalkOptions,
        writer_options: WriterOptions,
        logger: Arc<dyn LoggerTrait>,
        errors: Arc<ErrorLogger>,
    ) -> Self {
        Self {
            walk_options,
            writer_options,
            logger,
            errors,
            active: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config, logger: Arc<dyn LoggerTrait>, errors: Arc<ErrorLogger>) -> Self {
        Self::new(config.walk_options(), config.writer_options(), logger, errors)
    }

    /// 执行搜索并返回最终结果
    pub fn start<P>(&self, request: &SearchRequest, progress: &P) -> SearchOutcome
    where
        P: ProgressSink + ?Sized,
    {
        self.run(request, progress).outcome
    }

    /// 执行搜索并返回完整报告
    pub fn run<P>(&self, request: &SearchRequest, progress: &P) -> SearchReport
    where
        P: ProgressSink + ?Sized,
    {
        let started = Instant::now();

        let Some(cancel) = self.begin() else {
            return SearchReport::failed("已有搜索正在进行".to_string(), None, started);
        };

        let report = self.execute(request, progress, &cancel, started);
        self.end();

        if self.logger.is_enabled() {
            let _ = self.logger.log_message(&format!("搜索结束: {}", report.outcome));
            let _ = self.logger.finalize(&report.outcome, &report.walk, &report.writer, report.elapsed);
        }

        report
    }

    /// 请求取消当前搜索，没有搜索在进行时不做任何事
    pub fn cancel(&self) {
        if let Some(token) = self.active.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            token.cancel();
            if self.logger.is_enabled() {
                let _ = self.logger.log_event(&SearchEvent::CancelRequested);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn begin(&self) -> Option<CancelToken> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return None;
        }
        let token = CancelToken::new();
        *active = Some(token.clone());
        Some(token)
    }

    fn end(&self) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn execute<P>(
        &self,
        request: &SearchRequest,
        progress: &P,
        cancel: &CancelToken,
        started: Instant,
    ) -> SearchReport
    where
        P: ProgressSink + ?Sized,
    {
        let output_path = PathBuf::from(template::resolve(request.output_template(), &Local::now()));

        if self.logger.is_enabled() {
            let _ = self.logger.log_event(&SearchEvent::Started {
                root: request.root_path(),
                filters: request.filters(),
                output: &output_path,
            });
        }

        let writer = match ResultWriter::open(&output_path, Arc::clone(&self.logger), Arc::clone(&self.errors)) {
            Ok(writer) => writer,
            Err(err) => return SearchReport::failed(err.to_string(), Some(output_path), started),
        };
        let running = writer.start(self.writer_options);
        let sink = running.sink();

        let filters = FilterSet::new(request.filters());
        let walker = DirectoryWalker::new(self.walk_options, Arc::clone(&self.logger), Arc::clone(&self.errors));
        let matched = AtomicU64::new(0);
        let scanned = AtomicU64::new(0);
        let matched_bytes = AtomicU64::new(0);

        let on_match = |record: FileRecord| {
            let matched_count = matched.fetch_add(1, Ordering::Relaxed) + 1;
            matched_bytes.fetch_add(record.size_bytes, Ordering::Relaxed);
            let snapshot = ProgressSnapshot {
                matched_count,
                total_scanned_count: scanned.load(Ordering::Relaxed),
                last_match: Some(record.clone()),
            };
            sink.enqueue(record);
            progress.publish(snapshot);
        };
        let on_scanned = || {
            scanned.fetch_add(1, Ordering::Relaxed);
        };

        let walk_result = thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name("directory-walker".to_string())
                .stack_size(WALKER_STACK_SIZE)
                .spawn_scoped(scope, || {
                    walker.walk(request.root_path(), &filters, on_match, on_scanned, cancel)
                });

            match spawned {
                Ok(handle) => handle.join().map_err(|_| "遍历线程异常退出".to_string()),
                Err(err) => Err(format!("无法启动遍历线程: {}", err)),
            }
        });

        drop(sink);
        let writer_result = running.stop();

        let walk = walk_result.as_ref().copied().unwrap_or_default();
        let (outcome, writer) = match (walk_result, writer_result) {
            (Err(reason), writer_result) => (SearchOutcome::Failed(reason), writer_result.unwrap_or_default()),
            (Ok(_), Err(err)) => (SearchOutcome::Failed(err.to_string()), WriterStats::default()),
            (Ok(stats), Ok(writer)) if stats.cancelled => (SearchOutcome::Cancelled, writer),
            (Ok(_), Ok(writer)) => (SearchOutcome::Completed, writer),
        };

        SearchReport {
            outcome,
            output_path: Some(output_path),
            walk,
            writer,
            matched_bytes: matched_bytes.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        }
    }
}
