use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::{DirEntry, WalkBuilder};

use crate::domain::pattern::FilterSet;
use crate::domain::record::FileRecord;
use crate::infrastructure::{ErrorLogger, ErrorType, LoggerTrait, SearchEvent};

/// 协作式取消标记，一旦取消无法恢复
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 遍历选项
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// 是否遵循 .gitignore 规则，默认搜索所有文件
    pub respect_gitignore: bool,
    /// 是否跟随符号链接
    pub follow_links: bool,
}

/// 一次遍历的统计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub scanned: u64,
    pub matched: u64,
    pub skipped_entries: u64,
    pub skipped_dirs: u64,
    pub cancelled: bool,
}

impl WalkStats {
    fn absorb(&mut self, other: WalkStats) {
        self.scanned += other.scanned;
        self.matched += other.matched;
        self.skipped_entries += other.skipped_entries;
        self.skipped_dirs += other.skipped_dirs;
        self.cancelled |= other.cancelled;
    }
}

/// 一个目录下的直接子项
#[derive(Default)]
struct Listing {
    dirs: Vec<PathBuf>,
    files: Vec<DirEntry>,
}

/// 深度优先的目录遍历器
pub struct DirectoryWalker {
    options: WalkOptions,
    logger: Arc<dyn LoggerTrait>,
    errors: Arc<ErrorLogger>,
}

impl DirectoryWalker {
    pub fn new(options: WalkOptions, logger: Arc<dyn LoggerTrait>, errors: Arc<ErrorLogger>) -> Self {
        Self {
            options,
            logger,
            errors,
        }
    }

    /// 遍历目录树
    ///
    /// 每个目录先递归进入所有子目录，再处理本目录下的文件。每个文件都会调用一次
    /// `on_scanned`，匹配的文件再调用 `on_match`。单个文件或目录的访问错误只会跳过
    /// 该项，不会中断整个遍历。
    pub fn walk<M, S>(
        &self,
        root: &Path,
        filters: &FilterSet,
        mut on_match: M,
        mut on_scanned: S,
        cancel: &CancelToken,
    ) -> WalkStats
    where
        M: FnMut(FileRecord),
        S: FnMut(),
    {
        if self.logger.is_enabled() {
            let _ = self.logger.log_message(&format!("开始扫描目录: {}", root.display()));
        }

        // 跟随符号链接时记录祖先目录的真实路径，用于识别指回上层的链接
        let mut ancestors = Vec::new();
        if self.options.follow_links {
            if let Ok(real) = fs::canonicalize(root) {
                ancestors.push(real);
            }
        }

        let stats = self.walk_dir(root, filters, &mut on_match, &mut on_scanned, cancel, &mut ancestors);

        if self.logger.is_enabled() {
            let _ = self.logger.log_message(&format!(
                "扫描结束: 扫描 {} 文件, 匹配 {} 文件, 跳过 {} 项 / {} 目录{}",
                stats.scanned,
                stats.matched,
                stats.skipped_entries,
                stats.skipped_dirs,
                if stats.cancelled { " (已取消)" } else { "" }
            ));
        }

        stats
    }

    fn walk_dir<M, S>(
        &self,
        dir: &Path,
        filters: &FilterSet,
        on_match: &mut M,
        on_scanned: &mut S,
        cancel: &CancelToken,
        ancestors: &mut Vec<PathBuf>,
    ) -> WalkStats
    where
        M: FnMut(FileRecord),
        S: FnMut(),
    {
        let mut stats = WalkStats::default();

        let listing = match self.read_children(dir, &mut stats) {
            Some(listing) => listing,
            None => return stats,
        };

        for subdir in &listing.dirs {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return stats;
            }

            let entered = if self.options.follow_links {
                match fs::canonicalize(subdir) {
                    Ok(real) if ancestors.contains(&real) => {
                        stats.skipped_entries += 1;
                        let reason = format!("符号链接循环，指向上层目录 {}", real.display());
                        self.record_error(ErrorType::EntryAccess, subdir, &reason);
                        continue;
                    }
                    Ok(real) => {
                        ancestors.push(real);
                        true
                    }
                    Err(err) => {
                        stats.skipped_entries += 1;
                        self.record_error(ErrorType::EntryAccess, subdir, &err);
                        continue;
                    }
                }
            } else {
                false
            };

            stats.absorb(self.walk_dir(subdir, filters, on_match, on_scanned, cancel, ancestors));
            if entered {
                ancestors.pop();
            }
            if stats.cancelled {
                return stats;
            }
        }

        for entry in listing.files {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return stats;
            }

            stats.scanned += 1;
            on_scanned();

            let name = entry.file_name().to_string_lossy().into_owned();
            if !filters.matches(&name) {
                continue;
            }

            match self.build_record(name, &entry) {
                Some(record) => {
                    stats.matched += 1;
                    if self.logger.is_enabled() {
                        let _ = self.logger.log_event(&SearchEvent::Matched(&record));
                    }
                    on_match(record);
                }
                None => stats.skipped_entries += 1,
            }
        }

        stats
    }

    /// 列出目录的直接子项，目录本身无法读取时返回 None
    fn read_children(&self, dir: &Path, stats: &mut WalkStats) -> Option<Listing> {
        let respect = self.options.respect_gitignore;
        let mut builder = WalkBuilder::new(dir);
        builder
            .max_depth(Some(1))
            .hidden(false)
            .parents(respect)
            .ignore(respect)
            .git_ignore(respect)
            .git_global(respect)
            .git_exclude(respect)
            .follow_links(self.options.follow_links);

        let mut listing = Listing::default();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    if error_path(&err) == Some(dir) {
                        stats.skipped_dirs += 1;
                        self.record_error(ErrorType::DirectoryAccess, dir, &err);
                        return None;
                    }
                    stats.skipped_entries += 1;
                    let path = error_path(&err).unwrap_or(dir).to_path_buf();
                    self.record_error(ErrorType::EntryAccess, &path, &err);
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            match entry.file_type() {
                Some(ft) if ft.is_dir() => listing.dirs.push(entry.into_path()),
                Some(ft) if ft.is_file() => listing.files.push(entry),
                _ => {}
            }
        }

        Some(listing)
    }

    fn build_record(&self, name: String, entry: &DirEntry) -> Option<FileRecord> {
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                self.record_error(ErrorType::EntryAccess, entry.path(), &err);
                return None;
            }
        };

        match FileRecord::from_metadata(name, entry.path().to_path_buf(), &metadata) {
            Ok(record) => Some(record),
            Err(err) => {
                self.record_error(ErrorType::EntryAccess, entry.path(), &err);
                None
            }
        }
    }

    fn record_error(&self, error_type: ErrorType, path: &Path, err: &dyn std::fmt::Display) {
        let details = err.to_string();
        let _ = self.errors.log_error(
            error_type.clone(),
            Some(path.to_string_lossy().as_ref()),
            error_type.as_str(),
            Some(details.as_str()),
        );
        if self.logger.is_enabled() {
            let _ = self.logger.log_event(&SearchEvent::Skipped {
                path,
                reason: &details,
            });
        }
    }
}

/// 取出遍历错误所关联的路径
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => error_path(err),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::Logger;
    use tempfile::tempdir;

    fn walker() -> DirectoryWalker {
        DirectoryWalker::new(
            WalkOptions::default(),
            Arc::new(Logger::new(false).unwrap()),
            Arc::new(ErrorLogger::new(false).unwrap()),
        )
    }

    fn collect(root: &Path, filters: &[&str], cancel: &CancelToken) -> (Vec<FileRecord>, u64, WalkStats) {
        let mut matched = Vec::new();
        let mut scanned = 0u64;
        let stats = walker().walk(
            root,
            &FilterSet::new(filters),
            |record| matched.push(record),
            || scanned += 1,
            cancel,
        );
        (matched, scanned, stats)
    }

    #[test]
    fn test_walk_matches_by_filter() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        fs::write(temp_dir.path().join("b.TXT"), b"bb").unwrap();
        fs::write(temp_dir.path().join("c.csv"), b"ccc").unwrap();

        let (matched, scanned, stats) = collect(temp_dir.path(), &["*.txt"], &CancelToken::new());
        let mut names: Vec<_> = matched.iter().map(|r| r.name.clone()).collect();
        names.sort();

        assert_eq!(names, vec!["a.txt", "b.TXT"]);
        assert_eq!(scanned, 3);
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.matched, 2);
        assert!(!stats.cancelled);
    }

    #[test]
    fn test_walk_visits_subdirectories_before_files() {
        let temp_dir = tempdir().unwrap();
        let nested = temp_dir.path().join("sub").join("deeper");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("top.log"), b"1").unwrap();
        fs::write(temp_dir.path().join("sub").join("mid.log"), b"2").unwrap();
        fs::write(nested.join("bottom.log"), b"3").unwrap();

        let (matched, _, stats) = collect(temp_dir.path(), &[], &CancelToken::new());
        let names: Vec<_> = matched.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, vec!["bottom.log", "mid.log", "top.log"]);
        assert_eq!(stats.matched, 3);
        assert_eq!(matched[0].size_bytes, 1);
        assert_eq!(matched[0].full_path, nested.join("bottom.log"));
    }

    #[test]
    fn test_hidden_files_are_included() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(".hidden"), b"h").unwrap();

        let (matched, _, _) = collect(temp_dir.path(), &[], &CancelToken::new());
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_cancelled_walk_stops_immediately() {
        let temp_dir = tempdir().unwrap();
        for i in 0..20 {
            fs::write(temp_dir.path().join(format!("f{}.txt", i)), b"x").unwrap();
        }

        let cancel = CancelToken::new();
        cancel.cancel();
        let (matched, scanned, stats) = collect(temp_dir.path(), &[], &cancel);

        assert!(matched.is_empty());
        assert_eq!(scanned, 0);
        assert!(stats.cancelled);
    }

    #[test]
    fn test_cancel_during_walk_unwinds() {
        let temp_dir = tempdir().unwrap();
        for d in 0..5 {
            let dir = temp_dir.path().join(format!("d{}", d));
            fs::create_dir(&dir).unwrap();
            for i in 0..10 {
                fs::write(dir.join(format!("f{}.txt", i)), b"x").unwrap();
            }
        }

        let cancel = CancelToken::new();
        let mut matched = 0u64;
        let stats = walker().walk(
            temp_dir.path(),
            &FilterSet::default(),
            |_| {
                matched += 1;
                if matched == 3 {
                    cancel.cancel();
                }
            },
            || {},
            &cancel,
        );

        assert!(stats.cancelled);
        assert_eq!(stats.matched, 3);
        assert_eq!(stats.scanned, 3);
    }

    #[test]
    fn test_missing_root_is_skipped_not_fatal() {
        let temp_dir = tempdir().unwrap();
        let errors = Arc::new(ErrorLogger::new(false).unwrap());
        let walker = DirectoryWalker::new(
            WalkOptions::default(),
            Arc::new(Logger::new(false).unwrap()),
            Arc::clone(&errors),
        );

        let stats = walker.walk(
            &temp_dir.path().join("gone"),
            &FilterSet::default(),
            |_| {},
            || {},
            &CancelToken::new(),
        );

        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.skipped_dirs, 1);
        assert_eq!(errors.get_total_errors(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("inner.txt"), b"secret").unwrap();
        fs::write(temp_dir.path().join("x.log"), b"log").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let (matched, _, stats) = collect(temp_dir.path(), &["*.log"], &CancelToken::new());

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "x.log");
        assert!(!stats.cancelled);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_back_to_ancestor_is_not_reentered() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(root.join("only.txt"), b"1").unwrap();
        symlink(root, sub.join("up")).unwrap();
        symlink(root, sub.join("up2")).unwrap();

        let errors = Arc::new(ErrorLogger::new(false).unwrap());
        let walker = DirectoryWalker::new(
            WalkOptions {
                respect_gitignore: false,
                follow_links: true,
            },
            Arc::new(Logger::new(false).unwrap()),
            Arc::clone(&errors),
        );

        let mut matched = Vec::new();
        let stats = walker.walk(
            root,
            &FilterSet::default(),
            |record| matched.push(record),
            || {},
            &CancelToken::new(),
        );

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].full_path, root.join("only.txt"));
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.skipped_entries, 2);
        assert_eq!(errors.count_of(&ErrorType::EntryAccess), 2);
        assert!(!stats.cancelled);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_sibling_is_followed() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("data")).unwrap();
        fs::create_dir(root.join("view")).unwrap();
        fs::write(root.join("data").join("a.log"), b"a").unwrap();
        symlink(root.join("data"), root.join("view").join("linked")).unwrap();

        let walker = DirectoryWalker::new(
            WalkOptions {
                respect_gitignore: false,
                follow_links: true,
            },
            Arc::new(Logger::new(false).unwrap()),
            Arc::new(ErrorLogger::new(false).unwrap()),
        );

        let mut matched = Vec::new();
        let stats = walker.walk(root, &FilterSet::new(&["*.log"]), |r| matched.push(r), || {}, &CancelToken::new());

        assert_eq!(matched.len(), 2);
        assert_eq!(stats.skipped_entries, 0);
    }

    #[test]
    fn test_cancel_token_is_monotonic() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
