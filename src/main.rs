use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use file_report::domain::parse_filter_list;
use file_report::{
    Config, ErrorLogger, Logger, LoggerTrait, ProgressDisplay, SearchCoordinator, SearchOutcome,
    SearchRequest, SearchSummary,
};

/// 按文件名查找文件并导出为 CSV 报告
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// 要搜索的目录路径 (默认使用配置文件中的路径)
    path: Option<PathBuf>,

    /// 输出文件路径，可以包含日期标记，例如 "report_{yyyy-MM-dd}.csv"
    #[clap(short, long)]
    output: Option<String>,

    /// 文件名过滤条件，多个条件用分号分隔，例如 "*.txt;*.log"
    #[clap(short, long)]
    filters: Option<String>,

    /// 配置文件路径 (默认为程序同级目录下的 file_report.toml)
    #[clap(long)]
    config: Option<PathBuf>,

    /// 将本次使用的参数保存到配置文件
    #[clap(long)]
    save_config: bool,

    /// 启用详细日志记录
    #[clap(long)]
    log: bool,

    /// 遵循 .gitignore 规则，默认情况下会搜索所有文件
    #[clap(long)]
    respect_gitignore: bool,

    /// 跟随符号链接
    #[clap(long)]
    follow_links: bool,

    /// 不显示进度和摘要
    #[clap(short, long)]
    quiet: bool,
}

/// 命令行参数覆盖配置文件中的值
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(path) = &args.path {
        config.search.root_path = path.to_string_lossy().into_owned();
    }
    if let Some(output) = &args.output {
        config.search.output_template = output.clone();
    }
    if let Some(filters) = &args.filters {
        config.search.filters = parse_filter_list(filters);
    }
    if args.log {
        config.logging.enabled = true;
    }
    if args.respect_gitignore {
        config.walk.respect_gitignore = true;
    }
    if args.follow_links {
        config.walk.follow_links = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let mut config = Config::load_or_create(&config_path)?;
    apply_args(&mut config, &args);
    config.validate().context("配置无效")?;

    if args.save_config {
        config.save_to_file(&config_path)?;
        println!("配置已保存到: {}", config_path.display());
    }

    let request = SearchRequest::new(
        &config.search.root_path,
        config.search.output_template.clone(),
        config.search.filters.clone(),
    )
    .context("搜索参数无效")?;

    // 初始化日志记录器
    let log_dir = PathBuf::from(&config.logging.log_dir);
    let logger = Arc::new(Logger::in_dir(config.logging.enabled, &log_dir)?);
    let errors = Arc::new(ErrorLogger::in_dir(config.logging.enabled, &log_dir)?);

    let coordinator = Arc::new(SearchCoordinator::from_config(
        &config,
        logger.clone(),
        errors.clone(),
    ));

    // Ctrl+C 只请求取消，已找到的结果仍会写入文件
    let handler_coordinator = Arc::clone(&coordinator);
    ctrlc::set_handler(move || handler_coordinator.cancel())
        .context("无法注册 Ctrl+C 处理函数")?;

    if !args.quiet {
        println!("在 {} 中搜索", request.root_path().display());
        if request.filters().is_empty() {
            println!("过滤条件: (全部文件)");
        } else {
            println!("过滤条件: {}", request.filters().join(";"));
        }
        println!("输出模板: {}", request.output_template());
        println!("遵循 .gitignore 规则: {}", config.walk.respect_gitignore);
        println!("启用日志记录: {}", config.logging.enabled);
        println!();
    }

    let display = ProgressDisplay::new(args.quiet);
    let report = coordinator.run(&request, &display);
    display.finish(&report.outcome);

    errors.finalize()?;

    if !args.quiet {
        SearchSummary::from_report(&report).print(report.output_path.as_deref())?;
        errors.print_error_summary();
    }
    if logger.is_enabled() {
        println!("完整日志已保存到: {}", logger.log_path().display());
    }

    let exit_code = match &report.outcome {
        SearchOutcome::Completed => 0,
        SearchOutcome::Cancelled => 130,
        SearchOutcome::Failed(reason) => {
            eprintln!("搜索失败: {}", reason);
            1
        }
    };
    std::process::exit(exit_code);
}
