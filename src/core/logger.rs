use crate::models::config::{LogConfig, LogFormat, LogLevel, LogOutput};
use std::sync::OnceLock;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// 全局日志级别 reload handle
static LOG_LEVEL_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "conduit";

/// 初始化日志系统
///
/// 输出格式（JSON/纯文本）与输出目标（控制台/文件/both）由配置决定，
/// 只有日志级别可以在运行时通过 `update_log_level` 调整。
pub fn init_logger(config: &LogConfig) -> anyhow::Result<()> {
    let filter = create_env_filter(&config.level);
    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    if LOG_LEVEL_HANDLE.set(reload_handle).is_err() {
        anyhow::bail!("日志系统已初始化，不能重复初始化");
    }

    match (&config.output, &config.format) {
        (LogOutput::Console, LogFormat::Text) => {
            Registry::default()
                .with(filter_layer)
                .with(create_console_text_layer())
                .try_init()?;
        }
        (LogOutput::Console, LogFormat::Json) => {
            Registry::default()
                .with(filter_layer)
                .with(create_console_json_layer())
                .try_init()?;
        }
        (LogOutput::File, LogFormat::Text) => {
            let file_layer = create_file_layer(config.file_path.as_deref(), false)?;
            Registry::default()
                .with(filter_layer)
                .with(file_layer)
                .try_init()?;
        }
        (LogOutput::File, LogFormat::Json) => {
            let file_layer = create_file_layer(config.file_path.as_deref(), true)?;
            Registry::default()
                .with(filter_layer)
                .with(file_layer)
                .try_init()?;
        }
        (LogOutput::Both, LogFormat::Text) => {
            let file_layer = create_file_layer(config.file_path.as_deref(), false)?;
            Registry::default()
                .with(filter_layer)
                .with(create_console_text_layer())
                .with(file_layer)
                .try_init()?;
        }
        (LogOutput::Both, LogFormat::Json) => {
            let file_layer = create_file_layer(config.file_path.as_deref(), true)?;
            Registry::default()
                .with(filter_layer)
                .with(create_console_json_layer())
                .with(file_layer)
                .try_init()?;
        }
    }

    tracing::info!(
        level = config.level.as_str(),
        format = ?config.format,
        output = ?config.output,
        file_path = ?config.file_path,
        "日志系统初始化完成"
    );

    Ok(())
}

/// 创建环境过滤器
///
/// `RUST_LOG` 优先，例如 `RUST_LOG=conduit=trace,rusqlite=debug`。
fn create_env_filter(level: &LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level))
}

fn default_filter(level: &LogLevel) -> EnvFilter {
    EnvFilter::new(filter_directives(level))
}

fn filter_directives(level: &LogLevel) -> String {
    format!(
        "{}={},hyper=warn,hyper_util=warn,tokio=warn,rusqlite=warn",
        LOG_FILE_PREFIX,
        level.as_str()
    )
}

fn create_console_text_layer<S>() -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(cfg!(debug_assertions))
        .with_thread_ids(false)
        .with_ansi(true)
        .with_span_events(if cfg!(debug_assertions) {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .boxed()
}

fn create_console_json_layer<S>() -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_current_span(true)
        .boxed()
}

/// 文件输出层（按天滚动，非阻塞写入）
fn create_file_layer<S>(
    file_path: Option<&str>,
    json: bool,
) -> anyhow::Result<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let log_dir = get_log_dir(file_path)?;
    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = non_blocking(file_appender);

    // guard 必须存活到进程退出，否则缓冲区中的日志会丢失
    Box::leak(Box::new(guard));

    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false);

    Ok(if json {
        layer.json().with_thread_ids(true).boxed()
    } else {
        layer.with_thread_ids(false).boxed()
    })
}

/// 获取日志目录，未配置时使用 `~/.conduit/logs`
fn get_log_dir(file_path: Option<&str>) -> anyhow::Result<std::path::PathBuf> {
    let dir = match file_path {
        Some(path) => std::path::PathBuf::from(path),
        None => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("无法获取用户主目录"))?
            .join(".conduit")
            .join("logs"),
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// 动态更新日志级别（热重载）
///
/// 格式和输出目标的变更仍需要重启进程。
pub fn update_log_level(new_level: LogLevel) -> anyhow::Result<()> {
    let handle = LOG_LEVEL_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("日志系统未初始化"))?;

    handle
        .reload(create_env_filter(&new_level))
        .map_err(|e| anyhow::anyhow!("重载日志级别失败: {}", e))?;

    tracing::info!(new_level = new_level.as_str(), "日志级别已动态更新");
    Ok(())
}
