// Conduit 网关入口
//
// 配置文件路径依次取自命令行第一个参数、CONDUIT_CONFIG 环境变量、./conduit.toml。
// Unix 下收到 SIGHUP 时重新读取配置中的日志级别。

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use conduit::{init_logger, ConduitConfig, ConduitServer, ConduitService};

const DEFAULT_CONFIG_PATH: &str = "conduit.toml";

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONDUIT_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path();
    let config = ConduitConfig::load(&path)
        .with_context(|| format!("加载配置失败: {}", path.display()))?;

    init_logger(&config.logging)?;
    tracing::info!(config = %path.display(), "配置已加载");

    let service = Arc::new(ConduitService::from_config(&config)?);
    let server = ConduitServer::new(config.server.clone(), service);
    let addr = server.start().await?;
    tracing::info!(%addr, "等待请求");

    #[cfg(unix)]
    tokio::spawn(watch_reload(path.clone()));

    tokio::signal::ctrl_c().await.context("监听退出信号失败")?;
    tracing::info!("收到退出信号");
    server.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn watch_reload(path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = ?e, "无法监听 SIGHUP，日志级别热重载不可用");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        let level = match ConduitConfig::load(&path) {
            Ok(config) => config.logging.level,
            Err(e) => {
                tracing::error!(error = %e, "重新加载配置失败");
                continue;
            }
        };
        match conduit::update_log_level(level) {
            Ok(()) => tracing::info!(level = level.as_str(), "日志级别已更新"),
            Err(e) => tracing::error!(error = ?e, "更新日志级别失败"),
        }
    }
}
