//! 应用启动器 - 负责装配与服务启动

use anyhow::{Context, Result};
use tracing::info;

use bazaar_core::config::AppConfig;

use crate::interface::http::build_router;
use crate::service::{sweep, wire};

pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(config: &'static AppConfig) -> Result<()> {
        let context = wire::initialize(config).await?;

        // 后台清扫与请求处理解耦
        let sweep_handle = sweep::spawn(
            context.presence.clone(),
            context.typing.clone(),
            context.config.sweep_interval_seconds,
        );

        let addr = format!("{}:{}", config.server.address, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, "starting bazaar chat service");

        let router = build_router(context.state.clone());
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("http server failed")?;

        sweep_handle.abort();
        info!("bazaar chat service stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
