//! 设备轮询采集进程：点表 + 设备配置 → 调度器 → Sample 管线，附带状态/健康检查 HTTP。

mod collector;
mod response;
mod routes;
mod writer;

use ems_config::AppConfig;
use ems_poller::Scheduler;
use ems_telemetry::init_tracing;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    scheduler: Scheduler,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 点表 → 设备 → 调度器 + Sample 消费
    let collector = collector::start(&config).await?;
    let state = AppState {
        scheduler: collector.scheduler(),
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "ems.collector", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    collector.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(target: "ems.collector", "shutdown_requested");
    }
}
