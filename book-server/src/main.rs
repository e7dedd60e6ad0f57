use book_server::{Config, Server, print_banner, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 加载 .env 与配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 2. 初始化日志
    setup_environment(&config)?;

    print_banner();
    tracing::info!("📚 Book Server starting...");
    tracing::info!(
        environment = %config.environment,
        work_dir = %config.work_dir,
        port = config.http_port,
        "Configuration loaded"
    );

    // 3. 初始化状态并启动 HTTP 服务器，收到 SIGTERM / Ctrl+C 后优雅退出
    let server = Server::new(config);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
