//! Book Server - 个性化绘本订单流水线
//!
//! # 架构概述
//!
//! - **生成队列** (`generation`): 持久化状态机 + 有界并发 AI 生成
//! - **产物存储** (`artifacts`): 本地对象存储、HMAC 签名链接与刷新
//! - **订单监控** (`monitor`): 周期派发、超时回收、链接续期
//! - **订单** (`orders`): 下单与状态管理
//! - **HTTP API** (`api`): RESTful 接口
//!
//! # 模块结构
//!
//! ```text
//! book-server/src/
//! ├── core/          # 配置、状态、错误、服务器
//! ├── store/         # redb 存储层
//! ├── generation/    # 队列、执行器、AI provider
//! ├── artifacts/     # 产物存储与签名链接
//! ├── monitor/       # 订单监控
//! ├── orders/        # 订单服务
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志、校验
//! ```

pub mod api;
pub mod artifacts;
pub mod core;
pub mod generation;
pub mod monitor;
pub mod orders;
pub mod store;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use monitor::{MonitorStatus, OrderMonitor};
pub use store::BookStorage;
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger_with_file};

/// Days of rolled log files kept on startup
const LOG_RETENTION_DAYS: u64 = 14;

/// 按配置初始化日志并清理旧日志
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    init_logger_with_file(Some(config.log_level.as_str()), config.log_dir.as_deref());

    if let Some(dir) = config.log_dir.as_deref() {
        match cleanup_old_logs(dir, LOG_RETENTION_DAYS) {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "Old log files cleaned up"),
            Err(e) => tracing::warn!(error = %e, "Failed to clean up old logs"),
        }
    }
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
    ____              __
   / __ )____  ____  / /__
  / __  / __ \/ __ \/ //_/
 / /_/ / /_/ / /_/ / ,<
/_____/\____/\____/_/|_|
    "#
    );
}
