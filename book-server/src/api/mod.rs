//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`pipeline`] - 图片 / 封面 / 整书生成、书籍分析
//! - [`artifacts`] - 签名链接签发、刷新与下载
//! - [`monitor`] - 订单监控控制
//! - [`orders`] - 订单管理接口
//! - [`generation`] - 生成队列查询与重试
//! - [`pdf`] - PDF 文件管理

pub mod artifacts;
pub mod generation;
pub mod health;
pub mod monitor;
pub mod orders;
pub mod pdf;
pub mod pipeline;

// Re-export common types for handlers
pub use crate::utils::{ApiResponse, AppResult};
