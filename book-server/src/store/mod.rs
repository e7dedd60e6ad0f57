//! 持久化层 - redb 嵌入式数据库
//!
//! 订单、订单项和生成队列共用一个数据库文件
//! (`{work_dir}/database/books.redb`)，保证队列状态与订单项镜像字段
//! 在同一个写事务中提交。

mod storage;

pub use storage::{BookStorage, StorageError, StorageResult};

/// 数据库文件名
pub const DATABASE_FILE: &str = "books.redb";
