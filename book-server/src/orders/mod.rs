//! 订单模块 - 下单、查询与状态管理
//!
//! 下单时为每个个性化订单项在同一事务内创建生成队列条目。

mod service;

pub use service::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OrderError, OrderResult, OrderService};
