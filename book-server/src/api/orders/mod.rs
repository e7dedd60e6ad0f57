//! Order API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/orders | POST | 下单 (个性化订单项自动入队) |
//! | /api/orders | GET | 订单列表 (?limit=&offset=) |
//! | /api/orders/{id} | GET | 订单详情 (读取前刷新过期链接) |
//! | /api/orders/{id}/status | PUT | 更新订单状态 |
//! | /api/orders/{id}/payment-status | PUT | 更新支付状态 |

mod handler;

use axum::{
    Router,
    routing::{get, put},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/status", put(handler::update_status))
        .route("/{id}/payment-status", put(handler::update_payment_status))
}
