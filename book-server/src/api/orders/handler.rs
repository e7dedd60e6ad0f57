//! Order API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::models::{NewOrder, Order, OrderDetail, OrderStatus, PaymentStatus};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult, ok};

/// Query params for listing orders
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusUpdate {
    pub payment_status: PaymentStatus,
}

/// Create an order
pub async fn create(
    State(state): State<ServerState>,
    Json(input): Json<NewOrder>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let detail = state.orders.create_order(input)?;
    Ok(ok(detail))
}

/// List orders (paginated, newest first)
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<Order>>>> {
    let orders = state.orders.list_orders(query.limit, query.offset)?;
    Ok(ok(orders))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let detail = state.orders.present_order(&id).await?;
    Ok(ok(detail))
}

pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.orders.update_order_status(&id, body.status)?;
    Ok(ok(order))
}

pub async fn update_payment_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(body): Json<PaymentStatusUpdate>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.orders.update_payment_status(&id, body.payment_status)?;
    Ok(ok(order))
}
