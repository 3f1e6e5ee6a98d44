//! Operator identity endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::client::OperatorProfile;
use crate::error::ApiResult;
use crate::AppState;

/// GET /operator
pub async fn current_operator(State(state): State<AppState>) -> ApiResult<Json<OperatorProfile>> {
    Ok(Json(state.identity.current().await?))
}

pub fn operator_routes() -> Router<AppState> {
    Router::new().route("/operator", get(current_operator))
}
