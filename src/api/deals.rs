use super::extract::{ApiJson, ApiQuery, DealId};
use crate::auth::{AuthUser, ROLE_ADMIN, ROLE_MERCHANT};
use crate::error::{AppError, AppResult};
use crate::models::{
    Deal, DealFilter, DealSort, DealStatus, DealType, GroupBuyParticipant, NewDeal, PriceHistory,
    SortOrder,
};
use crate::services::deal_service::effective_limit;
use crate::services::DealDetail;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deals", get(list_deals).post(create_deal))
        .route("/deals/{id}", get(get_deal))
        .route("/deals/{id}/price-history", get(price_history))
        .route("/deals/{id}/join", post(join_group_buy))
        .route("/deals/{id}/status", patch(update_status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDealsQuery {
    #[serde(rename = "type")]
    pub deal_type: Option<DealType>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_discount: Option<Decimal>,
    pub sort_by: Option<DealSort>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ListDealsQuery> for DealFilter {
    fn from(q: ListDealsQuery) -> Self {
        DealFilter {
            deal_type: q.deal_type,
            category: q.category.filter(|c| !c.is_empty()),
            search: q.search.filter(|s| !s.trim().is_empty()),
            min_price: q.min_price,
            max_price: q.max_price,
            min_discount: q.min_discount,
            sort_by: q.sort_by.unwrap_or_default(),
            sort_order: q.sort_order.unwrap_or_default(),
            page: q.page.unwrap_or(1),
            limit: q.limit.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct DealListResponse {
    pub deals: Vec<Deal>,
    pub pagination: Pagination,
}

async fn list_deals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListDealsQuery>,
) -> AppResult<Json<DealListResponse>> {
    let filter = DealFilter::from(query);
    let requested_page = filter.page.max(1);
    let limit = effective_limit(filter.limit);

    let page = state.deals.list_deals(filter).await?;
    let pages = page.total.div_ceil(u64::from(limit));

    Ok(Json(DealListResponse {
        deals: page.deals,
        pagination: Pagination {
            page: requested_page,
            limit,
            total: page.total,
            pages,
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDealRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub original_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    #[serde(rename = "type")]
    pub deal_type: Option<DealType>,
    pub merchant_id: Option<Uuid>,
    pub target_participants: Option<i32>,
    pub cashback_amount: Option<Decimal>,
    pub cashback_percentage: Option<Decimal>,
    /// Hours from now until the deal ends
    pub duration: Option<i64>,
}

impl CreateDealRequest {
    fn into_new_deal(self) -> AppResult<NewDeal> {
        let required = |field: &str| AppError::Validation(format!("{} is required", field));

        let end_date = match self.duration {
            Some(hours) if hours > 0 => Some(Utc::now() + Duration::hours(hours)),
            Some(_) => {
                return Err(AppError::Validation(
                    "duration must be a positive number of hours".to_string(),
                ))
            }
            None => None,
        };

        Ok(NewDeal {
            merchant_id: self.merchant_id.ok_or_else(|| required("merchantId"))?,
            title: self.title,
            description: self.description,
            category: self.category,
            deal_type: self.deal_type.ok_or_else(|| required("type"))?,
            original_price: self.original_price.ok_or_else(|| required("originalPrice"))?,
            current_price: self.current_price.ok_or_else(|| required("currentPrice"))?,
            target_participants: self.target_participants,
            cashback_amount: self.cashback_amount,
            cashback_percentage: self.cashback_percentage,
            end_date,
        })
    }
}

async fn create_deal(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(request): ApiJson<CreateDealRequest>,
) -> AppResult<(StatusCode, Json<Deal>)> {
    let deal = state.deals.create_deal(request.into_new_deal()?).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn get_deal(
    State(state): State<AppState>,
    DealId(id): DealId,
) -> AppResult<Json<DealDetail>> {
    Ok(Json(state.deals.get_deal_detail(id).await?))
}

async fn price_history(
    State(state): State<AppState>,
    DealId(id): DealId,
) -> AppResult<Json<Vec<PriceHistory>>> {
    Ok(Json(state.group_buys.price_history(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    pub quantity: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub participant: GroupBuyParticipant,
    pub message: String,
}

/// The body is optional; an empty one joins with quantity 1
async fn join_group_buy(
    State(state): State<AppState>,
    user: AuthUser,
    DealId(id): DealId,
    body: Bytes,
) -> AppResult<Json<JoinResponse>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        JoinRequest::default()
    } else {
        serde_json::from_slice::<JoinRequest>(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
    };

    let outcome = state
        .group_buys
        .join_group_buy(user.user_id, id, request.quantity)
        .await?;

    Ok(Json(JoinResponse {
        participant: outcome.participant,
        message: outcome.message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DealStatus,
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    DealId(id): DealId,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> AppResult<Json<Deal>> {
    user.require_any_role(&[ROLE_ADMIN, ROLE_MERCHANT])?;
    Ok(Json(state.deals.update_status(id, request.status).await?))
}
