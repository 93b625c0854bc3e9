use crate::application::{
    ApplyCouponRequest, CallbackKind, CallbackQuery, ChallengeOutcome, CheckoutService,
    CheckoutView, ContactPhoneRequest, ErrorResponse, OtpRequest, Reconciliation,
    SelectPaymentRequest, SubmitOutcome, SubmitResponse, UpdateFulfillmentRequest,
};
use crate::domain::errors::CheckoutError;
use crate::domain::CheckoutPhase;
use crate::ports::{CartServicePort, OrderServicePort, PendingOrderStorePort};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application state
pub struct AppState<C, O, S>
where
    C: CartServicePort,
    O: OrderServicePort,
    S: PendingOrderStorePort,
{
    pub checkout: Arc<CheckoutService<C, O, S>>,
}

impl<C, O, S> Clone for AppState<C, O, S>
where
    C: CartServicePort,
    O: OrderServicePort,
    S: PendingOrderStorePort,
{
    fn clone(&self) -> Self {
        Self {
            checkout: self.checkout.clone(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(error: &CheckoutError) -> StatusCode {
    match error {
        CheckoutError::Validation(_)
        | CheckoutError::InvalidCoupon(_)
        | CheckoutError::Challenge(_) => StatusCode::BAD_REQUEST,
        CheckoutError::StaleCart
        | CheckoutError::SubmissionInProgress
        | CheckoutError::InvalidPhase(_) => StatusCode::CONFLICT,
        CheckoutError::ContractViolation { .. }
        | CheckoutError::Submission(_)
        | CheckoutError::Calculation(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: CheckoutError) -> ApiError {
    let status = status_for(&e);
    if e.is_fault() {
        error!("Checkout fault: {}", e);
    } else {
        warn!("Checkout request failed: {}", e);
    }
    (status, Json(ErrorResponse::from(&e)))
}

fn view_response(view: CheckoutView) -> axum::response::Response {
    (StatusCode::OK, Json(view)).into_response()
}

/// Enter checkout
pub async fn start_checkout<C, O, S>(
    State(state): State<AppState<C, O, S>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    info!("Received checkout start request");

    state.checkout.start().await.map(view_response).map_err(api_error)
}

/// Current checkout view
pub async fn get_checkout<C, O, S>(State(state): State<AppState<C, O, S>>) -> impl IntoResponse
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    view_response(state.checkout.view())
}

/// Set mode, destination and schedule; reprices
pub async fn update_fulfillment<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Json(request): Json<UpdateFulfillmentRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    state
        .checkout
        .update_fulfillment(request.into())
        .await
        .map_err(api_error)?;
    Ok(view_response(state.checkout.view()))
}

pub async fn select_payment<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Json(request): Json<SelectPaymentRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    state
        .checkout
        .select_payment_method(request.method_id, request.instrument)
        .map_err(api_error)?;
    Ok(view_response(state.checkout.view()))
}

pub async fn set_contact_phone<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Json(request): Json<ContactPhoneRequest>,
) -> impl IntoResponse
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    state.checkout.set_contact_phone(request.phone);
    view_response(state.checkout.view())
}

pub async fn apply_coupon<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    state
        .checkout
        .apply_coupon(&request.code)
        .await
        .map_err(api_error)?;
    Ok(view_response(state.checkout.view()))
}

pub async fn remove_coupon<C, O, S>(
    State(state): State<AppState<C, O, S>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    state.checkout.remove_coupon().await.map_err(api_error)?;
    Ok(view_response(state.checkout.view()))
}

/// Place the order
pub async fn submit_order<C, O, S>(
    State(state): State<AppState<C, O, S>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    info!("Received order submission");

    let outcome = state.checkout.submit().await.map_err(api_error)?;
    let view = state.checkout.view();
    let response = match outcome {
        SubmitOutcome::Settled { order_id } => SubmitResponse {
            phase: view.phase,
            order_id,
            redirect_url: None,
            challenge: None,
        },
        SubmitOutcome::AwaitingRedirect { order_id, url } => SubmitResponse {
            phase: view.phase,
            order_id,
            redirect_url: Some(url),
            challenge: None,
        },
        SubmitOutcome::AwaitingChallenge { order_id, .. } => SubmitResponse {
            phase: view.phase,
            order_id,
            redirect_url: None,
            challenge: view.challenge,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Submit the one-time code
pub async fn submit_otp<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Json(request): Json<OtpRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    let response = match state
        .checkout
        .submit_challenge_code(&request.code)
        .await
        .map_err(api_error)?
    {
        ChallengeOutcome::Verified { order_id } => SubmitResponse {
            phase: CheckoutPhase::Settled,
            order_id,
            redirect_url: None,
            challenge: None,
        },
        ChallengeOutcome::Navigate { order_id, url } => SubmitResponse {
            phase: CheckoutPhase::AwaitingRedirect,
            order_id,
            redirect_url: Some(url),
            challenge: None,
        },
    };
    Ok((StatusCode::OK, Json(response)))
}

pub async fn cancel_otp<C, O, S>(
    State(state): State<AppState<C, O, S>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    state.checkout.cancel_challenge().map_err(api_error)?;
    Ok(view_response(state.checkout.view()))
}

async fn reconcile<C, O, S>(
    state: AppState<C, O, S>,
    kind: CallbackKind,
    query: CallbackQuery,
) -> Result<Json<Reconciliation>, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    info!("Gateway returned on {:?} route", kind);

    state
        .checkout
        .reconcile(kind, query.order_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Gateway success route
pub async fn payment_success<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Reconciliation>, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    reconcile(state, CallbackKind::Success, query).await
}

/// Gateway failure route
pub async fn payment_failure<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Reconciliation>, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    reconcile(state, CallbackKind::Failure, query).await
}

/// Gateway generic callback route
pub async fn payment_callback<C, O, S>(
    State(state): State<AppState<C, O, S>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Reconciliation>, ApiError>
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    reconcile(state, CallbackKind::Callback, query).await
}

/// Health check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
