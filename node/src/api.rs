//! # REST API
//!
//! Builds the axum router that exposes the bank over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                         | Description                          |
//! |--------|------------------------------|--------------------------------------|
//! | GET    | `/health`                    | Liveness probe                       |
//! | GET    | `/status`                    | Totals, capacity, counters, price    |
//! | GET    | `/assets`                    | Eligible assets                      |
//! | GET    | `/balances/:account/:asset`  | One ledger balance                   |
//! | POST   | `/deposit`                   | Deposit                              |
//! | POST   | `/withdraw`                  | Withdraw                             |
//! | POST   | `/fund`                      | Mint into a simulated wallet         |
//! | POST   | `/admin/assets`              | Register a token                     |
//! | DELETE | `/admin/assets/:asset`       | Deregister a token                   |
//! | POST   | `/admin/price`               | Publish a base-asset price           |
//! | GET    | `/events`                    | Event log (`?from=N`)                |
//!
//! Admin routes identify the caller by the `x-caller` header.
//!
//! Amounts in requests are decimal strings in the asset's own unit
//! (`"2.25"` of the base asset). Ledger amounts in responses are 6-decimal
//! fixed-point strings.
//!
//! Errors render as `{ "error": "...", "kind": "..." }` with the HTTP status
//! chosen by [`ErrorKind`].

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use vaultline_contracts::{
    BankError, Counters, ErrorKind, EventRecord, OperationKind, Receipt,
};
use vaultline_protocol::{format_ledger_amount, format_units, AccountId, AssetId, U256};

use crate::metrics::SharedMetrics;
use crate::sim::{parse_price, RegisterError, SimulatedBank};

/// Header carrying the caller's account on admin routes.
pub const CALLER_HEADER: &str = "x-caller";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The bank and its simulated collaborators.
    pub sim: SimulatedBank,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/assets", get(assets_handler))
        .route("/balances/:account/:asset", get(balance_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/fund", post(fund_handler))
        .route("/admin/assets", post(register_handler))
        .route("/admin/assets/:asset", delete(deregister_handler))
        .route("/admin/price", post(price_handler))
        .route("/events", get(events_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Coarse error class.
    pub kind: ErrorKind,
}

impl ErrorBody {
    /// An input error that never reached the bank.
    pub fn input(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: ErrorKind::Input,
        }
    }
}

impl From<BankError> for ErrorBody {
    fn from(err: BankError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl From<RegisterError> for ErrorBody {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::Bank(err) => err.into(),
            conflict @ RegisterError::PrecisionConflict { .. } => Self {
                error: conflict.to_string(),
                kind: ErrorKind::Policy,
            },
        }
    }
}

/// HTTP status for an error class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::Policy => StatusCode::CONFLICT,
        ErrorKind::Oracle => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Integration => StatusCode::BAD_GATEWAY,
        ErrorKind::Reentrancy => StatusCode::LOCKED,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Invariant => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error returned from a handler.
#[derive(Debug)]
pub struct ApiError(ErrorBody);

impl From<ErrorBody> for ApiError {
    fn from(body: ErrorBody) -> Self {
        ApiError(body)
    }
}

impl From<BankError> for ApiError {
    fn from(err: BankError) -> Self {
        ApiError(err.into())
    }
}

impl From<RegisterError> for ApiError {
    fn from(err: RegisterError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(self.0.kind), Json(self.0)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn caller(headers: &HeaderMap) -> Result<AccountId, ApiError> {
    let value = headers
        .get(CALLER_HEADER)
        .ok_or_else(|| ErrorBody::input(format!("missing {CALLER_HEADER} header")))?;
    let text = value
        .to_str()
        .map_err(|_| ErrorBody::input(format!("malformed {CALLER_HEADER} header")))?;
    text.parse::<AccountId>()
        .map_err(|e| ApiError(ErrorBody::input(format!("invalid caller: {e}"))))
}

fn parse_id<T>(text: &str, what: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.parse::<T>()
        .map_err(|e| ApiError(ErrorBody::input(format!("invalid {what}: {e}"))))
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposit`, `POST /withdraw`, and `POST /fund`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRequest {
    /// The account.
    pub account: AccountId,
    /// The asset.
    pub asset: AssetId,
    /// Decimal amount in whole units of the asset.
    pub amount: String,
}

/// A settled operation, as reported over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptView {
    /// Unique operation id.
    pub operation_id: Uuid,
    /// Deposit or withdrawal.
    pub kind: OperationKind,
    /// The account.
    pub account: AccountId,
    /// The asset.
    pub asset: AssetId,
    /// Native units moved, as a decimal integer string.
    pub raw_amount: String,
    /// Ledger units credited or debited.
    pub ledger_amount: String,
    /// Balance afterwards, ledger units.
    pub balance_after: String,
}

impl From<Receipt> for ReceiptView {
    fn from(r: Receipt) -> Self {
        Self {
            operation_id: r.operation_id,
            kind: r.kind,
            account: r.account,
            asset: r.asset,
            raw_amount: r.raw_amount.to_string(),
            ledger_amount: format_ledger_amount(r.ledger_amount),
            balance_after: format_ledger_amount(r.balance_after),
        }
    }
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Description of the active value feed.
    pub feed: String,
    /// Validated base-asset price in dollars, if the feed is usable.
    pub base_price: Option<String>,
    /// Why the price is unavailable, if it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_error: Option<String>,
    /// Sum of pool totals.
    pub total_pool_value: String,
    /// Configured capacity.
    pub capacity: String,
    /// Capacity minus total pool value.
    pub available_capacity: String,
    /// Per-withdrawal limit.
    pub withdrawal_limit: String,
    /// Feed heartbeat in seconds.
    pub feed_heartbeat_secs: u64,
    /// Operation counters.
    pub counters: Counters,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /balances/:account/:asset`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// The account.
    pub account: AccountId,
    /// The asset.
    pub asset: AssetId,
    /// Ledger balance, fixed-point.
    pub balance: String,
    /// Native units still in the simulated wallet.
    pub wallet: String,
}

/// Body of `POST /admin/assets`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Token address.
    pub asset: AssetId,
    /// Declares the token's precision once the registration is accepted.
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// Body of `POST /admin/price`.
#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    /// Price in dollars.
    pub price: String,
}

/// Query of `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// First sequence number to return.
    #[serde(default)]
    pub from: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — bank summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let bank = &state.sim.bank;
    let params = bank.params();
    let (base_price, price_error) = match bank.current_base_price() {
        Ok(price) => (
            Some(format_units(price.value, price.decimals)),
            None,
        ),
        Err(e) => (None, Some(e.to_string())),
    };

    Json(StatusResponse {
        version: state.version.clone(),
        feed: bank.feed_description(),
        base_price,
        price_error,
        total_pool_value: format_ledger_amount(bank.total_pool_value()),
        capacity: format_ledger_amount(params.capacity),
        available_capacity: format_ledger_amount(bank.available_capacity()),
        withdrawal_limit: format_ledger_amount(params.withdrawal_limit),
        feed_heartbeat_secs: params.feed_heartbeat.as_secs(),
        counters: bank.counters(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /assets` — assets currently accepted for deposit.
async fn assets_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "eligible": state.sim.bank.list_eligible_assets() }))
}

/// `GET /balances/:account/:asset`
async fn balance_handler(
    Path((account, asset)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<BalanceResponse> {
    let account: AccountId = parse_id(&account, "account")?;
    let asset: AssetId = parse_id(&asset, "asset")?;
    Ok(Json(BalanceResponse {
        account,
        asset,
        balance: format_ledger_amount(state.sim.bank.balance(&account, &asset)),
        wallet: state.sim.custody.wallet(&account, &asset).to_string(),
    }))
}

/// `POST /deposit`
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<ReceiptView> {
    run_operation(&state, OperationKind::Deposit, req)
}

/// `POST /withdraw`
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<ReceiptView> {
    run_operation(&state, OperationKind::Withdrawal, req)
}

fn run_operation(
    state: &AppState,
    kind: OperationKind,
    req: AmountRequest,
) -> ApiResult<ReceiptView> {
    let raw = state
        .sim
        .native_amount(&req.asset, &req.amount)
        .map_err(ErrorBody::input)?;

    let metrics = &state.metrics;
    let started = Instant::now();
    let result = match kind {
        OperationKind::Deposit => state.sim.bank.deposit(req.account, req.asset, raw),
        OperationKind::Withdrawal => state.sim.bank.withdraw(req.account, req.asset, raw),
    };
    metrics
        .operation_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(receipt) => {
            match kind {
                OperationKind::Deposit => metrics.deposits_total.inc(),
                OperationKind::Withdrawal => metrics.withdrawals_total.inc(),
            }
            metrics
                .total_pool_value_usd6
                .set(gauge_value(state.sim.bank.total_pool_value()));
            Ok(Json(receipt.into()))
        }
        Err(e) => {
            tracing::debug!(%kind, error = %e, "operation rejected");
            metrics.record_rejection(e.kind());
            Err(e.into())
        }
    }
}

/// `POST /fund` — mints native value into a simulated wallet.
async fn fund_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = state
        .sim
        .native_amount(&req.asset, &req.amount)
        .map_err(ErrorBody::input)?;
    state.sim.custody.fund(req.account, req.asset, raw);
    Ok(Json(serde_json::json!({
        "account": req.account,
        "asset": req.asset,
        "wallet": state.sim.custody.wallet(&req.account, &req.asset).to_string(),
    })))
}

/// `POST /admin/assets` — registers a token.
async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller(&headers)?;
    state.sim.register_token(&caller, req.asset, req.decimals)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "registered": req.asset })),
    ))
}

/// `DELETE /admin/assets/:asset` — deregisters a token.
async fn deregister_handler(
    Path(asset): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller(&headers)?;
    let asset: AssetId = parse_id(&asset, "asset")?;
    state.sim.bank.deregister_asset(&caller, asset)?;
    Ok(Json(serde_json::json!({ "deregistered": asset })))
}

/// `POST /admin/price` — publishes a new reading on the manual feed.
async fn price_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PriceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller(&headers)?;
    if !state.sim.is_admin(&caller) {
        return Err(BankError::Unauthorized(caller).into());
    }
    let answer = parse_price(&req.price).map_err(ErrorBody::input)?;
    let round_id = state.sim.feed.push(answer);
    Ok(Json(serde_json::json!({ "round_id": round_id, "price": req.price })))
}

/// `GET /events?from=N`
async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<EventRecord>> {
    Json(state.sim.bank.events_since(query.from))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn gauge_value(amount: U256) -> i64 {
    if amount.bits() > 63 {
        i64::MAX
    } else {
        amount.low_u64() as i64
    }
}
