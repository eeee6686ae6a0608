//! HTTP route handlers.
//!
//! All API endpoints return JSON. State is shared via `Arc<SlotsState>`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::session::get_or_create_session;
use crate::engine::{SpinEngine, SpinResponse};
use crate::types::{
    format_money, AccountId, AccountSnapshot, GameRules, SlotsError, SlotsResult, Symbol,
};

/// The embedded game page (compiled into the binary).
const INDEX_HTML: &str = include_str!("templates/index.html");

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct SlotsState {
    pub engine: SpinEngine,
    pub rules: GameRules,
}

impl SlotsState {
    pub fn new(engine: SpinEngine, rules: GameRules) -> Self {
        Self { engine, rules }
    }
}

pub type AppState = Arc<SlotsState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Rendering context for the game page.
#[derive(Debug, Clone, Serialize)]
pub struct GameContext {
    pub player_data: AccountSnapshot,
    pub machine_balance: Decimal,
    pub symbols: Vec<Symbol>,
    pub min_bet_size: String,
    pub max_bet_size: String,
}

/// An amount sent either as a string (`"15.00"`) or as a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            AmountInput::Text(raw) => Decimal::from_str(raw.trim()).ok(),
            AmountInput::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BetSizeRequest {
    pub bet_size: AmountInput,
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

impl IntoResponse for SlotsError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            SlotsError::InsufficientBalance { .. } => {
                (StatusCode::BAD_REQUEST, "Insufficient balance".to_string())
            }
            SlotsError::InvalidMethod => (StatusCode::METHOD_NOT_ALLOWED, self.to_string()),
            SlotsError::InvalidBetSize { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            SlotsError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "Account not found".to_string()),
            SlotsError::LedgerCommit(_) | SlotsError::Storage(_) => {
                error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

async fn load_context(
    state: &SlotsState,
    jar: CookieJar,
) -> Result<(CookieJar, GameContext), SlotsError> {
    let (jar, id) = get_or_create_session(jar);
    let ledger = state.engine.ledger();
    let account = ledger.get_or_create(&id).await?;
    let machine_balance = ledger.machine_balance().await?;

    Ok((
        jar,
        GameContext {
            player_data: account.snapshot(),
            machine_balance,
            symbols: Symbol::ALL.to_vec(),
            min_bet_size: format_money(state.rules.min_bet_size),
            max_bet_size: format_money(state.rules.max_bet_size),
        },
    ))
}

/// GET /
pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), SlotsError> {
    let (jar, ctx) = load_context(&state, jar).await?;
    Ok((jar, Html(render_index(&ctx)?)))
}

/// GET /api/state
pub async fn get_state(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<GameContext>), SlotsError> {
    let (jar, ctx) = load_context(&state, jar).await?;
    Ok((jar, Json(ctx)))
}

/// POST /api/spin
///
/// The session cookie goes back on every response, errors included, so a
/// first-time player keeps the account created for them.
pub async fn spin(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Result<Json<SpinResponse>, SlotsError>) {
    let (jar, id) = get_or_create_session(jar);
    let result = run_spin(&state, &id).await.map(Json);
    (jar, result)
}

async fn run_spin(state: &SlotsState, id: &AccountId) -> SlotsResult<SpinResponse> {
    state.engine.ledger().get_or_create(id).await?;
    let result = state.engine.spin(id).await?;
    Ok(result.to_response())
}

/// POST /api/bet-size
pub async fn set_bet_size(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<BetSizeRequest>, JsonRejection>,
) -> (CookieJar, Result<Json<AccountSnapshot>, SlotsError>) {
    let (jar, id) = get_or_create_session(jar);
    let result = change_bet_size(&state, &id, body).await.map(Json);
    (jar, result)
}

async fn change_bet_size(
    state: &SlotsState,
    id: &AccountId,
    body: Result<Json<BetSizeRequest>, JsonRejection>,
) -> SlotsResult<AccountSnapshot> {
    let invalid = || SlotsError::InvalidBetSize {
        min: state.rules.min_bet_size,
        max: state.rules.max_bet_size,
    };
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(account = %id, error = %rejection, "Unreadable bet size request");
            return Err(invalid());
        }
    };
    let requested = req.bet_size.to_decimal().ok_or_else(invalid)?;
    let bet_size = state.rules.validate_bet_size(requested)?;

    let ledger = state.engine.ledger();
    ledger.get_or_create(id).await?;
    let account = ledger.set_bet_size(id, bet_size).await?;
    info!(account = %id, bet = %bet_size, "Bet size changed");
    Ok(account.snapshot())
}

/// Any method other than POST on a POST-only endpoint.
pub async fn method_not_allowed() -> SlotsError {
    SlotsError::InvalidMethod
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Inline the rendering context into the page template.
fn render_index(ctx: &GameContext) -> Result<String, SlotsError> {
    Ok(INDEX_HTML
        .replace("{{PLAYER_DATA}}", &script_json(&ctx.player_data)?)
        .replace("{{SYMBOLS}}", &script_json(&ctx.symbols)?)
        .replace("{{MACHINE_BALANCE}}", &format_money(ctx.machine_balance))
        .replace("{{MIN_BET}}", &ctx.min_bet_size)
        .replace("{{MAX_BET}}", &ctx.max_bet_size))
}

/// JSON safe to embed inside a `<script>` block.
fn script_json<T: Serialize>(value: &T) -> Result<String, SlotsError> {
    serde_json::to_string(value)
        .map(|s| s.replace("</", "<\\/"))
        .map_err(|e| SlotsError::Storage(format!("render failed: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
