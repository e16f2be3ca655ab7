use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    mine::spawn_mining, pow, Block, Blockchain, CancelToken, ChainConfig, LedgerError, Transaction,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::constants::{BLOCKS_PER_BATCH, MAX_BLOCKS_PER_REQUEST};

/// Handle to the one blockchain this node serves.
///
/// The ledger lock is held only to prepare and to commit a block; the nonce
/// search itself runs on the blocking pool so reads stay responsive.
#[derive(Clone)]
pub struct AppState {
    ledger: Arc<Mutex<Blockchain>>,
    mining: Arc<StdMutex<Option<CancelToken>>>,
}

impl AppState {
    pub fn new(ledger: Blockchain) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            mining: Arc::new(StdMutex::new(None)),
        }
    }
}

/// Holds the node's single mining slot for one `/mine` request.
///
/// Dropping it cancels the search and frees the slot. That also happens when
/// the request future itself is dropped, e.g. on client disconnect.
struct MiningSlot {
    slot: Arc<StdMutex<Option<CancelToken>>>,
    cancel: CancelToken,
}

impl MiningSlot {
    fn acquire(slot: &Arc<StdMutex<Option<CancelToken>>>) -> Option<Self> {
        let mut current = lock_slot(slot);
        if current.is_some() {
            return None;
        }
        let cancel = CancelToken::new();
        *current = Some(cancel.clone());
        Some(Self {
            slot: slot.clone(),
            cancel,
        })
    }
}

impl Drop for MiningSlot {
    fn drop(&mut self) {
        self.cancel.cancel();
        *lock_slot(&self.slot) = None;
    }
}

fn lock_slot(slot: &StdMutex<Option<CancelToken>>) -> MutexGuard<'_, Option<CancelToken>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/chain", get(chain))
        .route("/chain/head", get(head))
        .route("/chain/valid", get(validate))
        .route("/pending", get(pending))
        .route("/tx", post(submit_tx))
        .route("/mine", post(mine))
        .route("/mine/cancel", post(cancel_mining))
        .route("/balance/{address}", get(balance))
        .route("/balances", get(balances))
        .route("/addresses", get(addresses))
        .route("/config", get(get_config).put(put_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err {
            LedgerError::Cancelled { .. } | LedgerError::StaleBlock { .. } => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Head {
    height: u64,
    hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Validity {
    valid: bool,
    integrity_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    from: Option<u64>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxIn {
    from: String,
    to: String,
    amount: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Accepted {
    accepted: bool,
    pending: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineIn {
    miner: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResult {
    mined: bool,
    index: u64,
    nonce: u64,
    hash: String,
    difficulty: usize,
    transactions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Cancelled {
    cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Balance {
    address: String,
    balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    difficulty: Option<usize>,
    mining_reward: Option<f64>,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".into(),
    })
}

async fn chain(State(state): State<AppState>, Query(q): Query<ChainQuery>) -> Json<Vec<Block>> {
    let from = q.from.unwrap_or(0) as usize;
    let limit = q.limit.unwrap_or(BLOCKS_PER_BATCH).min(MAX_BLOCKS_PER_REQUEST) as usize;
    let ledger = state.ledger.lock().await;
    let blocks = ledger.blocks().iter().skip(from).take(limit).cloned().collect();
    Json(blocks)
}

async fn head(State(state): State<AppState>) -> Json<Head> {
    let ledger = state.ledger.lock().await;
    Json(Head {
        height: ledger.len().saturating_sub(1) as u64,
        hash: ledger.latest_block().map(|b| b.hash.clone()),
    })
}

async fn validate(State(state): State<AppState>) -> Json<Validity> {
    let ledger = state.ledger.lock().await;
    Json(Validity {
        valid: ledger.is_chain_valid(),
        integrity_error: ledger.verify_integrity().err().map(|e| e.to_string()),
    })
}

async fn pending(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.ledger.lock().await.pending_transactions().to_vec())
}

async fn submit_tx(State(state): State<AppState>, Json(tx): Json<TxIn>) -> ApiResult<Accepted> {
    let mut ledger = state.ledger.lock().await;
    ledger.submit(&tx.from, &tx.to, tx.amount)?;
    Ok(Json(Accepted {
        accepted: true,
        pending: ledger.pending_transactions().len(),
    }))
}

async fn mine(State(state): State<AppState>, Json(req): Json<MineIn>) -> ApiResult<MineResult> {
    let slot = MiningSlot::acquire(&state.mining).ok_or_else(|| ApiError {
        status: StatusCode::CONFLICT,
        message: "a block is already being mined".into(),
    })?;
    mine_next_block(&state, &req.miner, slot.cancel.clone())
        .await
        .map(Json)
}

async fn mine_next_block(
    state: &AppState,
    miner: &str,
    cancel: CancelToken,
) -> Result<MineResult, ApiError> {
    let mut template = state.ledger.lock().await.prepare_block(miner)?;
    let difficulty = template.difficulty();
    info!(
        "mining block {} at difficulty {difficulty} (~{} attempts expected)",
        template.block.index,
        pow::expected_attempts(difficulty)
    );

    template.block = spawn_mining(template.block.clone(), difficulty, cancel)
        .await
        .map_err(|err| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("mining task failed: {err}"),
        })??;

    let mut ledger = state.ledger.lock().await;
    let block = ledger.commit_block(template)?;
    Ok(MineResult {
        mined: true,
        index: block.index,
        nonce: block.nonce,
        hash: block.hash.clone(),
        difficulty,
        transactions: block.transactions.len(),
    })
}

async fn cancel_mining(State(state): State<AppState>) -> Json<Cancelled> {
    let slot = lock_slot(&state.mining);
    let cancelled = match slot.as_ref() {
        Some(token) => {
            token.cancel();
            true
        }
        None => false,
    };
    if cancelled {
        warn!("cancel requested for in-flight mining");
    }
    Json(Cancelled { cancelled })
}

async fn balance(State(state): State<AppState>, Path(address): Path<String>) -> Json<Balance> {
    let balance = state.ledger.lock().await.get_balance(&address);
    Json(Balance { address, balance })
}

async fn balances(State(state): State<AppState>) -> Json<Vec<Balance>> {
    let ledger = state.ledger.lock().await;
    Json(
        ledger
            .balances()
            .into_iter()
            .map(|(address, balance)| Balance { address, balance })
            .collect(),
    )
}

async fn addresses(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.ledger.lock().await.get_all_addresses())
}

async fn get_config(State(state): State<AppState>) -> Json<ChainConfig> {
    Json(state.ledger.lock().await.config())
}

async fn put_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<ChainConfig> {
    let mut ledger = state.ledger.lock().await;
    let current = ledger.config();
    let config = ChainConfig {
        difficulty: update.difficulty.unwrap_or(current.difficulty),
        mining_reward: update.mining_reward.unwrap_or(current.mining_reward),
    };
    ledger.set_config(config)?;
    info!(
        "config updated: difficulty {} reward {}",
        config.difficulty, config.mining_reward
    );
    Ok(Json(config))
}
