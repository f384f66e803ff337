//! Abstract broker interface and wire types.
//!
//! Mirrors the market-access surface the engine actually uses: account
//! info, symbol specs, ticks, positions, deal history, historical bars, and
//! market order submission with deviation / GTC / IOC semantics.

use crate::error::BrokerResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::{Lots, OrderAction, Price, SymbolSpec};
use std::sync::Arc;

/// Account state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub margin_free: f64,
    /// Percent; 0 when no margin is in use.
    pub margin_level: f64,
    /// Unrealized P&L across all open positions.
    pub profit: f64,
}

/// Best bid/ask for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub bid: Price,
    pub ask: Price,
}

/// One open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub ticket: u64,
    pub symbol: String,
    pub action: OrderAction,
    pub volume: Lots,
    pub price_open: Price,
    pub price_current: Price,
    pub profit: f64,
    pub magic: u32,
    pub comment: String,
}

/// Whether a deal opened or closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealEntry {
    In,
    Out,
}

/// One historical deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub ticket: u64,
    pub symbol: String,
    pub magic: u32,
    pub entry: DealEntry,
    pub profit: f64,
    pub commission: f64,
    pub time: DateTime<Utc>,
}

/// Historical price bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Bar frequency for history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BarTimeframe {
    M1,
    M5,
    M15,
    H1,
    D1,
}

impl BarTimeframe {
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        match self {
            Self::M1 => chrono::Duration::minutes(1),
            Self::M5 => chrono::Duration::minutes(5),
            Self::M15 => chrono::Duration::minutes(15),
            Self::H1 => chrono::Duration::hours(1),
            Self::D1 => chrono::Duration::days(1),
        }
    }

    /// Bars per calendar day, used to size bootstrap requests.
    #[must_use]
    pub fn bars_per_day(&self) -> usize {
        match self {
            Self::M1 => 1440,
            Self::M5 => 288,
            Self::M15 => 96,
            Self::H1 => 24,
            Self::D1 => 1,
        }
    }
}

/// Order lifetime. Market orders are good-till-cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    #[default]
    Gtc,
}

/// Fill policy. Immediate-or-cancel matches the engine's market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderFilling {
    #[default]
    Ioc,
}

/// A market order request.
///
/// `close_ticket` turns the deal into a close of that position instead of
/// opening a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: OrderAction,
    pub volume: Lots,
    /// Advisory price; the broker fills at market within `deviation_points`.
    pub price: Option<Price>,
    pub deviation_points: u32,
    pub magic: u32,
    pub comment: String,
    pub close_ticket: Option<u64>,
    pub time_in_force: TimeInForce,
    pub filling: OrderFilling,
}

impl OrderRequest {
    /// Market order opening a new position.
    #[must_use]
    pub fn market(symbol: &str, action: OrderAction, volume: Lots, magic: u32, comment: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            action,
            volume,
            price: None,
            deviation_points: 20,
            magic,
            comment: comment.to_string(),
            close_ticket: None,
            time_in_force: TimeInForce::Gtc,
            filling: OrderFilling::Ioc,
        }
    }

    /// Market order closing an existing position.
    #[must_use]
    pub fn close(
        symbol: &str,
        action: OrderAction,
        volume: Lots,
        ticket: u64,
        magic: u32,
        comment: &str,
    ) -> Self {
        Self {
            close_ticket: Some(ticket),
            ..Self::market(symbol, action, volume, magic, comment)
        }
    }
}

/// Broker-side disposition of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    Done,
    Rejected,
    NoMoney,
    InvalidVolume,
}

/// Result of an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub retcode: ReturnCode,
    /// Position ticket created (or closed) by the deal; 0 on rejection.
    pub ticket: u64,
    pub volume: Lots,
    pub price: Price,
    pub comment: String,
}

impl OrderResult {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.retcode == ReturnCode::Done
    }
}

/// The market-access operations the engine depends on.
///
/// The connection is a process-wide singleton; every worker borrows it
/// through an `Arc<dyn Broker>` under its own request.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish (or re-establish) the connection.
    async fn initialize(&self) -> BrokerResult<()>;

    /// Cheap health probe.
    async fn is_connected(&self) -> bool;

    async fn account_info(&self) -> BrokerResult<AccountInfo>;

    async fn symbol_info(&self, symbol: &str) -> BrokerResult<SymbolSpec>;

    async fn symbol_tick(&self, symbol: &str) -> BrokerResult<Tick>;

    /// Open positions, optionally filtered by magic.
    async fn positions(&self, magic: Option<u32>) -> BrokerResult<Vec<PositionInfo>>;

    /// Deals between `from` and `to` inclusive.
    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BrokerResult<Vec<Deal>>;

    /// Most recent `count` bars for a symbol, oldest first.
    async fn bars(
        &self,
        symbol: &str,
        timeframe: BarTimeframe,
        count: usize,
    ) -> BrokerResult<Vec<Bar>>;

    async fn order_send(&self, request: OrderRequest) -> BrokerResult<OrderResult>;
}

/// Shared trait-object handle used throughout the engine.
pub type DynBroker = Arc<dyn Broker>;
