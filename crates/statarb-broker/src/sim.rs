//! Deterministic in-memory broker.
//!
//! Fills every market order instantly at the current tick, tracks positions
//! and deal history, and exposes knobs for injecting rejections and
//! external closes. Used by the test suite and for paper runs.

use crate::adapter::{
    AccountInfo, Bar, BarTimeframe, Broker, Deal, DealEntry, OrderRequest, OrderResult,
    PositionInfo, ReturnCode, Tick,
};
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use statarb_core::{Lots, OrderAction, Price, SymbolSpec};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Simulated account leverage used for margin figures.
const SIM_LEVERAGE: f64 = 100.0;

#[derive(Debug, Clone)]
struct SimPosition {
    ticket: u64,
    symbol: String,
    action: OrderAction,
    volume: Lots,
    price_open: Price,
    magic: u32,
    comment: String,
}

#[derive(Default)]
struct SimState {
    connected: bool,
    balance: f64,
    commission_per_lot: f64,
    ticks: HashMap<String, Tick>,
    specs: HashMap<String, SymbolSpec>,
    bars: HashMap<String, Vec<Bar>>,
    positions: BTreeMap<u64, SimPosition>,
    deals: Vec<Deal>,
    next_ticket: u64,
    reject_next: usize,
}

impl SimState {
    fn contract_size(&self, symbol: &str) -> f64 {
        self.specs.get(symbol).map_or(1.0, |s| s.contract_size)
    }

    fn unrealized(&self, pos: &SimPosition) -> f64 {
        let Some(tick) = self.ticks.get(&pos.symbol) else {
            return 0.0;
        };
        let contract = self.contract_size(&pos.symbol);
        let volume = pos.volume.to_f64();
        match pos.action {
            OrderAction::Buy => (tick.bid.to_f64() - pos.price_open.to_f64()) * volume * contract,
            OrderAction::Sell => (pos.price_open.to_f64() - tick.ask.to_f64()) * volume * contract,
        }
    }

    fn total_unrealized(&self) -> f64 {
        self.positions.values().map(|p| self.unrealized(p)).sum()
    }
}

/// In-memory broker with deterministic fills.
pub struct SimBroker {
    state: Mutex<SimState>,
}

impl SimBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                connected: true,
                balance: 10_000.0,
                next_ticket: 100,
                ..SimState::default()
            }),
        }
    }

    /// Broker pre-seeded with a metals-style pair: contract sizes 100 and
    /// 5000, 0.01 lot grid on both legs.
    #[must_use]
    pub fn with_pair(primary: &str, secondary: &str) -> Self {
        let broker = Self::new();
        broker.set_spec(SymbolSpec {
            symbol: primary.to_string(),
            contract_size: 100.0,
            lot_step: Lots::from_f64(0.01),
            min_lot: Lots::from_f64(0.01),
            max_lot: Lots::from_f64(100.0),
            tick_size: Price::from_f64(0.01),
        });
        broker.set_spec(SymbolSpec {
            symbol: secondary.to_string(),
            contract_size: 5000.0,
            lot_step: Lots::from_f64(0.01),
            min_lot: Lots::from_f64(0.01),
            max_lot: Lots::from_f64(100.0),
            tick_size: Price::from_f64(0.001),
        });
        broker
    }

    // === Test / scenario controls ===

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn set_balance(&self, balance: f64) {
        self.state.lock().balance = balance;
    }

    pub fn set_commission_per_lot(&self, commission: f64) {
        self.state.lock().commission_per_lot = commission;
    }

    pub fn set_spec(&self, spec: SymbolSpec) {
        self.state.lock().specs.insert(spec.symbol.clone(), spec);
    }

    pub fn set_tick(&self, symbol: &str, bid: f64, ask: f64) {
        self.state.lock().ticks.insert(
            symbol.to_string(),
            Tick {
                bid: Price::from_f64(bid),
                ask: Price::from_f64(ask),
            },
        );
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.state.lock().bars.insert(symbol.to_string(), bars);
    }

    /// Seed `count` bars ending now, with closes walking linearly from
    /// `start_close` by `step` per bar.
    pub fn seed_linear_bars(
        &self,
        symbol: &str,
        timeframe: BarTimeframe,
        count: usize,
        start_close: f64,
        step: f64,
    ) {
        let duration = timeframe.duration();
        let now = Utc::now();
        let bars = (0..count)
            .map(|i| {
                let close = start_close + step * i as f64;
                Bar {
                    time: now - duration * (count - i) as i32,
                    open: close,
                    high: close,
                    low: close,
                    close,
                }
            })
            .collect();
        self.set_bars(symbol, bars);
    }

    /// Reject the next `n` order submissions.
    pub fn reject_next_orders(&self, n: usize) {
        self.state.lock().reject_next = n;
    }

    /// Close a position outside the engine (operator closing from the
    /// terminal). Books the deal like any other close.
    pub fn close_position_externally(&self, ticket: u64) -> bool {
        let mut state = self.state.lock();
        close_position(&mut state, ticket, "manual").is_some()
    }

    pub fn open_position_count(&self) -> usize {
        self.state.lock().positions.len()
    }

    pub fn position_tickets(&self) -> Vec<u64> {
        self.state.lock().positions.keys().copied().collect()
    }

    /// Append a historical deal directly (session-history scenarios).
    pub fn push_deal(&self, deal: Deal) {
        self.state.lock().deals.push(deal);
    }
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Close `ticket` at the current tick; returns realized profit.
fn close_position(state: &mut SimState, ticket: u64, comment: &str) -> Option<f64> {
    let pos = state.positions.get(&ticket)?.clone();
    let profit = state.unrealized(&pos);
    let commission = -state.commission_per_lot * pos.volume.to_f64();

    state.balance += profit + commission;
    state.positions.remove(&ticket);
    state.deals.push(Deal {
        ticket,
        symbol: pos.symbol,
        magic: pos.magic,
        entry: DealEntry::Out,
        profit,
        commission,
        time: Utc::now(),
    });
    debug!(ticket, profit, comment, "sim position closed");
    Some(profit)
}

#[async_trait]
impl Broker for SimBroker {
    async fn initialize(&self) -> BrokerResult<()> {
        self.state.lock().connected = true;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn account_info(&self) -> BrokerResult<AccountInfo> {
        let state = self.state.lock();
        if !state.connected {
            return Err(BrokerError::Disconnected);
        }
        let profit = state.total_unrealized();
        let equity = state.balance + profit;
        let margin: f64 = state
            .positions
            .values()
            .map(|p| {
                p.price_open.to_f64() * p.volume.to_f64() * state.contract_size(&p.symbol)
                    / SIM_LEVERAGE
            })
            .sum();
        let margin_level = if margin > 0.0 {
            equity / margin * 100.0
        } else {
            0.0
        };
        Ok(AccountInfo {
            balance: state.balance,
            equity,
            margin,
            margin_free: equity - margin,
            margin_level,
            profit,
        })
    }

    async fn symbol_info(&self, symbol: &str) -> BrokerResult<SymbolSpec> {
        self.state
            .lock()
            .specs
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.to_string()))
    }

    async fn symbol_tick(&self, symbol: &str) -> BrokerResult<Tick> {
        let state = self.state.lock();
        if !state.connected {
            return Err(BrokerError::Disconnected);
        }
        state
            .ticks
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::NoTick(symbol.to_string()))
    }

    async fn positions(&self, magic: Option<u32>) -> BrokerResult<Vec<PositionInfo>> {
        let state = self.state.lock();
        if !state.connected {
            return Err(BrokerError::Disconnected);
        }
        Ok(state
            .positions
            .values()
            .filter(|p| magic.map_or(true, |m| p.magic == m))
            .map(|p| {
                let tick = state.ticks.get(&p.symbol);
                let price_current = tick
                    .map(|t| match p.action {
                        OrderAction::Buy => t.bid,
                        OrderAction::Sell => t.ask,
                    })
                    .unwrap_or(p.price_open);
                PositionInfo {
                    ticket: p.ticket,
                    symbol: p.symbol.clone(),
                    action: p.action,
                    volume: p.volume,
                    price_open: p.price_open,
                    price_current,
                    profit: state.unrealized(p),
                    magic: p.magic,
                    comment: p.comment.clone(),
                }
            })
            .collect())
    }

    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BrokerResult<Vec<Deal>> {
        let state = self.state.lock();
        Ok(state
            .deals
            .iter()
            .filter(|d| d.time >= from && d.time <= to)
            .cloned()
            .collect())
    }

    async fn bars(
        &self,
        symbol: &str,
        _timeframe: BarTimeframe,
        count: usize,
    ) -> BrokerResult<Vec<Bar>> {
        let state = self.state.lock();
        let bars = state
            .bars
            .get(symbol)
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.to_string()))?;
        let start = bars.len().saturating_sub(count);
        Ok(bars[start..].to_vec())
    }

    async fn order_send(&self, request: OrderRequest) -> BrokerResult<OrderResult> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(BrokerError::Disconnected);
        }

        if state.reject_next > 0 {
            state.reject_next -= 1;
            return Ok(OrderResult {
                retcode: ReturnCode::Rejected,
                ticket: 0,
                volume: Lots::ZERO,
                price: Price::ZERO,
                comment: "sim: injected rejection".to_string(),
            });
        }

        if let Some(ticket) = request.close_ticket {
            // Closing an already-closed ticket is a no-op by design.
            let price = state
                .ticks
                .get(&request.symbol)
                .map(|t| match request.action {
                    OrderAction::Buy => t.ask,
                    OrderAction::Sell => t.bid,
                })
                .unwrap_or(Price::ZERO);
            close_position(&mut state, ticket, &request.comment);
            return Ok(OrderResult {
                retcode: ReturnCode::Done,
                ticket,
                volume: request.volume,
                price,
                comment: request.comment,
            });
        }

        if !request.volume.is_positive() {
            return Ok(OrderResult {
                retcode: ReturnCode::InvalidVolume,
                ticket: 0,
                volume: request.volume,
                price: Price::ZERO,
                comment: "sim: non-positive volume".to_string(),
            });
        }

        let tick = state
            .ticks
            .get(&request.symbol)
            .copied()
            .ok_or_else(|| BrokerError::NoTick(request.symbol.clone()))?;
        let fill_price = match request.action {
            OrderAction::Buy => tick.ask,
            OrderAction::Sell => tick.bid,
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let commission = -state.commission_per_lot * request.volume.inner().to_f64().unwrap_or(0.0);
        state.positions.insert(
            ticket,
            SimPosition {
                ticket,
                symbol: request.symbol.clone(),
                action: request.action,
                volume: request.volume,
                price_open: fill_price,
                magic: request.magic,
                comment: request.comment.clone(),
            },
        );
        state.deals.push(Deal {
            ticket,
            symbol: request.symbol,
            magic: request.magic,
            entry: DealEntry::In,
            profit: 0.0,
            commission,
            time: Utc::now(),
        });

        Ok(OrderResult {
            retcode: ReturnCode::Done,
            ticket,
            volume: request.volume,
            price: fill_price,
            comment: request.comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn broker_with_ticks() -> SimBroker {
        let broker = SimBroker::with_pair("XAUUSD", "XAGUSD");
        broker.set_tick("XAUUSD", 2400.0, 2400.5);
        broker.set_tick("XAGUSD", 30.0, 30.02);
        broker
    }

    #[tokio::test]
    async fn test_open_and_close_round_trip() {
        let broker = broker_with_ticks();

        let result = broker
            .order_send(OrderRequest::market(
                "XAUUSD",
                OrderAction::Buy,
                Lots::new(dec!(0.1)),
                234000,
                "SPREAD:test",
            ))
            .await
            .unwrap();
        assert!(result.is_done());
        assert_eq!(broker.open_position_count(), 1);

        // Price rises 10.0; buy of 0.1 lots x contract 100 gains $100.
        broker.set_tick("XAUUSD", 2410.5, 2411.0);
        let positions = broker.positions(Some(234000)).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert!((positions[0].profit - 100.0).abs() < 1e-6);

        let close = broker
            .order_send(OrderRequest::close(
                "XAUUSD",
                OrderAction::Sell,
                Lots::new(dec!(0.1)),
                result.ticket,
                234000,
                "FAST_CLOSE_ALL",
            ))
            .await
            .unwrap();
        assert!(close.is_done());
        assert_eq!(broker.open_position_count(), 0);

        let info = broker.account_info().await.unwrap();
        assert!((info.balance - 10_100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_close_unknown_ticket_is_noop() {
        let broker = broker_with_ticks();
        let result = broker
            .order_send(OrderRequest::close(
                "XAUUSD",
                OrderAction::Sell,
                Lots::new(dec!(0.1)),
                999,
                234000,
                "FAST_CLOSE_ALL",
            ))
            .await
            .unwrap();
        assert!(result.is_done());
    }

    #[tokio::test]
    async fn test_injected_rejection() {
        let broker = broker_with_ticks();
        broker.reject_next_orders(1);

        let rejected = broker
            .order_send(OrderRequest::market(
                "XAUUSD",
                OrderAction::Buy,
                Lots::new(dec!(0.1)),
                234000,
                "SPREAD:test",
            ))
            .await
            .unwrap();
        assert!(!rejected.is_done());
        assert_eq!(broker.open_position_count(), 0);

        let ok = broker
            .order_send(OrderRequest::market(
                "XAUUSD",
                OrderAction::Buy,
                Lots::new(dec!(0.1)),
                234000,
                "SPREAD:test",
            ))
            .await
            .unwrap();
        assert!(ok.is_done());
    }

    #[tokio::test]
    async fn test_close_records_out_deal_with_commission() {
        let broker = broker_with_ticks();
        broker.set_commission_per_lot(7.0);

        let result = broker
            .order_send(OrderRequest::market(
                "XAUUSD",
                OrderAction::Buy,
                Lots::new(dec!(1)),
                234000,
                "SPREAD:test",
            ))
            .await
            .unwrap();
        broker.close_position_externally(result.ticket);

        let deals = broker
            .history_deals(Utc::now() - chrono::Duration::hours(1), Utc::now())
            .await
            .unwrap();
        let out: Vec<_> = deals.iter().filter(|d| d.entry == DealEntry::Out).collect();
        assert_eq!(out.len(), 1);
        assert!((out[0].commission + 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_disconnected_fails_closed() {
        let broker = broker_with_ticks();
        broker.set_connected(false);

        assert!(broker.account_info().await.is_err());
        assert!(broker.positions(None).await.is_err());
        assert!(broker
            .order_send(OrderRequest::market(
                "XAUUSD",
                OrderAction::Buy,
                Lots::new(dec!(0.1)),
                234000,
                "SPREAD:test",
            ))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_bars_tail_window() {
        let broker = broker_with_ticks();
        broker.seed_linear_bars("XAUUSD", BarTimeframe::H1, 100, 2300.0, 1.0);

        let bars = broker.bars("XAUUSD", BarTimeframe::H1, 10).await.unwrap();
        assert_eq!(bars.len(), 10);
        assert!((bars[9].close - 2399.0).abs() < 1e-9);

        let all = broker.bars("XAUUSD", BarTimeframe::H1, 500).await.unwrap();
        assert_eq!(all.len(), 100);
    }
}
