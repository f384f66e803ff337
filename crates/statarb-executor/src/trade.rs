//! Broker order submission.

use crate::error::{ExecutorError, ExecutorResult};
use statarb_broker::{BrokerError, DynBroker, OrderRequest, OrderResult};
use statarb_core::{Lots, OrderAction, SpreadId, SpreadSide, SymbolSpec};
use tracing::{error, info, warn};

/// Attempts per order before a transient failure is surfaced.
const SEND_ATTEMPTS: usize = 2;

/// Both legs of a filled spread entry.
#[derive(Debug, Clone)]
pub struct SpreadOrderOutcome {
    pub primary: OrderResult,
    pub secondary: OrderResult,
    pub spread_id: SpreadId,
    pub entry_zscore: f64,
}

/// Thin order-placement layer over the broker.
///
/// Stamps every order with the strategy magic and a comment carrying the
/// spread-id prefix, and retries transient send failures once.
pub struct TradeExecutor {
    broker: DynBroker,
    magic: u32,
    primary_symbol: String,
    secondary_symbol: String,
    primary_spec: SymbolSpec,
    secondary_spec: SymbolSpec,
}

impl TradeExecutor {
    #[must_use]
    pub fn new(
        broker: DynBroker,
        magic: u32,
        primary_spec: SymbolSpec,
        secondary_spec: SymbolSpec,
    ) -> Self {
        Self {
            broker,
            magic,
            primary_symbol: primary_spec.symbol.clone(),
            secondary_symbol: secondary_spec.symbol.clone(),
            primary_spec,
            secondary_spec,
        }
    }

    #[must_use]
    pub fn magic(&self) -> u32 {
        self.magic
    }

    #[must_use]
    pub fn primary_spec(&self) -> &SymbolSpec {
        &self.primary_spec
    }

    #[must_use]
    pub fn secondary_spec(&self) -> &SymbolSpec {
        &self.secondary_spec
    }

    fn spec_for(&self, symbol: &str) -> &SymbolSpec {
        if symbol == self.secondary_symbol {
            &self.secondary_spec
        } else {
            &self.primary_spec
        }
    }

    /// Submit one market order, retrying transient failures.
    pub async fn place_market_order(
        &self,
        symbol: &str,
        action: OrderAction,
        volume: Lots,
        comment: &str,
    ) -> ExecutorResult<OrderResult> {
        let volume = self.spec_for(symbol).normalize_lots(volume);
        if !volume.is_positive() {
            return Err(ExecutorError::VolumeTooSmall(symbol.to_string()));
        }

        let request = OrderRequest::market(symbol, action, volume, self.magic, comment);
        let mut last_err = None;
        for attempt in 1..=SEND_ATTEMPTS {
            match self.broker.order_send(request.clone()).await {
                Ok(result) if result.is_done() => {
                    info!(
                        symbol,
                        %action,
                        volume = %result.volume,
                        price = %result.price,
                        ticket = result.ticket,
                        comment,
                        "Order filled"
                    );
                    return Ok(result);
                }
                Ok(result) => {
                    // Broker-side rejection is final; no state was mutated.
                    return Err(ExecutorError::OrderRejected {
                        symbol: symbol.to_string(),
                        reason: result.comment,
                    });
                }
                Err(e @ BrokerError::Transient(_)) if attempt < SEND_ATTEMPTS => {
                    warn!(symbol, attempt, error = %e, "Transient send failure, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .map(ExecutorError::Broker)
            .unwrap_or_else(|| ExecutorError::OrderRejected {
                symbol: symbol.to_string(),
                reason: "send failed".to_string(),
            }))
    }

    /// Submit both legs of a spread entry under one logical spread id.
    ///
    /// The spread id is derived from the two broker tickets. If the
    /// secondary leg fails after the primary filled, the error carries the
    /// filled leg so the caller can record the unhedged incident.
    pub async fn place_spread_orders(
        &self,
        side: SpreadSide,
        primary_volume: Lots,
        secondary_volume: Lots,
        entry_zscore: f64,
    ) -> ExecutorResult<SpreadOrderOutcome> {
        let primary = self
            .place_market_order(
                &self.primary_symbol,
                side.primary_action(),
                primary_volume,
                "SPREAD:NEW",
            )
            .await?;

        let secondary_comment = format!("SPREAD:{}", primary.ticket);
        let secondary = match self
            .place_market_order(
                &self.secondary_symbol,
                side.secondary_action(),
                secondary_volume,
                &secondary_comment,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(
                    primary_ticket = primary.ticket,
                    error = %e,
                    "Secondary leg failed after primary fill"
                );
                return Err(ExecutorError::HedgeViolation {
                    filled_symbol: self.primary_symbol.clone(),
                    filled_ticket: primary.ticket,
                    filled: Box::new(primary),
                    failed_symbol: self.secondary_symbol.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let spread_id = SpreadId::from_tickets(primary.ticket, secondary.ticket);
        info!(
            spread_id = %spread_id,
            %side,
            primary_ticket = primary.ticket,
            secondary_ticket = secondary.ticket,
            entry_zscore,
            "Spread orders filled"
        );

        Ok(SpreadOrderOutcome {
            primary,
            secondary,
            spread_id,
            entry_zscore,
        })
    }
}
