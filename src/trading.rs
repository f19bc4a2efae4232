//! Positions ledger and the battery-arbitrage sweep.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{Position, PositionSide, PositionStatus, Region};
use crate::storage::Store;

/// Close outcome distinguishing "not yours / not open / not found" from a
/// store error.
#[derive(Debug)]
pub enum CloseOutcome {
    Closed(Position),
    NotFound,
}

#[derive(Clone)]
pub struct TradingLedger {
    store: Store,
}

impl TradingLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Open a position: fresh id, OPEN status, entry stamped now.
    pub async fn open(
        &self,
        user_id: &str,
        region: Region,
        side: PositionSide,
        entry_price: f64,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        let position = Position {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            region,
            side,
            quantity,
            entry_price,
            entry_ts: now,
            exit_price: None,
            exit_ts: None,
            pnl: None,
            status: PositionStatus::Open,
        };
        self.store.insert_position(&position).await?;
        info!(
            id = %position.id,
            user_id,
            region = %region,
            side = side.as_str(),
            "position opened"
        );
        Ok(position)
    }

    /// Realised P&L: (exit − entry) × qty long, (entry − exit) × qty short.
    pub fn realised_pnl(side: PositionSide, entry: f64, exit: f64, quantity: f64) -> f64 {
        match side {
            PositionSide::Long => (exit - entry) * quantity,
            PositionSide::Short => (entry - exit) * quantity,
        }
    }

    /// Close an OPEN position owned by `user_id`. A second close of the same
    /// id (or a foreign/unknown id) is `NotFound`.
    pub async fn close(
        &self,
        user_id: &str,
        id: &str,
        exit_price: f64,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome> {
        let Some(position) = self.store.get_position(id, user_id).await? else {
            return Ok(CloseOutcome::NotFound);
        };
        if position.status == PositionStatus::Closed {
            return Ok(CloseOutcome::NotFound);
        }

        let pnl = Self::realised_pnl(
            position.side,
            position.entry_price,
            exit_price,
            position.quantity,
        );
        let changed = self
            .store
            .close_position(id, user_id, exit_price, now, pnl)
            .await?;
        if changed == 0 {
            // Raced with another close.
            return Ok(CloseOutcome::NotFound);
        }

        let closed = self
            .store
            .get_position(id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("position vanished after close"))?;
        info!(id, user_id, pnl, "position closed");
        Ok(CloseOutcome::Closed(closed))
    }

    /// Positions newest-first, capped at 100.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Position>> {
        self.store.list_positions(user_id, 100).await
    }
}

// ---- Battery arbitrage sweep ----

#[derive(Debug, Deserialize)]
pub struct BessRequest {
    pub region: String,
    pub capacity_mwh: f64,
    pub power_mw: f64,
    /// Round-trip efficiency in (0, 1].
    pub efficiency: f64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BessOperation {
    pub interval: DateTime<Utc>,
    pub action: String,
    pub mw: f64,
    pub price: f64,
    pub revenue: f64,
    pub soc_mwh: f64,
}

#[derive(Debug, Serialize)]
pub struct BessResult {
    pub region: String,
    pub total_revenue: f64,
    pub cycles: f64,
    pub operations: Vec<BessOperation>,
}

const MAX_REPORTED_OPERATIONS: usize = 100;

/// Greedy charge-cheap / discharge-expensive sweep over a price series.
///
/// Intervals are ranked by price; the cheapest become charge slots and the
/// dearest discharge slots, subject to power and energy limits, then the
/// schedule is replayed in time order to produce the operation log.
pub fn optimize_bess(
    request: &BessRequest,
    series: &[(DateTime<Utc>, f64)],
    interval_hours: f64,
) -> BessResult {
    let capacity = request.capacity_mwh.max(0.0);
    let power = request.power_mw.max(0.0);
    let efficiency = request.efficiency.clamp(0.05, 1.0);

    if series.is_empty() || capacity <= 0.0 || power <= 0.0 {
        return BessResult {
            region: request.region.clone(),
            total_revenue: 0.0,
            cycles: 0.0,
            operations: Vec::new(),
        };
    }

    let energy_per_slot = power * interval_hours;
    let slots_per_cycle = (capacity / energy_per_slot).ceil().max(1.0) as usize;

    // Rank intervals by price; the cheapest N charge, the dearest N discharge,
    // and a slot can't be both.
    let mut by_price: Vec<usize> = (0..series.len()).collect();
    by_price.sort_by(|a, b| {
        series[*a]
            .1
            .partial_cmp(&series[*b].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let take = slots_per_cycle.min(series.len() / 2);
    let charge_slots: std::collections::HashSet<usize> =
        by_price.iter().take(take).copied().collect();
    let discharge_slots: std::collections::HashSet<usize> =
        by_price.iter().rev().take(take).copied().collect();

    let mut soc_mwh = 0.0f64;
    let mut total_revenue = 0.0f64;
    let mut discharged_total = 0.0f64;
    let mut operations = Vec::new();

    for (i, (interval, price)) in series.iter().enumerate() {
        let (action, mw, revenue) = if charge_slots.contains(&i) && soc_mwh < capacity {
            let energy = energy_per_slot.min(capacity - soc_mwh);
            soc_mwh += energy * efficiency;
            ("charge", energy / interval_hours, -(energy * price))
        } else if discharge_slots.contains(&i) && soc_mwh > 0.0 {
            let energy = energy_per_slot.min(soc_mwh);
            soc_mwh -= energy;
            discharged_total += energy;
            ("discharge", energy / interval_hours, energy * price)
        } else {
            continue;
        };

        total_revenue += revenue;
        if operations.len() < MAX_REPORTED_OPERATIONS {
            operations.push(BessOperation {
                interval: *interval,
                action: action.to_string(),
                mw,
                price: *price,
                revenue,
                soc_mwh,
            });
        }
    }

    BessResult {
        region: request.region.clone(),
        total_revenue,
        cycles: if capacity > 0.0 {
            discharged_total / capacity
        } else {
            0.0
        },
        operations,
    }
}
