//! Relational time-series store.
//!
//! One table per record family, upsert-by-natural-key so re-ingesting a
//! bundle is idempotent. Writes are batched in transactions of at most 500
//! rows; a rejected batch is retried once as two halves, then dropped (the
//! next tick's upserts recover). Timestamps are unix seconds UTC.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{
    BatteryDispatchRow, ConstraintForecast, ConstraintRow, DispatchPriceRow, FcasPriceRow,
    FcasService, GeneratorDispatchRow, InterconnectorFlowRow, InterconnectorForecast,
    P5minRegionForecast, P5minUnitForecast, Position, PositionSide, PositionStatus,
    PredispatchRegionRow, PredispatchUnitRow, Region, RegionPrice, ScadaRow, StpasaRegionRow,
    StpasaUnitAvailability, TradingPriceRow, ValidationReport,
};

use super::FuelRollupRow;

/// Transaction size limit of the backing engine.
const MAX_BATCH: usize = 500;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open relational store")?;
        Self::from_connection(conn)
    }

    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS dispatch_prices (
                region TEXT NOT NULL,
                settlement_ts INTEGER NOT NULL,
                rrp REAL NOT NULL,
                rop REAL NOT NULL,
                apc_flag INTEGER NOT NULL,
                total_demand REAL NOT NULL,
                available_generation REAL NOT NULL,
                net_interchange REAL NOT NULL,
                fcas_json TEXT NOT NULL,
                price_status TEXT,
                last_changed INTEGER,
                PRIMARY KEY (region, settlement_ts)
            );
            CREATE INDEX IF NOT EXISTS idx_dispatch_prices_ts
                ON dispatch_prices(settlement_ts DESC);

            CREATE TABLE IF NOT EXISTS fcas_prices (
                region TEXT NOT NULL,
                service TEXT NOT NULL,
                settlement_ts INTEGER NOT NULL,
                price REAL NOT NULL,
                enablement_min REAL NOT NULL,
                enablement_max REAL NOT NULL,
                PRIMARY KEY (region, service, settlement_ts)
            );
            CREATE INDEX IF NOT EXISTS idx_fcas_prices_ts
                ON fcas_prices(settlement_ts DESC);

            CREATE TABLE IF NOT EXISTS interconnector_flows (
                interconnector_id TEXT NOT NULL,
                settlement_ts INTEGER NOT NULL,
                from_region TEXT NOT NULL,
                to_region TEXT NOT NULL,
                metered_mw REAL NOT NULL,
                mw_flow REAL NOT NULL,
                mw_losses REAL NOT NULL,
                export_limit REAL NOT NULL,
                import_limit REAL NOT NULL,
                marginal_value REAL NOT NULL,
                violation_degree REAL NOT NULL,
                PRIMARY KEY (interconnector_id, settlement_ts)
            );
            CREATE INDEX IF NOT EXISTS idx_interconnector_flows_ts
                ON interconnector_flows(settlement_ts DESC);

            CREATE TABLE IF NOT EXISTS generator_dispatch (
                duid TEXT NOT NULL,
                settlement_ts INTEGER NOT NULL,
                intervention INTEGER NOT NULL,
                initial_mw REAL NOT NULL,
                total_cleared_mw REAL NOT NULL,
                ramp_up_rate REAL NOT NULL,
                ramp_down_rate REAL NOT NULL,
                availability REAL NOT NULL,
                semi_dispatch_cap INTEGER NOT NULL,
                fcas_json TEXT NOT NULL,
                PRIMARY KEY (duid, settlement_ts, intervention)
            );
            CREATE INDEX IF NOT EXISTS idx_generator_dispatch_ts
                ON generator_dispatch(settlement_ts DESC);

            CREATE TABLE IF NOT EXISTS generator_scada (
                duid TEXT NOT NULL,
                settlement_ts INTEGER NOT NULL,
                scada_mw REAL NOT NULL,
                PRIMARY KEY (duid, settlement_ts)
            );
            CREATE INDEX IF NOT EXISTS idx_generator_scada_ts
                ON generator_scada(settlement_ts DESC);

            CREATE TABLE IF NOT EXISTS battery_dispatch (
                duid TEXT NOT NULL,
                settlement_ts INTEGER NOT NULL,
                initial_mw REAL NOT NULL,
                total_cleared_mw REAL NOT NULL,
                availability REAL NOT NULL,
                charge_mw REAL NOT NULL,
                discharge_mw REAL NOT NULL,
                mode TEXT NOT NULL,
                soc_percent REAL NOT NULL,
                energy_mwh REAL NOT NULL,
                fcas_json TEXT NOT NULL,
                station_name TEXT,
                region TEXT,
                nameplate_mw REAL,
                PRIMARY KEY (duid, settlement_ts)
            );
            CREATE INDEX IF NOT EXISTS idx_battery_dispatch_ts
                ON battery_dispatch(settlement_ts DESC);

            CREATE TABLE IF NOT EXISTS trading_prices (
                region TEXT NOT NULL,
                trading_ts INTEGER NOT NULL,
                rrp REAL NOT NULL,
                total_demand REAL NOT NULL,
                available_generation REAL NOT NULL,
                net_interchange REAL NOT NULL,
                PRIMARY KEY (region, trading_ts)
            );
            CREATE INDEX IF NOT EXISTS idx_trading_prices_ts
                ON trading_prices(trading_ts DESC);

            CREATE TABLE IF NOT EXISTS p5min_forecasts (
                run_ts INTEGER NOT NULL,
                interval_ts INTEGER NOT NULL,
                region TEXT NOT NULL,
                rrp REAL NOT NULL,
                total_demand REAL NOT NULL,
                available_generation REAL NOT NULL,
                net_interchange REAL NOT NULL,
                PRIMARY KEY (run_ts, interval_ts, region)
            );
            CREATE INDEX IF NOT EXISTS idx_p5min_forecasts_interval
                ON p5min_forecasts(interval_ts DESC);

            CREATE TABLE IF NOT EXISTS p5min_unit_forecasts (
                run_ts INTEGER NOT NULL,
                interval_ts INTEGER NOT NULL,
                duid TEXT NOT NULL,
                energy_mw REAL NOT NULL,
                availability REAL NOT NULL,
                PRIMARY KEY (run_ts, interval_ts, duid)
            );

            CREATE TABLE IF NOT EXISTS predispatch_forecasts (
                run_ts INTEGER NOT NULL,
                interval_ts INTEGER NOT NULL,
                region TEXT NOT NULL,
                rrp REAL NOT NULL,
                total_demand REAL NOT NULL,
                available_generation REAL NOT NULL,
                net_interchange REAL NOT NULL,
                PRIMARY KEY (run_ts, interval_ts, region)
            );
            CREATE INDEX IF NOT EXISTS idx_predispatch_forecasts_interval
                ON predispatch_forecasts(interval_ts DESC);

            CREATE TABLE IF NOT EXISTS predispatch_unit_solutions (
                run_ts INTEGER NOT NULL,
                interval_ts INTEGER NOT NULL,
                duid TEXT NOT NULL,
                energy_mw REAL NOT NULL,
                availability REAL NOT NULL,
                PRIMARY KEY (run_ts, interval_ts, duid)
            );

            CREATE TABLE IF NOT EXISTS stpasa_forecasts (
                run_ts INTEGER NOT NULL,
                interval_ts INTEGER NOT NULL,
                region TEXT NOT NULL,
                demand_10 REAL NOT NULL,
                demand_50 REAL NOT NULL,
                demand_90 REAL NOT NULL,
                aggregate_capacity REAL NOT NULL,
                surplus_capacity REAL NOT NULL,
                PRIMARY KEY (run_ts, interval_ts, region)
            );
            CREATE INDEX IF NOT EXISTS idx_stpasa_forecasts_interval
                ON stpasa_forecasts(interval_ts DESC);

            CREATE TABLE IF NOT EXISTS validation_log (
                run_ts INTEGER PRIMARY KEY,
                passed INTEGER NOT NULL,
                issues_json TEXT NOT NULL,
                warnings_json TEXT NOT NULL,
                metrics_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trading_positions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                region TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                entry_price REAL NOT NULL,
                entry_ts INTEGER NOT NULL,
                exit_price REAL,
                exit_ts INTEGER,
                pnl REAL,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trading_positions_user
                ON trading_positions(user_id, entry_ts DESC);

            CREATE TABLE IF NOT EXISTS hub_last_prices (
                region TEXT PRIMARY KEY,
                price REAL NOT NULL,
                total_demand REAL NOT NULL,
                available_generation REAL NOT NULL,
                net_interchange REAL NOT NULL,
                settlement_ts INTEGER NOT NULL
            );",
        )
        .context("create schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `write` for every row in transactions of at most [`MAX_BATCH`].
    /// A rejected batch is retried once as two halves before being dropped.
    async fn run_batched<T>(
        &self,
        rows: &[T],
        write: impl Fn(&Transaction<'_>, &T) -> Result<()>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;
        let mut written = 0usize;

        for chunk in rows.chunks(MAX_BATCH) {
            match Self::write_chunk(&mut conn, chunk, &write) {
                Ok(n) => written += n,
                Err(e) => {
                    warn!(error = %e, rows = chunk.len(), "batch rejected, retrying as halves");
                    let mid = chunk.len().div_ceil(2);
                    for half in [&chunk[..mid], &chunk[mid..]] {
                        if half.is_empty() {
                            continue;
                        }
                        match Self::write_chunk(&mut conn, half, &write) {
                            Ok(n) => written += n,
                            Err(e) => {
                                // Idempotent upserts let the next tick recover.
                                warn!(error = %e, rows = half.len(), "half-batch dropped");
                            }
                        }
                    }
                }
            }
        }

        Ok(written)
    }

    fn write_chunk<T>(
        conn: &mut Connection,
        chunk: &[T],
        write: &impl Fn(&Transaction<'_>, &T) -> Result<()>,
    ) -> Result<usize> {
        let tx = conn.transaction()?;
        for row in chunk {
            write(&tx, row)?;
        }
        tx.commit()?;
        Ok(chunk.len())
    }

    fn fcas_json(map: &BTreeMap<FcasService, impl serde::Serialize>) -> String {
        serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn upsert_dispatch_prices(&self, rows: &[DispatchPriceRow]) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO dispatch_prices
                 (region, settlement_ts, rrp, rop, apc_flag, total_demand,
                  available_generation, net_interchange, fcas_json, price_status, last_changed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(region, settlement_ts) DO UPDATE SET
                    rrp = excluded.rrp,
                    rop = excluded.rop,
                    apc_flag = excluded.apc_flag,
                    total_demand = excluded.total_demand,
                    available_generation = excluded.available_generation,
                    net_interchange = excluded.net_interchange,
                    fcas_json = excluded.fcas_json,
                    price_status = excluded.price_status,
                    last_changed = excluded.last_changed",
                params![
                    row.region.as_str(),
                    row.settlement_ts.timestamp(),
                    row.rrp,
                    row.rop,
                    row.apc_flag as i64,
                    row.total_demand,
                    row.available_generation,
                    row.net_interchange,
                    Self::fcas_json(&row.fcas),
                    row.price_status.as_deref(),
                    row.last_changed.map(|t| t.timestamp()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_fcas_prices(&self, rows: &[FcasPriceRow]) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO fcas_prices
                 (region, service, settlement_ts, price, enablement_min, enablement_max)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(region, service, settlement_ts) DO UPDATE SET
                    price = excluded.price,
                    enablement_min = excluded.enablement_min,
                    enablement_max = excluded.enablement_max",
                params![
                    row.region.as_str(),
                    row.service.as_str(),
                    row.settlement_ts.timestamp(),
                    row.price,
                    row.enablement_min,
                    row.enablement_max,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_interconnector_flows(
        &self,
        rows: &[InterconnectorFlowRow],
    ) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO interconnector_flows
                 (interconnector_id, settlement_ts, from_region, to_region, metered_mw,
                  mw_flow, mw_losses, export_limit, import_limit, marginal_value, violation_degree)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(interconnector_id, settlement_ts) DO UPDATE SET
                    from_region = excluded.from_region,
                    to_region = excluded.to_region,
                    metered_mw = excluded.metered_mw,
                    mw_flow = excluded.mw_flow,
                    mw_losses = excluded.mw_losses,
                    export_limit = excluded.export_limit,
                    import_limit = excluded.import_limit,
                    marginal_value = excluded.marginal_value,
                    violation_degree = excluded.violation_degree",
                params![
                    &row.interconnector_id,
                    row.settlement_ts.timestamp(),
                    &row.from_region,
                    &row.to_region,
                    row.metered_mw,
                    row.mw_flow,
                    row.mw_losses,
                    row.export_limit,
                    row.import_limit,
                    row.marginal_value,
                    row.violation_degree,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Binding constraints. Table created lazily on first write.
    pub async fn upsert_constraints(&self, rows: &[ConstraintRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        {
            let conn = self.conn.lock().await;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS constraints (
                    constraint_id TEXT NOT NULL,
                    settlement_ts INTEGER NOT NULL,
                    rhs REAL NOT NULL,
                    marginal_value REAL NOT NULL,
                    violation_degree REAL NOT NULL,
                    PRIMARY KEY (constraint_id, settlement_ts)
                );
                CREATE INDEX IF NOT EXISTS idx_constraints_ts
                    ON constraints(settlement_ts DESC);",
            )?;
        }
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO constraints
                 (constraint_id, settlement_ts, rhs, marginal_value, violation_degree)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(constraint_id, settlement_ts) DO UPDATE SET
                    rhs = excluded.rhs,
                    marginal_value = excluded.marginal_value,
                    violation_degree = excluded.violation_degree",
                params![
                    &row.constraint_id,
                    row.settlement_ts.timestamp(),
                    row.rhs,
                    row.marginal_value,
                    row.violation_degree,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_generator_dispatch(
        &self,
        rows: &[GeneratorDispatchRow],
    ) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO generator_dispatch
                 (duid, settlement_ts, intervention, initial_mw, total_cleared_mw,
                  ramp_up_rate, ramp_down_rate, availability, semi_dispatch_cap, fcas_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(duid, settlement_ts, intervention) DO UPDATE SET
                    initial_mw = excluded.initial_mw,
                    total_cleared_mw = excluded.total_cleared_mw,
                    ramp_up_rate = excluded.ramp_up_rate,
                    ramp_down_rate = excluded.ramp_down_rate,
                    availability = excluded.availability,
                    semi_dispatch_cap = excluded.semi_dispatch_cap,
                    fcas_json = excluded.fcas_json",
                params![
                    &row.duid,
                    row.settlement_ts.timestamp(),
                    row.intervention,
                    row.initial_mw,
                    row.total_cleared_mw,
                    row.ramp_up_rate,
                    row.ramp_down_rate,
                    row.availability,
                    row.semi_dispatch_cap as i64,
                    Self::fcas_json(&row.fcas_enabled_mw),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_scada(&self, rows: &[ScadaRow]) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO generator_scada (duid, settlement_ts, scada_mw)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(duid, settlement_ts) DO UPDATE SET
                    scada_mw = excluded.scada_mw",
                params![&row.duid, row.settlement_ts.timestamp(), row.scada_mw],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_battery_dispatch(
        &self,
        rows: &[BatteryDispatchRow],
    ) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO battery_dispatch
                 (duid, settlement_ts, initial_mw, total_cleared_mw, availability,
                  charge_mw, discharge_mw, mode, soc_percent, energy_mwh, fcas_json,
                  station_name, region, nameplate_mw)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(duid, settlement_ts) DO UPDATE SET
                    initial_mw = excluded.initial_mw,
                    total_cleared_mw = excluded.total_cleared_mw,
                    availability = excluded.availability,
                    charge_mw = excluded.charge_mw,
                    discharge_mw = excluded.discharge_mw,
                    mode = excluded.mode,
                    soc_percent = excluded.soc_percent,
                    energy_mwh = excluded.energy_mwh,
                    fcas_json = excluded.fcas_json,
                    station_name = excluded.station_name,
                    region = excluded.region,
                    nameplate_mw = excluded.nameplate_mw",
                params![
                    &row.duid,
                    row.settlement_ts.timestamp(),
                    row.initial_mw,
                    row.total_cleared_mw,
                    row.availability,
                    row.charge_mw,
                    row.discharge_mw,
                    match row.mode {
                        crate::models::BatteryMode::Charging => "charging",
                        crate::models::BatteryMode::Discharging => "discharging",
                        crate::models::BatteryMode::Standby => "standby",
                    },
                    row.soc_percent,
                    row.energy_mwh,
                    Self::fcas_json(&row.fcas_enabled_mw),
                    row.station_name.as_deref(),
                    row.region.map(|r| r.as_str()),
                    row.nameplate_mw,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_trading_prices(&self, rows: &[TradingPriceRow]) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO trading_prices
                 (region, trading_ts, rrp, total_demand, available_generation, net_interchange)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(region, trading_ts) DO UPDATE SET
                    rrp = excluded.rrp,
                    total_demand = excluded.total_demand,
                    available_generation = excluded.available_generation,
                    net_interchange = excluded.net_interchange",
                params![
                    row.region.as_str(),
                    row.trading_ts.timestamp(),
                    row.rrp,
                    row.total_demand,
                    row.available_generation,
                    row.net_interchange,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_p5min_forecasts(&self, rows: &[P5minRegionForecast]) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO p5min_forecasts
                 (run_ts, interval_ts, region, rrp, total_demand, available_generation, net_interchange)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(run_ts, interval_ts, region) DO UPDATE SET
                    rrp = excluded.rrp,
                    total_demand = excluded.total_demand,
                    available_generation = excluded.available_generation,
                    net_interchange = excluded.net_interchange",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    row.region.as_str(),
                    row.rrp,
                    row.total_demand,
                    row.available_generation,
                    row.net_interchange,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_p5min_unit_forecasts(
        &self,
        rows: &[P5minUnitForecast],
    ) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO p5min_unit_forecasts
                 (run_ts, interval_ts, duid, energy_mw, availability)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_ts, interval_ts, duid) DO UPDATE SET
                    energy_mw = excluded.energy_mw,
                    availability = excluded.availability",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    &row.duid,
                    row.energy_mw,
                    row.availability,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_predispatch_forecasts(
        &self,
        rows: &[PredispatchRegionRow],
    ) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO predispatch_forecasts
                 (run_ts, interval_ts, region, rrp, total_demand, available_generation, net_interchange)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(run_ts, interval_ts, region) DO UPDATE SET
                    rrp = excluded.rrp,
                    total_demand = excluded.total_demand,
                    available_generation = excluded.available_generation,
                    net_interchange = excluded.net_interchange",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    row.region.as_str(),
                    row.rrp,
                    row.total_demand,
                    row.available_generation,
                    row.net_interchange,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_predispatch_unit_solutions(
        &self,
        rows: &[PredispatchUnitRow],
    ) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO predispatch_unit_solutions
                 (run_ts, interval_ts, duid, energy_mw, availability)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_ts, interval_ts, duid) DO UPDATE SET
                    energy_mw = excluded.energy_mw,
                    availability = excluded.availability",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    &row.duid,
                    row.energy_mw,
                    row.availability,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Predispatch interconnector forecasts; table created lazily.
    pub async fn upsert_predispatch_interconnectors(
        &self,
        rows: &[InterconnectorForecast],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        {
            let conn = self.conn.lock().await;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS predispatch_interconnectors (
                    run_ts INTEGER NOT NULL,
                    interval_ts INTEGER NOT NULL,
                    interconnector_id TEXT NOT NULL,
                    mw_flow REAL NOT NULL,
                    export_limit REAL NOT NULL,
                    import_limit REAL NOT NULL,
                    PRIMARY KEY (run_ts, interval_ts, interconnector_id)
                );",
            )?;
        }
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO predispatch_interconnectors
                 (run_ts, interval_ts, interconnector_id, mw_flow, export_limit, import_limit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(run_ts, interval_ts, interconnector_id) DO UPDATE SET
                    mw_flow = excluded.mw_flow,
                    export_limit = excluded.export_limit,
                    import_limit = excluded.import_limit",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    &row.interconnector_id,
                    row.mw_flow,
                    row.export_limit,
                    row.import_limit,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Predispatch constraint forecasts; table created lazily.
    pub async fn upsert_predispatch_constraints(
        &self,
        rows: &[ConstraintForecast],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        {
            let conn = self.conn.lock().await;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS predispatch_constraints (
                    run_ts INTEGER NOT NULL,
                    interval_ts INTEGER NOT NULL,
                    constraint_id TEXT NOT NULL,
                    rhs REAL NOT NULL,
                    marginal_value REAL NOT NULL,
                    PRIMARY KEY (run_ts, interval_ts, constraint_id)
                );",
            )?;
        }
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO predispatch_constraints
                 (run_ts, interval_ts, constraint_id, rhs, marginal_value)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_ts, interval_ts, constraint_id) DO UPDATE SET
                    rhs = excluded.rhs,
                    marginal_value = excluded.marginal_value",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    &row.constraint_id,
                    row.rhs,
                    row.marginal_value,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_stpasa_forecasts(&self, rows: &[StpasaRegionRow]) -> Result<usize> {
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO stpasa_forecasts
                 (run_ts, interval_ts, region, demand_10, demand_50, demand_90,
                  aggregate_capacity, surplus_capacity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(run_ts, interval_ts, region) DO UPDATE SET
                    demand_10 = excluded.demand_10,
                    demand_50 = excluded.demand_50,
                    demand_90 = excluded.demand_90,
                    aggregate_capacity = excluded.aggregate_capacity,
                    surplus_capacity = excluded.surplus_capacity",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    row.region.as_str(),
                    row.demand_10,
                    row.demand_50,
                    row.demand_90,
                    row.aggregate_capacity,
                    row.surplus_capacity,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// ST PASA per-unit availability; table created lazily.
    pub async fn upsert_stpasa_unit_availability(
        &self,
        rows: &[StpasaUnitAvailability],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        {
            let conn = self.conn.lock().await;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS stpasa_unit_availability (
                    run_ts INTEGER NOT NULL,
                    interval_ts INTEGER NOT NULL,
                    duid TEXT NOT NULL,
                    pasa_availability REAL NOT NULL,
                    PRIMARY KEY (run_ts, interval_ts, duid)
                );",
            )?;
        }
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO stpasa_unit_availability
                 (run_ts, interval_ts, duid, pasa_availability)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_ts, interval_ts, duid) DO UPDATE SET
                    pasa_availability = excluded.pasa_availability",
                params![
                    row.run_ts.timestamp(),
                    row.interval_ts.timestamp(),
                    &row.duid,
                    row.pasa_availability,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Fuel-mix rollup rows; table created lazily.
    pub async fn upsert_generation_by_fuel(&self, rows: &[FuelRollupRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        {
            let conn = self.conn.lock().await;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS generation_by_fuel (
                    fuel_type TEXT NOT NULL,
                    settlement_ts INTEGER NOT NULL,
                    region TEXT NOT NULL,
                    category TEXT NOT NULL,
                    total_mw REAL NOT NULL,
                    unit_count INTEGER NOT NULL,
                    PRIMARY KEY (fuel_type, settlement_ts, region)
                );
                CREATE INDEX IF NOT EXISTS idx_generation_by_fuel_ts
                    ON generation_by_fuel(settlement_ts DESC);",
            )?;
        }
        self.run_batched(rows, |tx, row| {
            tx.execute(
                "INSERT INTO generation_by_fuel
                 (fuel_type, settlement_ts, region, category, total_mw, unit_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(fuel_type, settlement_ts, region) DO UPDATE SET
                    category = excluded.category,
                    total_mw = excluded.total_mw,
                    unit_count = excluded.unit_count",
                params![
                    &row.fuel_type,
                    row.settlement_ts.timestamp(),
                    &row.region,
                    &row.category,
                    row.total_mw,
                    row.unit_count as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    fn ts_from_unix(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
    }

    fn row_to_dispatch_price(row: &rusqlite::Row<'_>) -> rusqlite::Result<DispatchPriceRow> {
        let region: String = row.get(0)?;
        let fcas_json: String = row.get(8)?;
        Ok(DispatchPriceRow {
            region: Region::parse(&region).unwrap_or(Region::NSW1),
            settlement_ts: Self::ts_from_unix(row.get(1)?),
            rrp: row.get(2)?,
            rop: row.get(3)?,
            apc_flag: row.get::<_, i64>(4)? != 0,
            total_demand: row.get(5)?,
            available_generation: row.get(6)?,
            net_interchange: row.get(7)?,
            fcas: serde_json::from_str(&fcas_json).unwrap_or_default(),
            price_status: row.get(9)?,
            last_changed: row.get::<_, Option<i64>>(10)?.map(Self::ts_from_unix),
        })
    }

    /// Rows for the most recent settlement interval across all regions.
    pub async fn latest_dispatch_prices(&self) -> Result<Vec<DispatchPriceRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT region, settlement_ts, rrp, rop, apc_flag, total_demand,
                    available_generation, net_interchange, fcas_json, price_status, last_changed
             FROM dispatch_prices
             WHERE settlement_ts = (SELECT MAX(settlement_ts) FROM dispatch_prices)
             ORDER BY region ASC",
        )?;
        let rows = stmt.query_map([], |row| Self::row_to_dispatch_price(row))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn dispatch_price_history(
        &self,
        region: Region,
        since: DateTime<Utc>,
    ) -> Result<Vec<DispatchPriceRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT region, settlement_ts, rrp, rop, apc_flag, total_demand,
                    available_generation, net_interchange, fcas_json, price_status, last_changed
             FROM dispatch_prices
             WHERE region = ?1 AND settlement_ts >= ?2
             ORDER BY settlement_ts DESC",
        )?;
        let rows = stmt.query_map(params![region.as_str(), since.timestamp()], |row| {
            Self::row_to_dispatch_price(row)
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Latest non-zero price per (region, service).
    pub async fn latest_fcas_prices(&self) -> Result<Vec<FcasPriceRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT f.region, f.service, f.settlement_ts, f.price, f.enablement_min, f.enablement_max
             FROM fcas_prices f
             WHERE f.settlement_ts = (
                 SELECT MAX(settlement_ts) FROM fcas_prices
                 WHERE region = f.region AND service = f.service
             )
             ORDER BY f.region, f.service",
        )?;
        let rows = stmt.query_map([], |row| {
            let region: String = row.get(0)?;
            let service: String = row.get(1)?;
            Ok((region, service, row.get::<_, i64>(2)?, row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?, row.get::<_, f64>(5)?))
        })?;
        let mut out = Vec::new();
        for r in rows.filter_map(|r| r.ok()) {
            let (region, service, ts, price, emin, emax) = r;
            let (Some(region), Some(service)) =
                (Region::parse(&region), FcasService::parse(&service))
            else {
                continue;
            };
            out.push(FcasPriceRow {
                region,
                service,
                settlement_ts: Self::ts_from_unix(ts),
                price,
                enablement_min: emin,
                enablement_max: emax,
            });
        }
        Ok(out)
    }

    /// Predispatch intervals for a region falling on the given trading day,
    /// most recent run winning per interval.
    pub async fn forward_curve(
        &self,
        region: Region,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<PredispatchRegionRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT run_ts, interval_ts, region, rrp, total_demand,
                    available_generation, net_interchange
             FROM predispatch_forecasts p
             WHERE region = ?1 AND interval_ts >= ?2 AND interval_ts < ?3
               AND run_ts = (
                   SELECT MAX(run_ts) FROM predispatch_forecasts
                   WHERE region = p.region AND interval_ts = p.interval_ts
               )
             ORDER BY interval_ts ASC",
        )?;
        let rows = stmt.query_map(
            params![region.as_str(), day_start.timestamp(), day_end.timestamp()],
            |row| {
                let region: String = row.get(2)?;
                Ok(PredispatchRegionRow {
                    run_ts: Self::ts_from_unix(row.get(0)?),
                    interval_ts: Self::ts_from_unix(row.get(1)?),
                    region: Region::parse(&region).unwrap_or(Region::NSW1),
                    rrp: row.get(3)?,
                    total_demand: row.get(4)?,
                    available_generation: row.get(5)?,
                    net_interchange: row.get(6)?,
                })
            },
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Forward demand series from P5MIN (first hour) and predispatch beyond.
    pub async fn demand_forecast(
        &self,
        region: Region,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let conn = self.conn.lock().await;
        let mut out: Vec<(DateTime<Utc>, f64)> = Vec::new();

        let mut stmt = conn.prepare_cached(
            "SELECT interval_ts, total_demand FROM p5min_forecasts p
             WHERE region = ?1 AND interval_ts > ?2 AND interval_ts <= ?3
               AND run_ts = (
                   SELECT MAX(run_ts) FROM p5min_forecasts
                   WHERE region = p.region AND interval_ts = p.interval_ts
               )
             ORDER BY interval_ts ASC",
        )?;
        let rows = stmt.query_map(
            params![region.as_str(), from.timestamp(), to.timestamp()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        for r in rows.filter_map(|r| r.ok()) {
            out.push((Self::ts_from_unix(r.0), r.1));
        }

        let after = out.last().map(|(ts, _)| ts.timestamp()).unwrap_or(from.timestamp());
        let mut stmt = conn.prepare_cached(
            "SELECT interval_ts, total_demand FROM predispatch_forecasts p
             WHERE region = ?1 AND interval_ts > ?2 AND interval_ts <= ?3
               AND run_ts = (
                   SELECT MAX(run_ts) FROM predispatch_forecasts
                   WHERE region = p.region AND interval_ts = p.interval_ts
               )
             ORDER BY interval_ts ASC",
        )?;
        let rows = stmt.query_map(
            params![region.as_str(), after, to.timestamp()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        for r in rows.filter_map(|r| r.ok()) {
            out.push((Self::ts_from_unix(r.0), r.1));
        }

        Ok(out)
    }

    // ---- Validator query surface ----

    pub async fn max_ts(&self, table: &str, ts_column: &str) -> Result<Option<DateTime<Utc>>> {
        // Identifiers come from a fixed internal set, never user input.
        let sql = format!("SELECT MAX({ts_column}) FROM {table}");
        let conn = self.conn.lock().await;
        let max: Option<i64> = conn
            .query_row(&sql, [], |row| row.get(0))
            .unwrap_or(None);
        Ok(max.map(Self::ts_from_unix))
    }

    pub async fn distinct_count_since(
        &self,
        table: &str,
        column: &str,
        ts_column: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT {column}) FROM {table} WHERE {ts_column} >= ?1"
        );
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&sql, params![since.timestamp()], |row| row.get(0))?;
        Ok(count)
    }

    /// (sum generation, sum demand) at the latest dispatch interval.
    pub async fn latest_balance(&self) -> Result<Option<(f64, f64)>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT SUM(available_generation), SUM(total_demand)
             FROM dispatch_prices
             WHERE settlement_ts = (SELECT MAX(settlement_ts) FROM dispatch_prices)",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<f64>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                ))
            },
        );
        match result {
            Ok((Some(gen), Some(demand))) => Ok(Some((gen, demand))),
            _ => Ok(None),
        }
    }

    pub async fn price_range_violations_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dispatch_prices
             WHERE settlement_ts >= ?1 AND (rrp < -1000.0 OR rrp > 16600.0)",
            params![since.timestamp()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn soc_range_violations_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM battery_dispatch
             WHERE settlement_ts >= ?1 AND (soc_percent < 0.0 OR soc_percent > 100.0)",
            params![since.timestamp()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn future_interval_count(
        &self,
        table: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT interval_ts) FROM {table} WHERE interval_ts > ?1"
        );
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&sql, params![now.timestamp()], |row| row.get(0))?;
        Ok(count)
    }

    // ---- Validation log ----

    pub async fn insert_validation_report(&self, report: &ValidationReport) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO validation_log
             (run_ts, passed, issues_json, warnings_json, metrics_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.run_ts.timestamp(),
                report.passed as i64,
                serde_json::to_string(&report.issues)?,
                serde_json::to_string(&report.warnings)?,
                serde_json::to_string(&report.metrics)?,
            ],
        )?;
        Ok(())
    }

    pub async fn prune_validation_log(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM validation_log WHERE run_ts < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(deleted)
    }

    // ---- Trading positions ----

    pub async fn insert_position(&self, position: &Position) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trading_positions
             (id, user_id, region, side, quantity, entry_price, entry_ts, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &position.id,
                &position.user_id,
                position.region.as_str(),
                position.side.as_str(),
                position.quantity,
                position.entry_price,
                position.entry_ts.timestamp(),
                position.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_position(&self, id: &str, user_id: &str) -> Result<Option<Position>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, region, side, quantity, entry_price, entry_ts,
                    exit_price, exit_ts, pnl, status
             FROM trading_positions WHERE id = ?1 AND user_id = ?2",
        )?;
        let mut rows = stmt.query(params![id, user_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(Self::row_to_position(row)?))
    }

    fn row_to_position(row: &rusqlite::Row<'_>) -> Result<Position> {
        let region: String = row.get(2)?;
        let side: String = row.get(3)?;
        let status: String = row.get(10)?;
        Ok(Position {
            id: row.get(0)?,
            user_id: row.get(1)?,
            region: Region::parse(&region)
                .ok_or_else(|| anyhow::anyhow!("bad region in positions table: {region}"))?,
            side: PositionSide::parse(&side)
                .ok_or_else(|| anyhow::anyhow!("bad side in positions table: {side}"))?,
            quantity: row.get(4)?,
            entry_price: row.get(5)?,
            entry_ts: Self::ts_from_unix(row.get(6)?),
            exit_price: row.get(7)?,
            exit_ts: row.get::<_, Option<i64>>(8)?.map(Self::ts_from_unix),
            pnl: row.get(9)?,
            status: if status == "CLOSED" {
                PositionStatus::Closed
            } else {
                PositionStatus::Open
            },
        })
    }

    /// Atomically close an OPEN position owned by `user_id`. Returns the
    /// number of rows changed: 0 means unknown id, wrong owner, or already
    /// closed.
    pub async fn close_position(
        &self,
        id: &str,
        user_id: &str,
        exit_price: f64,
        exit_ts: DateTime<Utc>,
        pnl: f64,
    ) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE trading_positions
             SET exit_price = ?1, exit_ts = ?2, pnl = ?3, status = 'CLOSED'
             WHERE id = ?4 AND user_id = ?5 AND status = 'OPEN'",
            params![exit_price, exit_ts.timestamp(), pnl, id, user_id],
        )?;
        Ok(changed)
    }

    pub async fn list_positions(&self, user_id: &str, limit: usize) -> Result<Vec<Position>> {
        let limit = limit.clamp(1, 100) as i64;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, region, side, quantity, entry_price, entry_ts,
                    exit_price, exit_ts, pnl, status
             FROM trading_positions
             WHERE user_id = ?1
             ORDER BY entry_ts DESC LIMIT ?2",
        )?;
        let mut out = Vec::new();
        let mut rows = stmt.query(params![user_id, limit])?;
        while let Some(row) = rows.next()? {
            out.push(Self::row_to_position(row)?);
        }
        Ok(out)
    }

    // ---- Hub last-known prices ----

    pub async fn upsert_hub_prices(&self, prices: &[RegionPrice]) -> Result<()> {
        let conn = self.conn.lock().await;
        for p in prices {
            conn.execute(
                "INSERT INTO hub_last_prices
                 (region, price, total_demand, available_generation, net_interchange, settlement_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(region) DO UPDATE SET
                    price = excluded.price,
                    total_demand = excluded.total_demand,
                    available_generation = excluded.available_generation,
                    net_interchange = excluded.net_interchange,
                    settlement_ts = excluded.settlement_ts",
                params![
                    p.region.as_str(),
                    p.price,
                    p.total_demand,
                    p.available_generation,
                    p.net_interchange,
                    p.settlement_ts.timestamp(),
                ],
            )?;
        }
        Ok(())
    }

    pub async fn load_hub_prices(&self) -> Result<Vec<RegionPrice>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT region, price, total_demand, available_generation, net_interchange, settlement_ts
             FROM hub_last_prices ORDER BY region ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let region: String = row.get(0)?;
            Ok((
                region,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows.filter_map(|r| r.ok()) {
            let Some(region) = Region::parse(&r.0) else {
                continue;
            };
            out.push(RegionPrice {
                region,
                price: r.1,
                total_demand: r.2,
                available_generation: r.3,
                net_interchange: r.4,
                settlement_ts: Self::ts_from_unix(r.5),
            });
        }
        Ok(out)
    }

    /// Trading-price history for the BESS sweep.
    pub async fn trading_price_series(
        &self,
        region: Region,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT trading_ts, rrp FROM trading_prices
             WHERE region = ?1 AND trading_ts >= ?2 AND trading_ts < ?3
             ORDER BY trading_ts ASC",
        )?;
        let rows = stmt.query_map(
            params![region.as_str(), from.timestamp(), to.timestamp()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        Ok(rows
            .filter_map(|r| r.ok())
            .map(|(ts, rrp)| (Self::ts_from_unix(ts), rrp))
            .collect())
    }

    /// Dispatch-price history (5-minute) for the same sweep when trading
    /// rows are sparse.
    pub async fn dispatch_price_series(
        &self,
        region: Region,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT settlement_ts, rrp FROM dispatch_prices
             WHERE region = ?1 AND settlement_ts >= ?2 AND settlement_ts < ?3
             ORDER BY settlement_ts ASC",
        )?;
        let rows = stmt.query_map(
            params![region.as_str(), from.timestamp(), to.timestamp()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        Ok(rows
            .filter_map(|r| r.ok())
            .map(|(ts, rrp)| (Self::ts_from_unix(ts), rrp))
            .collect())
    }

    /// Row count of a table (test and diagnostics helper).
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).unwrap_or(0);
        Ok(count)
    }
}
