//! Scheduled ingestion orchestrator.
//!
//! Every 5 minutes: fan out to the critical sources in parallel, walk the
//! less critical ones sequentially with a rate-limit gap, run the time-gated
//! sources when their window hits, and validate on the quarter hour. Each
//! source runs inside its own error boundary; one failure never aborts the
//! tick, and idempotent upserts let the next tick repair anything dropped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::alerts;
use crate::config::Config;
use crate::hub::LiveHub;
use crate::models::{DispatchBundle, RegionPrice, ScadaRow};
use crate::parsers::{battery::SocTracker, merge, ParserRegistry};
use crate::scrapers::{self, DirectoryScanner, ReportFamily};
use crate::storage::{self, ArchiveMeta, ArchiveStore, KvStore, Store};
use crate::timemap;
use crate::validator::Validator;

const SOURCE_TIMEOUT: Duration = Duration::from_secs(60);
const SEQUENTIAL_GAP: Duration = Duration::from_millis(500);

/// Terminal state of one source for one tick.
#[derive(Debug)]
pub enum SourceOutcome {
    NoFile,
    FetchFail(String),
    ParseFail(String),
    PersistFail(String),
    Done { rows: usize },
}

fn log_outcome(family: &str, outcome: &SourceOutcome) {
    match outcome {
        SourceOutcome::Done { rows } => {
            info!(source = family, rows, "source ingested");
        }
        SourceOutcome::NoFile => {
            info!(source = family, "no new file this tick");
        }
        SourceOutcome::FetchFail(e) => {
            warn!(source = family, error = %e, "fetch failed, skipping for this tick");
        }
        SourceOutcome::ParseFail(e) => {
            warn!(source = family, error = %e, "parse failed, raw archive preserved");
        }
        SourceOutcome::PersistFail(e) => {
            warn!(source = family, error = %e, "persist failed, next tick recovers");
        }
    }
}

struct FetchedBundle {
    filename: String,
    csv: String,
    byte_len: usize,
}

pub struct Orchestrator {
    config: Config,
    client: reqwest::Client,
    store: Store,
    archive: Arc<ArchiveStore>,
    kv: Arc<KvStore>,
    hub: LiveHub,
    registry: Arc<ParserRegistry>,
    soc_tracker: Mutex<SocTracker>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        client: reqwest::Client,
        store: Store,
        archive: Arc<ArchiveStore>,
        kv: Arc<KvStore>,
        hub: LiveHub,
    ) -> Self {
        Self {
            config,
            client,
            store,
            archive,
            kv,
            hub,
            registry: Arc::new(ParserRegistry::standard()),
            soc_tracker: Mutex::new(SocTracker::new()),
        }
    }

    /// Run one full tick. Called by the scheduler and by `POST /trigger`.
    pub async fn run_tick(self: &Arc<Self>, now: DateTime<Utc>) {
        info!(tick = %now.to_rfc3339(), "ingestion tick starting");

        // Parallel group: dispatch, SCADA, P5MIN. Joined with a per-source
        // timeout; data flows into the sequential group below.
        let dispatch_task = {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::timeout(SOURCE_TIMEOUT, this.run_dispatch(now)).await
            })
        };
        let scada_task = {
            let this = self.clone();
            tokio::spawn(
                async move { tokio::time::timeout(SOURCE_TIMEOUT, this.run_scada()).await },
            )
        };
        let p5min_task = {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::timeout(SOURCE_TIMEOUT, async move {
                    (this.run_p5min(now).await, ())
                })
                .await
            })
        };

        let dispatch_bundle = join_source("dispatch", dispatch_task).await.flatten();
        let scada_rows = join_source("scada", scada_task).await.unwrap_or_default();
        let _ = join_source("p5min", p5min_task).await;

        // Sequential group, rate-limited.
        let next_day_units = {
            let (outcome, units) = self.run_next_day_dispatch().await;
            log_outcome("next_day_dispatch", &outcome);
            units
        };
        tokio::time::sleep(SEQUENTIAL_GAP).await;

        log_outcome("trading", &self.run_trading().await);
        tokio::time::sleep(SEQUENTIAL_GAP).await;

        log_outcome(
            "battery",
            &self.run_battery(&next_day_units, &scada_rows).await,
        );
        tokio::time::sleep(SEQUENTIAL_GAP).await;

        // Derived from dispatch, so it always runs after the fan-out joined.
        log_outcome("fcas", &self.run_fcas(dispatch_bundle.as_ref()).await);
        tokio::time::sleep(SEQUENTIAL_GAP).await;

        log_outcome("fuel_rollup", &self.run_fuel_rollup(&scada_rows).await);

        // Time-gated sources.
        let minute = now.minute();
        if matches!(minute, 0 | 5 | 30 | 35) {
            log_outcome("predispatch", &self.run_predispatch(now).await);
        }
        if self.is_stpasa_window(now) {
            log_outcome("stpasa", &self.run_stpasa(now).await);
        }

        // Validation on the quarter hour.
        if minute % 15 == 0 {
            self.run_validation(now).await;
        }

        info!(tick = %now.to_rfc3339(), "ingestion tick complete");
    }

    fn is_stpasa_window(&self, now: DateTime<Utc>) -> bool {
        let market = now.with_timezone(
            &FixedOffset::east_opt(timemap::MARKET_OFFSET_SECS).expect("fixed offset"),
        );
        market.hour() == 1 && market.minute() < 5
    }

    /// Scan the family index, download the newest archive, write the raw
    /// bytes, and decode the tabular member. `None` means no file published.
    async fn fetch_family(&self, family: ReportFamily) -> Result<Option<FetchedBundle>> {
        self.fetch_family_from(&self.config.report_base_url, family)
            .await
    }

    async fn fetch_family_from(
        &self,
        base_url: &str,
        family: ReportFamily,
    ) -> Result<Option<FetchedBundle>> {
        let scanner = DirectoryScanner::new(self.client.clone(), base_url);
        let files = scanner.scan(family).await.context("scan index")?;
        let Some(latest) = DirectoryScanner::latest(&files, family) else {
            return Ok(None);
        };

        let url = format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            family.dir(),
            latest
        );
        let bytes = scrapers::fetch(&self.client, &url).await.context("fetch archive")?;
        let byte_len = bytes.len();

        // Raw evidence first; a parse failure later must not lose the bytes.
        let meta = ArchiveMeta {
            source: base_url.to_string(),
            family: family.slug().to_string(),
            timestamp: Utc::now(),
            record_count: None,
        };
        if let Err(e) = self
            .archive
            .put_raw(family, Utc::now(), &latest, bytes.clone(), &meta)
            .await
        {
            warn!(family = family.slug(), error = %e, "raw archive write failed");
        }

        let csv = scrapers::extract_csv(&bytes, family).context("extract bundle")?;
        Ok(Some(FetchedBundle {
            filename: latest,
            csv,
            byte_len,
        }))
    }

    async fn run_dispatch(&self, _now: DateTime<Utc>) -> (SourceOutcome, Option<DispatchBundle>) {
        let fetched = match self.fetch_family(ReportFamily::Dispatch).await {
            Ok(Some(f)) => f,
            Ok(None) => return (SourceOutcome::NoFile, None),
            Err(e) => return (classify_fetch_error(&e), None),
        };

        let outcome = self.registry.parse(&fetched.csv);
        if outcome.records.is_empty() {
            return (
                SourceOutcome::ParseFail(format!(
                    "{} yielded no records ({} skipped)",
                    fetched.filename, outcome.skipped_rows
                )),
                None,
            );
        }
        let bundle = merge::merge_dispatch(outcome.records);

        let mut rows = 0usize;
        for result in [
            self.store.upsert_dispatch_prices(&bundle.prices).await,
            self.store
                .upsert_interconnector_flows(&bundle.interconnectors)
                .await,
            self.store.upsert_constraints(&bundle.constraints).await,
            self.store.upsert_generator_dispatch(&bundle.units).await,
        ] {
            match result {
                Ok(n) => rows += n,
                Err(e) => return (SourceOutcome::PersistFail(format!("{e:#}")), Some(bundle)),
            }
        }

        // Fan the freshest slice out: hub subscribers and the hot cache.
        let prices: Vec<RegionPrice> =
            bundle.prices.iter().map(RegionPrice::from_dispatch).collect();
        storage::write_price_snapshots(&self.kv, &prices);
        self.hub.broadcast(prices).await;

        (SourceOutcome::Done { rows }, Some(bundle))
    }

    async fn run_scada(&self) -> (SourceOutcome, Vec<ScadaRow>) {
        let fetched = match self.fetch_family(ReportFamily::Scada).await {
            Ok(Some(f)) => f,
            Ok(None) => return (SourceOutcome::NoFile, Vec::new()),
            Err(e) => return (classify_fetch_error(&e), Vec::new()),
        };

        let outcome = self.registry.parse(&fetched.csv);
        let rows = merge::collect_scada(outcome.records);
        if rows.is_empty() {
            return (
                SourceOutcome::ParseFail(format!("{} had no SCADA rows", fetched.filename)),
                Vec::new(),
            );
        }

        match self.store.upsert_scada(&rows).await {
            Ok(n) => (SourceOutcome::Done { rows: n }, rows),
            Err(e) => (SourceOutcome::PersistFail(format!("{e:#}")), rows),
        }
    }

    async fn run_p5min(&self, now: DateTime<Utc>) -> SourceOutcome {
        let fetched = match self.fetch_family(ReportFamily::P5min).await {
            Ok(Some(f)) => f,
            Ok(None) => return SourceOutcome::NoFile,
            Err(e) => return classify_fetch_error(&e),
        };

        let outcome = self.registry.parse(&fetched.csv);
        let (regions, units) = merge::collect_p5min(outcome.records);
        if regions.is_empty() && units.is_empty() {
            return SourceOutcome::ParseFail(format!(
                "{} had no P5MIN rows",
                fetched.filename
            ));
        }

        let mut rows = 0usize;
        for result in [
            self.store.upsert_p5min_forecasts(&regions).await,
            self.store.upsert_p5min_unit_forecasts(&units).await,
        ] {
            match result {
                Ok(n) => rows += n,
                Err(e) => return SourceOutcome::PersistFail(format!("{e:#}")),
            }
        }

        // Refresh the forward demand snapshots while the forecast is warm.
        for region in crate::models::Region::ALL {
            if let Ok(series) = self
                .store
                .demand_forecast(region, now, now + chrono::Duration::hours(24))
                .await
            {
                if !series.is_empty() {
                    storage::write_demand_forecast_snapshot(&self.kv, region, &series);
                }
            }
        }

        SourceOutcome::Done { rows }
    }

    async fn run_next_day_dispatch(
        &self,
    ) -> (SourceOutcome, Vec<crate::models::GeneratorDispatchRow>) {
        let fetched = match self.fetch_family(ReportFamily::NextDayDispatch).await {
            Ok(Some(f)) => f,
            Ok(None) => return (SourceOutcome::NoFile, Vec::new()),
            Err(e) => return (classify_fetch_error(&e), Vec::new()),
        };

        let outcome = self.registry.parse(&fetched.csv);
        let bundle = merge::merge_dispatch(outcome.records);
        // Zero UNIT rows intraday is expected; the end-of-day archive is the
        // real source of unit solutions.
        match self.store.upsert_generator_dispatch(&bundle.units).await {
            Ok(n) => (SourceOutcome::Done { rows: n }, bundle.units),
            Err(e) => (SourceOutcome::PersistFail(format!("{e:#}")), bundle.units),
        }
    }

    async fn run_trading(&self) -> SourceOutcome {
        // Current window first; it is often empty, in which case the archive
        // window is authoritative.
        let fetched = match self.fetch_family(ReportFamily::Trading).await {
            Ok(Some(f)) => Some(f),
            Ok(None) => {
                warn!("trading current window empty, falling back to archive window");
                let archive_base = self
                    .config
                    .report_base_url
                    .replace("/Current", "/Archive");
                match self
                    .fetch_family_from(&archive_base, ReportFamily::Trading)
                    .await
                {
                    Ok(f) => f,
                    Err(e) => return classify_fetch_error(&e),
                }
            }
            Err(e) => return classify_fetch_error(&e),
        };
        let Some(fetched) = fetched else {
            return SourceOutcome::NoFile;
        };

        let outcome = self.registry.parse(&fetched.csv);
        let rows = merge::merge_trading(outcome.records);
        if rows.is_empty() {
            return SourceOutcome::ParseFail(format!(
                "{} had no trading rows",
                fetched.filename
            ));
        }

        match self.store.upsert_trading_prices(&rows).await {
            Ok(n) => SourceOutcome::Done { rows: n },
            Err(e) => SourceOutcome::PersistFail(format!("{e:#}")),
        }
    }

    async fn run_battery(
        &self,
        units: &[crate::models::GeneratorDispatchRow],
        scada: &[ScadaRow],
    ) -> SourceOutcome {
        let mut tracker = self.soc_tracker.lock().await;
        let rows = crate::parsers::battery::derive_battery_rows(
            units,
            scada,
            &mut tracker,
            self.config.battery_efficiency,
        );
        drop(tracker);

        if rows.is_empty() {
            return SourceOutcome::NoFile;
        }
        match self.store.upsert_battery_dispatch(&rows).await {
            Ok(n) => SourceOutcome::Done { rows: n },
            Err(e) => SourceOutcome::PersistFail(format!("{e:#}")),
        }
    }

    async fn run_fcas(&self, bundle: Option<&DispatchBundle>) -> SourceOutcome {
        let Some(bundle) = bundle else {
            return SourceOutcome::NoFile;
        };
        if bundle.fcas.is_empty() {
            return SourceOutcome::NoFile;
        }

        match self.store.upsert_fcas_prices(&bundle.fcas).await {
            Ok(n) => {
                storage::write_fcas_snapshot(&self.kv, &bundle.fcas);
                SourceOutcome::Done { rows: n }
            }
            Err(e) => SourceOutcome::PersistFail(format!("{e:#}")),
        }
    }

    async fn run_fuel_rollup(&self, scada: &[ScadaRow]) -> SourceOutcome {
        let rows = storage::fuel_rollup(scada);
        if rows.is_empty() {
            return SourceOutcome::NoFile;
        }
        match self.store.upsert_generation_by_fuel(&rows).await {
            Ok(n) => SourceOutcome::Done { rows: n },
            Err(e) => SourceOutcome::PersistFail(format!("{e:#}")),
        }
    }

    async fn run_predispatch(&self, now: DateTime<Utc>) -> SourceOutcome {
        let fetched = match self.fetch_family(ReportFamily::Predispatch).await {
            Ok(Some(f)) => f,
            Ok(None) => return SourceOutcome::NoFile,
            Err(e) => return classify_fetch_error(&e),
        };

        let outcome = self.registry.parse(&fetched.csv);
        let bundle = merge::merge_predispatch(outcome.records);
        if bundle.regions.is_empty() {
            return SourceOutcome::ParseFail(format!(
                "{} had no predispatch rows",
                fetched.filename
            ));
        }

        let mut rows = 0usize;
        for result in [
            self.store.upsert_predispatch_forecasts(&bundle.regions).await,
            self.store
                .upsert_predispatch_unit_solutions(&bundle.units)
                .await,
            self.store
                .upsert_predispatch_interconnectors(&bundle.interconnectors)
                .await,
            self.store
                .upsert_predispatch_constraints(&bundle.constraints)
                .await,
        ] {
            match result {
                Ok(n) => rows += n,
                Err(e) => return SourceOutcome::PersistFail(format!("{e:#}")),
            }
        }

        // Forward-curve snapshots for today's market date.
        let market_date = timemap::format_utc_as_market(now)[..10].replace('/', "-");
        for region in crate::models::Region::ALL {
            let day: Vec<_> = bundle
                .regions
                .iter()
                .filter(|r| r.region == region)
                .cloned()
                .collect();
            if !day.is_empty() {
                storage::write_forward_snapshot(&self.kv, region, &market_date, &day);
            }
        }

        SourceOutcome::Done { rows }
    }

    async fn run_stpasa(&self, _now: DateTime<Utc>) -> SourceOutcome {
        let fetched = match self.fetch_family(ReportFamily::Stpasa).await {
            Ok(Some(f)) => f,
            Ok(None) => return SourceOutcome::NoFile,
            Err(e) => return classify_fetch_error(&e),
        };

        let outcome = self.registry.parse(&fetched.csv);
        let (regions, units) = merge::collect_stpasa(outcome.records);
        if regions.is_empty() {
            return SourceOutcome::ParseFail(format!(
                "{} had no ST PASA rows",
                fetched.filename
            ));
        }

        let mut rows = 0usize;
        for result in [
            self.store.upsert_stpasa_forecasts(&regions).await,
            self.store.upsert_stpasa_unit_availability(&units).await,
        ] {
            match result {
                Ok(n) => rows += n,
                Err(e) => return SourceOutcome::PersistFail(format!("{e:#}")),
            }
        }
        SourceOutcome::Done { rows }
    }

    pub async fn run_validation(&self, now: DateTime<Utc>) -> Option<crate::models::ValidationReport> {
        let validator = Validator::new(self.store.clone());
        match validator.run(&self.kv, now).await {
            Ok(report) => {
                if !report.passed {
                    if let Some(webhook) = &self.config.alert_webhook_url {
                        if let Err(e) =
                            alerts::send_validation_alert(&self.client, webhook, &report).await
                        {
                            warn!(error = %e, "validation alert failed to send");
                        }
                    }
                }
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "validation run errored");
                None
            }
        }
    }

    /// Diagnostic fetch-parse of one dispatch bundle for `GET /test`.
    pub async fn diagnostic_dispatch(&self) -> Result<serde_json::Value> {
        let fetched = self
            .fetch_family(ReportFamily::Dispatch)
            .await?
            .context("no dispatch file published")?;

        let outcome = self.registry.parse(&fetched.csv);
        let record_count = outcome.records.len();
        let bundle = merge::merge_dispatch(outcome.records);

        Ok(json!({
            "filename": fetched.filename,
            "archive_bytes": fetched.byte_len,
            "csv_bytes": fetched.csv.len(),
            "records": record_count,
            "skipped_rows": outcome.skipped_rows,
            "prices": bundle.prices.len(),
            "fcas": bundle.fcas.len(),
            "interconnectors": bundle.interconnectors.len(),
            "sample": bundle.prices.first(),
        }))
    }
}

fn classify_fetch_error(e: &anyhow::Error) -> SourceOutcome {
    let text = format!("{e:#}");
    if text.contains("extract bundle") || text.contains("archive") {
        SourceOutcome::ParseFail(text)
    } else {
        SourceOutcome::FetchFail(text)
    }
}

async fn join_source<T>(
    family: &str,
    task: tokio::task::JoinHandle<Result<(SourceOutcome, T), tokio::time::error::Elapsed>>,
) -> Option<T> {
    match task.await {
        Ok(Ok((outcome, payload))) => {
            log_outcome(family, &outcome);
            Some(payload)
        }
        Ok(Err(_elapsed)) => {
            warn!(source = family, "source timed out after 60s");
            None
        }
        Err(join_err) => {
            warn!(source = family, error = %join_err, "source task panicked");
            None
        }
    }
}

/// Spawn the wall-clock-aligned 5-minute scheduler.
pub fn spawn_scheduler(orchestrator: Arc<Orchestrator>) {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = timemap::align_to_5min(now) + chrono::Duration::minutes(5);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            tokio::time::sleep(wait).await;

            let tick = Utc::now();
            orchestrator.run_tick(tick).await;
        }
    });
    info!("5-minute ingestion scheduler started");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stpasa_window_is_local_one_am() {
        let config = Config {
            report_base_url: "http://example".to_string(),
            database_path: ":memory:".to_string(),
            archive_root: "/tmp/x".to_string(),
            bind_addr: "0.0.0.0:0".to_string(),
            auth_service_url: "http://example".to_string(),
            alert_webhook_url: None,
            frontend_origin: "http://localhost:3000".to_string(),
            fetch_timeout_secs: 5,
            battery_efficiency: 0.9,
            scheduler_enabled: false,
        };
        // Construct without hitting the network.
        let store = Store::new_in_memory().unwrap();
        let archive = Arc::new(ArchiveStore::new_in_memory());
        let kv = Arc::new(KvStore::new());
        let hub = LiveHub::spawn(store.clone()).await.unwrap();
        let orch = Orchestrator::new(
            config,
            reqwest::Client::new(),
            store,
            archive,
            kv,
            hub,
        );

        // 01:02 market time is inside the window.
        let inside = timemap::parse_market_to_utc("2025/08/23 01:02:00").unwrap();
        assert!(orch.is_stpasa_window(inside));
        // 01:07 is past it; 13:02 is the wrong hour.
        let late = timemap::parse_market_to_utc("2025/08/23 01:07:00").unwrap();
        assert!(!orch.is_stpasa_window(late));
        let wrong_hour = timemap::parse_market_to_utc("2025/08/23 13:02:00").unwrap();
        assert!(!orch.is_stpasa_window(wrong_hour));
    }
}
