//! Live price hub.
//!
//! A single task owns the subscriber set and the last-known per-region price
//! map; sockets and the ingestion path talk to it through a command channel,
//! so there is no shared mutable state. Every subscriber receives an INITIAL
//! frame before any PRICE_UPDATE. The last-known map is persisted on every
//! broadcast and restored at startup, so a hub restart replays the freshest
//! prices instead of an empty map.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::models::{Region, RegionPrice};
use crate::storage::Store;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Outbound frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum HubFrame {
    #[serde(rename = "INITIAL")]
    Initial { prices: Vec<RegionPrice> },
    #[serde(rename = "PRICE_UPDATE")]
    PriceUpdate { prices: Vec<RegionPrice> },
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "TRADE")]
    Trade {
        user_id: String,
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        data: Value,
    },
    #[serde(rename = "ERROR")]
    Error { message: String },
}

/// Inbound messages from a subscriber socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum InboundFrame {
    #[serde(rename = "SUBSCRIBE")]
    Subscribe { regions: Vec<String> },
    #[serde(rename = "PONG")]
    Pong,
    #[serde(rename = "TRADE")]
    Trade {
        #[serde(flatten)]
        data: Value,
    },
}

type SubscriberId = u64;

struct Subscriber {
    user_id: String,
    regions: HashSet<Region>,
    connected_at: DateTime<Utc>,
    out: mpsc::Sender<String>,
}

enum HubCommand {
    Register {
        user_id: String,
        regions: HashSet<Region>,
        out: mpsc::Sender<String>,
        reply: oneshot::Sender<SubscriberId>,
    },
    Deregister {
        id: SubscriberId,
    },
    SetRegions {
        id: SubscriberId,
        regions: HashSet<Region>,
    },
    Pong {
        id: SubscriberId,
    },
    Trade {
        id: SubscriberId,
        data: Value,
    },
    Broadcast {
        prices: Vec<RegionPrice>,
    },
}

/// Handle cloned into sockets and the ingestion path.
#[derive(Clone)]
pub struct LiveHub {
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl LiveHub {
    /// Spawn the hub task, restoring the last-known map from the store.
    pub async fn spawn(store: Store) -> Result<Self> {
        let restored = store.load_hub_prices().await.unwrap_or_default();
        if !restored.is_empty() {
            info!(regions = restored.len(), "hub restored last-known prices");
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        tokio::spawn(hub_task(store, restored, cmd_rx));
        Ok(Self { cmd_tx })
    }

    /// Push a fresh snapshot from the ingestion path.
    pub async fn broadcast(&self, prices: Vec<RegionPrice>) {
        if self
            .cmd_tx
            .send(HubCommand::Broadcast { prices })
            .await
            .is_err()
        {
            warn!("hub task is gone; broadcast dropped");
        }
    }

    /// Drive one upgraded socket until it closes.
    pub async fn run_socket(
        &self,
        socket: WebSocket,
        user_id: String,
        initial_regions: Vec<String>,
    ) {
        let regions: HashSet<Region> = initial_regions
            .iter()
            .filter_map(|s| Region::parse(s))
            .collect();
        // No filter means all regions.
        let regions = if regions.is_empty() {
            Region::ALL.into_iter().collect()
        } else {
            regions
        };

        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (reply_tx, reply_rx) = oneshot::channel();

        if self
            .cmd_tx
            .send(HubCommand::Register {
                user_id,
                regions,
                out: out_tx,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return;
        }
        let Ok(id) = reply_rx.await else {
            return;
        };

        let (mut ws_tx, mut ws_rx) = futures_util::StreamExt::split(socket);

        loop {
            tokio::select! {
                outbound = out_rx.recv() => {
                    let Some(text) = outbound else { break };
                    if futures_util::SinkExt::send(&mut ws_tx, Message::Text(text))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                inbound = futures_util::StreamExt::next(&mut ws_rx) => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_inbound(id, &text, &mut ws_tx).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(error = %e, "subscriber socket error");
                            break;
                        }
                    }
                }
            }
        }

        let _ = self.cmd_tx.send(HubCommand::Deregister { id }).await;
    }

    async fn handle_inbound(
        &self,
        id: SubscriberId,
        text: &str,
        ws_tx: &mut (impl futures_util::Sink<Message> + Unpin),
    ) {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(InboundFrame::Subscribe { regions }) => {
                let parsed = regions.iter().filter_map(|s| Region::parse(s)).collect();
                let _ = self
                    .cmd_tx
                    .send(HubCommand::SetRegions {
                        id,
                        regions: parsed,
                    })
                    .await;
            }
            Ok(InboundFrame::Pong) => {
                let _ = self.cmd_tx.send(HubCommand::Pong { id }).await;
            }
            Ok(InboundFrame::Trade { data }) => {
                let _ = self.cmd_tx.send(HubCommand::Trade { id, data }).await;
            }
            Err(_) => {
                let frame = HubFrame::Error {
                    message: "unknown message type".to_string(),
                };
                let text = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
                let _ = futures_util::SinkExt::send(ws_tx, Message::Text(text)).await;
            }
        }
    }
}

async fn hub_task(
    store: Store,
    restored: Vec<RegionPrice>,
    mut cmd_rx: mpsc::Receiver<HubCommand>,
) {
    let mut subscribers: HashMap<SubscriberId, Subscriber> = HashMap::new();
    let mut last_known: BTreeMap<Region, RegionPrice> = restored
        .into_iter()
        .map(|p| (p.region, p))
        .collect();
    let mut next_id: SubscriberId = 1;
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    HubCommand::Register { user_id, regions, out, reply } => {
                        let id = next_id;
                        next_id += 1;

                        // INITIAL goes into the channel before the subscriber
                        // is registered, so it precedes any PRICE_UPDATE.
                        let frame = HubFrame::Initial {
                            prices: last_known.values().cloned().collect(),
                        };
                        let ok = send_frame(&out, &frame);

                        if ok {
                            info!(id, user_id = %user_id, "subscriber connected");
                            subscribers.insert(id, Subscriber {
                                user_id,
                                regions,
                                connected_at: Utc::now(),
                                out,
                            });
                        }
                        let _ = reply.send(id);
                    }
                    HubCommand::Deregister { id } => {
                        if subscribers.remove(&id).is_some() {
                            info!(id, "subscriber disconnected");
                        }
                    }
                    HubCommand::SetRegions { id, regions } => {
                        if let Some(sub) = subscribers.get_mut(&id) {
                            debug!(id, regions = regions.len(), "subscriber filter updated");
                            sub.regions = regions;
                        }
                    }
                    HubCommand::Pong { id } => {
                        // Liveness bookkeeping only.
                        debug!(id, "pong received");
                    }
                    HubCommand::Trade { id, data } => {
                        let user_id = subscribers
                            .get(&id)
                            .map(|s| s.user_id.clone())
                            .unwrap_or_default();
                        let frame = HubFrame::Trade {
                            user_id,
                            timestamp: Utc::now(),
                            data,
                        };
                        // Trades rebroadcast to everyone, unfiltered.
                        drop_failed(&mut subscribers, |sub| send_frame(&sub.out, &frame));
                    }
                    HubCommand::Broadcast { prices } => {
                        for price in &prices {
                            last_known.insert(price.region, price.clone());
                        }
                        if let Err(e) = store.upsert_hub_prices(&prices).await {
                            warn!(error = %e, "failed to persist hub last-known prices");
                        }

                        drop_failed(&mut subscribers, |sub| {
                            let filtered: Vec<RegionPrice> = prices
                                .iter()
                                .filter(|p| sub.regions.contains(&p.region))
                                .cloned()
                                .collect();
                            if filtered.is_empty() {
                                return true;
                            }
                            send_frame(&sub.out, &HubFrame::PriceUpdate { prices: filtered })
                        });
                    }
                }
            }
            _ = ping.tick() => {
                drop_failed(&mut subscribers, |sub| send_frame(&sub.out, &HubFrame::Ping));
            }
        }
    }
}

fn send_frame(out: &mpsc::Sender<String>, frame: &HubFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to serialize hub frame");
            return true;
        }
    };
    out.try_send(text).is_ok()
}

/// Apply `send` to every subscriber and drop the ones whose channel failed.
fn drop_failed(
    subscribers: &mut HashMap<SubscriberId, Subscriber>,
    send: impl Fn(&Subscriber) -> bool,
) {
    let dead: Vec<SubscriberId> = subscribers
        .iter()
        .filter(|(_, sub)| !send(sub))
        .map(|(id, _)| *id)
        .collect();
    for id in dead {
        if let Some(sub) = subscribers.remove(&id) {
            warn!(
                id,
                user_id = %sub.user_id,
                connected_at = %sub.connected_at,
                "dropping unresponsive subscriber"
            );
        }
    }
}
