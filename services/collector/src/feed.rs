//! Vendor feed connector.
//!
//! Owns one persistent MQTT session against the tick vendor and drives the
//! full lifecycle: credential exchange, connect, parallel per-symbol
//! subscription, reconnect on loss, and a daily pre-market reset. Incoming
//! ticks are decoded to the canonical event and handed to the worker pool
//! through a bounded channel; when the channel is full the tick is dropped
//! and counted, never queued unbounded.

use crate::auth::TokenClient;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tickflow_bus::{MqttBus, MqttEvent};
use tickflow_config::DataFeedConfig;
use tickflow_types::TickEvent;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const FALLBACK_RESET_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Where the connector gets its subscription list. The production wiring
/// reads config; tests substitute a fixed list.
pub trait SymbolSource: Send + Sync {
    fn symbols(&self) -> Vec<String>;
}

pub struct ConfigSymbols(pub Vec<String>);

impl SymbolSource for ConfigSymbols {
    fn symbols(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// One live broker session: per-topic subscription and teardown.
#[async_trait]
pub trait FeedSession: Send + Sync {
    async fn subscribe(&self, topic: &str) -> tickflow_bus::Result<()>;
    async fn close(&self);
}

#[async_trait]
impl FeedSession for MqttBus {
    async fn subscribe(&self, topic: &str) -> tickflow_bus::Result<()> {
        MqttBus::subscribe(self, topic).await
    }

    async fn close(&self) {
        MqttBus::close(self).await;
    }
}

/// Establishes sessions. The production dialer runs the two-step credential
/// exchange and connects to the broker; tests inject a scripted one.
#[async_trait]
pub trait FeedDialer: Send + Sync {
    async fn dial(
        &self,
        client_id: &str,
    ) -> Result<(Box<dyn FeedSession>, mpsc::Receiver<MqttEvent>)>;
}

pub struct VendorDialer {
    feed: DataFeedConfig,
    auth: TokenClient,
    queue_depth: usize,
}

#[async_trait]
impl FeedDialer for VendorDialer {
    async fn dial(
        &self,
        client_id: &str,
    ) -> Result<(Box<dyn FeedSession>, mpsc::Receiver<MqttEvent>)> {
        let credentials = self.auth.exchange().await?;
        let (bus, events) = MqttBus::connect(
            &self.feed.broker_url,
            client_id,
            &credentials.investor_id,
            &credentials.token,
            self.queue_depth,
        )?;
        Ok((Box::new(bus), events))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    Reconnecting,
}

/// Raw vendor tick. Prices may arrive as JSON numbers or strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendorTick {
    symbol: String,
    match_price: Decimal,
}

/// Decode one vendor payload into the canonical event.
pub fn decode_tick(payload: &[u8]) -> std::result::Result<TickEvent, serde_json::Error> {
    let raw: VendorTick = serde_json::from_slice(payload)?;
    Ok(TickEvent::new(raw.symbol, raw.match_price))
}

pub struct FeedConnector {
    cluster_id: String,
    feed: DataFeedConfig,
    dialer: Arc<dyn FeedDialer>,
    symbols: Arc<dyn SymbolSource>,
    ticks: mpsc::Sender<TickEvent>,
    state: FeedState,
    session: Option<Box<dyn FeedSession>>,
}

impl FeedConnector {
    pub fn new(
        cluster_id: String,
        feed: DataFeedConfig,
        symbols: Arc<dyn SymbolSource>,
        queue_depth: usize,
        ticks: mpsc::Sender<TickEvent>,
    ) -> Result<Self> {
        let auth = TokenClient::new(&feed)?;
        let dialer = Arc::new(VendorDialer {
            feed: feed.clone(),
            auth,
            queue_depth,
        });
        Ok(Self::with_dialer(cluster_id, feed, dialer, symbols, ticks))
    }

    pub fn with_dialer(
        cluster_id: String,
        feed: DataFeedConfig,
        dialer: Arc<dyn FeedDialer>,
        symbols: Arc<dyn SymbolSource>,
        ticks: mpsc::Sender<TickEvent>,
    ) -> Self {
        Self {
            cluster_id,
            feed,
            dialer,
            symbols,
            ticks,
            state: FeedState::Disconnected,
            session: None,
        }
    }

    /// Drive the feed until the process shuts down. Never returns on its
    /// own; the caller selects against a shutdown signal.
    pub async fn run(mut self) {
        let mut events = self.try_connect().await;
        loop {
            let reset_in = duration_until_reset(self.feed.reset_hour, self.feed.reset_minute);
            tokio::select! {
                _ = tokio::time::sleep(reset_in) => {
                    info!(state = ?self.state, "scheduled pre-market feed reset");
                    self.state = FeedState::Reconnecting;
                    events = self.try_connect().await;
                }
                event = next_event(&mut events) => match event {
                    Some(MqttEvent::Connected) => {
                        debug!("feed session acknowledged by broker");
                    }
                    Some(MqttEvent::Message { topic, payload }) => {
                        self.handle_tick(&topic, &payload);
                    }
                    Some(MqttEvent::ConnectionLost(reason)) => {
                        warn!(reason, "feed connection lost, rebuilding session");
                        self.state = FeedState::Reconnecting;
                        events = self.try_connect().await;
                    }
                    None => {
                        // Event loop task ended without a loss signal.
                        warn!("feed event stream closed, rebuilding session");
                        self.state = FeedState::Reconnecting;
                        events = self.try_connect().await;
                    }
                }
            }
        }
    }

    /// One full connect cycle. On failure the connector goes `Disconnected`
    /// and stays there until the next scheduled reset.
    async fn try_connect(&mut self) -> Option<mpsc::Receiver<MqttEvent>> {
        match self.connect().await {
            Ok(events) => Some(events),
            Err(e) => {
                error!(error = %e, "feed connect failed, waiting for next scheduled reset");
                self.state = FeedState::Disconnected;
                None
            }
        }
    }

    async fn connect(&mut self) -> Result<mpsc::Receiver<MqttEvent>> {
        // A half-dead session must not outlive its replacement.
        if let Some(stale) = self.session.take() {
            stale.close().await;
        }
        self.state = FeedState::Connecting;

        let client_id = format!("tick-feed-sub-{}", self.cluster_id);
        let (session, events) = self.dialer.dial(&client_id).await?;

        let symbols = self.symbols.symbols();
        let subscriptions = symbols.iter().map(|symbol| {
            let topic = format!("{}{}", self.feed.tick_topic_prefix, symbol);
            let session = &session;
            async move {
                let outcome = session.subscribe(&topic).await;
                (topic, outcome)
            }
        });

        let mut subscribed = 0usize;
        for (topic, outcome) in join_all(subscriptions).await {
            match outcome {
                Ok(()) => subscribed += 1,
                // A single bad symbol must not take down the session.
                Err(e) => warn!(topic, error = %e, "symbol subscription failed"),
            }
        }
        info!(
            subscribed,
            requested = symbols.len(),
            "feed subscriptions established"
        );

        self.session = Some(session);
        self.state = FeedState::Subscribed;
        Ok(events)
    }

    fn handle_tick(&self, topic: &str, payload: &[u8]) {
        let tick = match decode_tick(payload) {
            Ok(tick) => tick,
            Err(e) => {
                warn!(topic, error = %e, "undecodable tick dropped");
                return;
            }
        };
        match self.ticks.try_send(tick) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(tick)) => {
                warn!(stock_id = %tick.stock_id, "tick queue full, dropping tick");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("tick workers gone, dropping tick");
            }
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<MqttEvent>>) -> Option<MqttEvent> {
    match events {
        Some(rx) => rx.recv().await,
        // Disconnected: nothing arrives until the reset timer fires.
        None => std::future::pending().await,
    }
}

/// Time until the next daily reset at `hour:minute`, market-local.
fn duration_until_reset(hour: u32, minute: u32) -> Duration {
    let now = tickflow_codec::market_now();
    let target_time = match now.date_naive().and_hms_opt(hour, minute, 0) {
        Some(t) => t,
        None => return FALLBACK_RESET_INTERVAL,
    };
    let target = match now.offset().from_local_datetime(&target_time).single() {
        Some(t) => t,
        None => return FALLBACK_RESET_INTERVAL,
    };
    let target = if target <= now {
        target + ChronoDuration::days(1)
    } else {
        target
    };
    (target - now).to_std().unwrap_or(FALLBACK_RESET_INTERVAL)
}
