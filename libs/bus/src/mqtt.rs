//! MQTT transport: persistent-session client for tick feeds and side
//! broadcasts.

use crate::{BusError, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CLIENT_CHANNEL_CAPACITY: usize = 10;
const RECONNECT_PACING: Duration = Duration::from_secs(5);

/// Events surfaced to whoever owns the subscription. The transport keeps
/// retrying underneath; full-cycle reconnect policy lives with the owner.
#[derive(Debug)]
pub enum MqttEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
    /// The connection dropped. Polling continues with fresh transport-level
    /// connect attempts; the owner may instead rebuild the whole session.
    ConnectionLost(String),
}

/// One broker connection with a persistent session (`clean_session = false`),
/// so subscriptions survive brief reconnects under the same client id.
pub struct MqttBus {
    client: AsyncClient,
    url: String,
}

impl MqttBus {
    /// Connect and start the event loop. Incoming publishes and the
    /// connection-lost signal arrive on the returned channel.
    pub fn connect(
        url: &str,
        client_id: &str,
        username: &str,
        password: &str,
        queue_depth: usize,
    ) -> Result<(Self, mpsc::Receiver<MqttEvent>)> {
        let mut options = broker_options(url, client_id)?;
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(false);
        if !username.is_empty() && !password.is_empty() {
            options.set_credentials(username, password);
        } else {
            error!(url, "mqtt username and/or password are empty");
        }

        let (client, mut event_loop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(queue_depth);

        let loop_url = url.to_string();
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    debug!(url = %loop_url, "mqtt event receiver dropped, stopping event loop");
                    break;
                }
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(url = %loop_url, "mqtt connected");
                        let _ = tx.send(MqttEvent::Connected).await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let event = MqttEvent::Message {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if tx.send(event).await.is_err() {
                            debug!(url = %loop_url, "mqtt event receiver dropped, stopping event loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(url = %loop_url, error = %e, "mqtt connection lost");
                        let _ = tx.send(MqttEvent::ConnectionLost(e.to_string())).await;
                        // Pace transport-level reconnect attempts.
                        tokio::time::sleep(RECONNECT_PACING).await;
                    }
                }
            }
        });

        info!(url, client_id, "mqtt client started");
        Ok((
            Self {
                client,
                url: url.to_string(),
            },
            rx,
        ))
    }

    /// Best-effort QoS 1 publish; failures are logged, not returned.
    pub async fn publish(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            error!(url = %self.url, topic, error = %e, "mqtt publish failed");
        }
    }

    /// Subscribe to one topic. Errors are returned so the owner can decide
    /// whether a partial subscription set is acceptable.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    /// Scoped shutdown: release the connection. The event loop task exits
    /// once the event receiver is dropped.
    pub async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(url = %self.url, error = %e, "mqtt disconnect while already closed");
        }
    }
}

/// Build broker options from a URL, selecting TLS automatically when the
/// scheme indicates an encrypted transport.
fn broker_options(url: &str, client_id: &str) -> Result<MqttOptions> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| BusError::InvalidBrokerUrl(url.to_string()))?;

    let authority = rest.split('/').next().unwrap_or(rest);
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse::<u16>()
                .map_err(|_| BusError::InvalidBrokerUrl(url.to_string()))?,
        ),
        None => (
            authority.to_string(),
            match scheme {
                "mqtts" | "ssl" => 8883,
                "wss" => 443,
                "ws" => 80,
                _ => 1883,
            },
        ),
    };

    let mut options = match scheme {
        // WebSocket transports want the full url in place of the host.
        "ws" => {
            let mut options = MqttOptions::new(client_id, url, port);
            options.set_transport(Transport::ws());
            options
        }
        "wss" => {
            let mut options = MqttOptions::new(client_id, url, port);
            options.set_transport(Transport::wss_with_default_config());
            options
        }
        "mqtts" | "ssl" => {
            let mut options = MqttOptions::new(client_id, host, port);
            options.set_transport(Transport::tls_with_default_config());
            options
        }
        "mqtt" | "tcp" => MqttOptions::new(client_id, host, port),
        _ => return Err(BusError::InvalidBrokerUrl(url.to_string())),
    };
    options.set_max_packet_size(1024 * 1024, 1024 * 1024);
    Ok(options)
}
