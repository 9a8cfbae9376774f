//! MQTT subscription transport for `akari watch`.
//!
//! Each `subscribe` opens a fresh broker session and pumps its publishes
//! into a channel. When the connection drops the pump exits, the stream
//! ends, and the discovery listener re-subscribes with backoff.

use std::time::Duration;

use akari_config::Mqtt;
use akari_core::{CoreError, InboundMessage, MessageSource};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, trace, warn};

const CHANNEL_CAPACITY: usize = 64;

pub struct MqttSource {
    options: MqttOptions,
    broker: String,
    pump: Option<JoinHandle<()>>,
}

impl MqttSource {
    pub fn new(settings: &Mqtt) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive.max(5)));
        if let Some(username) = &settings.username {
            let password = settings
                .resolve_password()
                .map(|p| p.expose_secret().to_owned())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }

        Self {
            options,
            broker: format!("{}:{}", settings.host, settings.port),
            pump: None,
        }
    }
}

impl MessageSource for MqttSource {
    type Stream = ReceiverStream<InboundMessage>;

    async fn subscribe(&mut self, filter: &str) -> Result<Self::Stream, CoreError> {
        if let Some(old) = self.pump.take() {
            old.abort();
        }

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 10);
        client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| CoreError::Subscription {
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let broker = self.broker.clone();
        self.pump = Some(tokio::spawn(async move {
            // Dropping the client would close the request channel.
            let _client = client;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload,
                            retained: publish.retain,
                        };
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(%broker, "connected to broker");
                    }
                    Ok(event) => trace!(?event, "mqtt event"),
                    Err(e) => {
                        warn!(%broker, error = %e, "broker connection lost");
                        break;
                    }
                }
            }
        }));

        Ok(ReceiverStream::new(rx))
    }
}

impl Drop for MqttSource {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
