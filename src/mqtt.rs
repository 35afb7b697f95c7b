use std::sync::Arc;
use std::time::Duration;

use futures::executor::block_on;
use log::{debug, error, info, warn};
use rumqttc::{MqttOptions, QoS, SubscribeFilter};
use serde_derive::Deserialize;

use crate::cancel::CancellationSignal;
use crate::config;
use crate::coordinator::{PresenceListener, Transport, TransportError};
use crate::messages::{PeerKind, PresenceEvent};

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

/// Optional body of an arrival message.
#[derive(Debug, Deserialize)]
struct ArrivalNotice {
    kind: Option<PeerKind>,
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Presence(PresenceEvent),
    Shutdown,
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"nfc-pushd".to_string())
            .to_string();

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path: config.topic_path.clone().unwrap_or("nfc".to_string()),
            },
            eventloop,
        )
    }

    pub async fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        self.client
            .subscribe_many(
                ["device/arrive", "device/depart", "shutdown"].map(|suffix| {
                    SubscribeFilter::new(format!("{}/{suffix}", self.topic_path), QoS::AtLeastOnce)
                }),
            )
            .await?;

        Ok(())
    }

    /// Relays presence messages to `listener` until shutdown.
    ///
    /// This task is the event source: it never blocks on the engine's waits.
    pub async fn event_loop(
        &self,
        eventloop: &mut rumqttc::EventLoop,
        listener: Arc<dyn PresenceListener>,
        shutdown: Arc<CancellationSignal>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::Publish(p)) => {
                        debug!("Received MQTT message on topic {}: {:?}", p.topic, p.payload);

                        match parse_incoming(&self.topic_path, &p.topic, &p.payload) {
                            Some(Incoming::Presence(event)) => listener.on_event(event),
                            Some(Incoming::Shutdown) => {
                                info!("Shutdown requested over MQTT");
                                shutdown.trigger();
                            }
                            None => warn!("Ignoring message on topic {}", p.topic),
                        }
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::SubAck(_)) => {
                        debug!("Subscription acknowledged");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        debug!("Connection acknowledged");
                        if let Err(err) = self.subscribe().await {
                            error!("Error subscribing to MQTT topics: {:?}", err);
                        }
                    }
                    rumqttc::Event::Outgoing(rumqttc::Outgoing::Disconnect) => {
                        debug!("MQTT disconnect sent");
                        break;
                    }
                    _ => {}
                },
                Err(e) => {
                    if shutdown.is_triggered() {
                        debug!("MQTT event loop stopped: {:?}", e);
                        break;
                    }
                    error!("Error polling MQTT event loop: {:?}", e);
                }
            }
        }
    }

    pub fn transport(&self) -> MqttTransport {
        MqttTransport {
            client: self.client.clone(),
            topic: format!("{}/{}/push", self.topic_path, self.publisher_id),
        }
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

/// Publishes each pushed payload to `<topic_path>/<publisher_id>/push`.
pub struct MqttTransport {
    client: rumqttc::AsyncClient,
    topic: String,
}

impl Transport for MqttTransport {
    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        debug!("Publishing {} bytes to {}", payload.len(), self.topic);
        block_on(
            self.client
                .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload.to_vec()),
        )
        .map_err(|err| TransportError::Unavailable(err.to_string()))
    }
}

fn parse_incoming(topic_path: &str, topic: &str, payload: &[u8]) -> Option<Incoming> {
    let suffix = topic.strip_prefix(topic_path)?.strip_prefix('/')?;
    match suffix {
        "device/arrive" => Some(Incoming::Presence(PresenceEvent::Arrival(
            arrival_kind(payload),
        ))),
        "device/depart" => Some(Incoming::Presence(PresenceEvent::Departure)),
        "shutdown" => Some(Incoming::Shutdown),
        _ => None,
    }
}

fn arrival_kind(payload: &[u8]) -> PeerKind {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return PeerKind::PeerToPeer;
    }
    match serde_json::from_slice::<ArrivalNotice>(payload) {
        Ok(ArrivalNotice {
            kind: Some(PeerKind::None),
        }) => {
            warn!("Arrival notice without a peer kind, assuming peer-to-peer");
            PeerKind::PeerToPeer
        }
        Ok(ArrivalNotice { kind: Some(kind) }) => kind,
        Ok(ArrivalNotice { kind: None }) => PeerKind::PeerToPeer,
        Err(err) => {
            warn!("Unreadable arrival notice, assuming peer-to-peer: {err}");
            PeerKind::PeerToPeer
        }
    }
}
