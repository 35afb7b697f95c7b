use std::sync::Arc;

use anyhow::Context as _;
use log::{debug, error, info};

use crate::cancel::{self, CancellationSignal};
use crate::coordinator::{PresenceListener, RendezvousCoordinator};
use crate::mqtt::MqttClient;
use crate::worker::{PushWorker, RetryPolicy, WorkerReport};

pub struct Manager {
    mqtt_client: MqttClient,
    mqtt_event_loop: rumqttc::EventLoop,
    payload: Vec<u8>,
    retry: RetryPolicy,
    quit_on_enter: bool,
}

impl Manager {
    pub fn new(
        mqtt_client: MqttClient,
        mqtt_event_loop: rumqttc::EventLoop,
        payload: Vec<u8>,
        retry: RetryPolicy,
        quit_on_enter: bool,
    ) -> Self {
        Manager {
            mqtt_client,
            mqtt_event_loop,
            payload,
            retry,
            quit_on_enter,
        }
    }

    /// Runs until cancelled from the console or over MQTT.
    pub async fn run_loop(self) -> anyhow::Result<WorkerReport> {
        let Manager {
            mqtt_client,
            mut mqtt_event_loop,
            payload,
            retry,
            quit_on_enter,
        } = self;

        let coordinator = Arc::new(RendezvousCoordinator::new(Box::new(
            mqtt_client.transport(),
        )));
        let signal = Arc::new(CancellationSignal::new(coordinator.clone()));

        if quit_on_enter {
            // Detached: a pending stdin read must not hold up shutdown.
            drop(cancel::spawn_console_trigger(signal.clone()));
        }

        // Presence events arrive on the MQTT task, independent of the worker.
        let bridge_client = mqtt_client.clone();
        let listener: Arc<dyn PresenceListener> = coordinator.clone();
        let bridge_signal = signal.clone();
        let bridge = tokio::task::spawn(async move {
            bridge_client
                .event_loop(&mut mqtt_event_loop, listener, bridge_signal)
                .await;
        });

        // The worker parks on condition variables, so keep it off the async workers.
        let worker = PushWorker::new(coordinator, payload, retry);
        let report = tokio::task::spawn_blocking(move || worker.run())
            .await
            .context("push worker panicked")?;

        info!("Exiting manager event loop");

        if let Err(err) = mqtt_client.disconnect().await {
            error!("Error disconnecting MQTT client: {:?}", err);
        }
        if let Err(err) = bridge.await {
            error!("Error handling MQTT events: {:?}", err);
        }
        debug!("MQTT bridge stopped");

        Ok(report)
    }
}
