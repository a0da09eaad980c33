use std::{sync::Arc, thread, time::Duration};

use backon::{BlockingRetryable, ExponentialBuilder};
use log::{debug, error, info};
use rumqttc::{Client, MqttOptions, QoS};
use snafu::{ResultExt, Snafu};

use crate::{clock::{Clock, StopSignal}, config::models::Mqtt, status::StatusStore};

use super::models::{MqttPrinterStatus, MqttRigStatus};

/// Where status messages go.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError>;
}

pub struct MqttClient {
    client: Client,
}

impl MqttClient {
    pub fn new(mqtt_settings: &Mqtt) -> Self {
        let mut mqtt_options = MqttOptions::new(mqtt_settings.client_id.to_owned(), mqtt_settings.host.to_owned(), mqtt_settings.port);
        if !mqtt_settings.username.is_empty() {
            mqtt_options.set_credentials(mqtt_settings.username.to_owned(), mqtt_settings.password.to_owned());
        }
        mqtt_options.set_keep_alive(Duration::from_secs(10));

        let (client, mut connection) = Client::new(mqtt_options, 10);

        thread::spawn(move || {
            for notification in connection.iter() {
                if let Err(e) = notification {
                    debug!("MQTT connection error: {e}");
                    thread::sleep(Duration::from_secs(1));
                }
            }
        });

        Self { client }
    }
}

impl Publisher for MqttClient {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.client.publish(topic, QoS::AtLeastOnce, false, payload).context(PublishSnafu { topic })
    }
}

/// Periodically mirrors the status store to `<root_topic>/<queue name>`.
pub struct StatusPublisher {
    publisher: Arc<dyn Publisher>,
    store: StatusStore,
    root_topic: String,
    interval: Duration,
    clock: Arc<dyn Clock>,
    stop: StopSignal,
}

impl StatusPublisher {
    pub fn new(publisher: Arc<dyn Publisher>, store: StatusStore, settings: &Mqtt, clock: Arc<dyn Clock>, stop: StopSignal) -> Self {
        Self { publisher, store, root_topic: settings.root_topic.clone(), interval: settings.publish_interval, clock, stop }
    }

    pub fn run(&self) {
        info!("Publishing printer status to MQTT under {}", self.root_topic);

        while !self.stop.is_triggered() {
            let clock = self.clock.clone();
            let published = (|| self.publish_round())
                .retry(ExponentialBuilder::default().with_factor(4.0))
                .sleep(move |delay| clock.sleep(delay))
                .call();
            match published {
                Ok(count) => {
                    debug!("Published status of {count} printer(s) to MQTT.");
                    self.clock.sleep(self.interval);
                }
                Err(e) => {
                    error!("Error publishing printer status to MQTT: {e}");
                    self.failure_wait();
                }
            }
        }
    }

    /// Publishes the rig summary and every printer entry once. Returns the number of printers.
    pub fn publish_round(&self) -> Result<usize, MqttError> {
        let statuses = self.store.snapshot();

        let summary = serde_json::to_string(&MqttRigStatus::from_statuses(&statuses)).context(SerializeSnafu)?;
        self.publisher.publish(&format!("{}/status", self.root_topic), summary.as_bytes())?;

        for status in &statuses {
            let topic = format!("{}/{}", self.root_topic, status.queue_name);
            let payload = serde_json::to_string(&MqttPrinterStatus::from(status)).context(SerializeSnafu)?;
            self.publisher.publish(&topic, payload.as_bytes())?;
        }
        Ok(statuses.len())
    }

    fn failure_wait(&self) {
        error!("Too many failures, waiting 30 seconds before retrying.");
        self.clock.sleep(Duration::from_secs(30));
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum MqttError {
    #[snafu(display("Could not publish to {topic}"))]
    Publish { topic: String, source: rumqttc::ClientError },

    #[snafu(display("Could not serialize status payload"))]
    Serialize { source: serde_json::Error },
}
