use crate::prelude::*;
use crate::command::BusWrite;
use crate::coordinator::PollStats;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Publish, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    /// One retained `N/` message per path, `{"value": ...}` payloads.
    pub fn for_snapshot(service: &str, instance: u32, snapshot: &Snapshot) -> Result<Vec<Message>> {
        let mut r = Vec::with_capacity(snapshot.len());

        for (path, value) in snapshot {
            r.push(Message {
                topic: format!("N/{}/{}{}", service, instance, path),
                retain: true,
                payload: serde_json::to_string(&serde_json::json!({ "value": value }))?,
            });
        }

        Ok(r)
    }

    // given a write Message (namespace already removed), return the bus write.
    //
    // eg W/multi/0/Mode {"value": 3} => BusWrite { path: "/Mode", value: 3 }
    pub fn to_write(&self, service: &str, instance: u32) -> Result<BusWrite> {
        let prefix = format!("W/{}/{}/", service, instance);
        let path = match self.topic.strip_prefix(&prefix) {
            Some(rest) if !rest.is_empty() => format!("/{}", rest),
            _ => bail!("ignoring MQTT topic outside our write tree: {}", self.topic),
        };

        Ok(BusWrite {
            path,
            value: self.payload_value()?,
        })
    }

    /// Accepts `{"value": x}` or a bare JSON value.
    pub fn payload_value(&self) -> Result<BusValue> {
        let json: serde_json::Value = serde_json::from_str(self.payload.trim())
            .map_err(|err| anyhow!("payload {:?} is not JSON: {}", self.payload, err))?;

        let inner = match json {
            serde_json::Value::Object(mut map) => map
                .remove("value")
                .ok_or_else(|| anyhow!("payload {:?} has no value", self.payload))?,
            other => other,
        };

        Ok(serde_json::from_value(inner).unwrap_or(BusValue::Null))
    }
} // }}}

#[derive(PartialEq, Debug, Clone)]
pub enum ChannelData {
    Snapshot(Snapshot),
    Write(BusWrite),
    Shutdown,
}

pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PollStats>>,
    // subscribed at construction so nothing sent before start() is lost
    to_mqtt: broadcast::Receiver<ChannelData>,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper, channels: Channels, shared_stats: Arc<Mutex<PollStats>>) -> Self {
        let to_mqtt = channels.to_mqtt.subscribe();
        Self {
            config,
            channels,
            shared_stats,
            to_mqtt,
        }
    }

    pub async fn start(self) -> Result<()> {
        let c = self.config.mqtt();

        if !c.enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let client_id = format!("mppsolar-bridge-{}", c.device_instance());
        let mut options = MqttOptions::new(client_id, c.host(), c.port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 64);

        let Mqtt {
            config,
            channels,
            shared_stats,
            to_mqtt,
        } = self;
        let mqtt = Tasks {
            config,
            channels,
            shared_stats,
        };

        futures::try_join!(
            mqtt.setup(client.clone()),
            mqtt.receiver(eventloop),
            mqtt.sender(client.clone(), to_mqtt),
            mqtt.keepalive(client)
        )?;

        Ok(())
    }

    fn lwt_topic(&self) -> String {
        lwt_topic(&self.config)
    }
}

fn lwt_topic(config: &ConfigWrapper) -> String {
    let c = config.mqtt();
    format!("{}/{}/{}/LWT", c.namespace(), c.service(), c.device_instance())
}

struct Tasks {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PollStats>>,
}

impl Tasks {
    async fn setup(&self, client: AsyncClient) -> Result<()> {
        let c = self.config.mqtt();

        client
            .publish(lwt_topic(&self.config), QoS::AtLeastOnce, true, "online")
            .await?;

        client
            .subscribe(
                format!("{}/W/{}/{}/#", c.namespace(), c.service(), c.device_instance()),
                QoS::AtMostOnce,
            )
            .await?;

        if let Some(topic) = c.system_power_topic() {
            info!("subscribing to system power on {}", topic);
            client.subscribe(topic, QoS::AtMostOnce).await?;
        }

        Ok(())
    }

    // mqtt -> coordinator
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.channels.shutdown.cancelled() => {
                    info!("MQTT receiver shutting down");
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if let Err(err) = self.handle_message(publish) {
                            warn!("{:#}", err);
                        }
                    }
                    Err(e) => {
                        error!("{}", e);
                        info!("reconnecting in 5s");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {} // keepalives etc
                }
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    fn handle_message(&self, publish: Publish) -> Result<()> {
        let c = self.config.mqtt();
        let message = Message {
            topic: publish.topic.clone(),
            retain: publish.retain,
            payload: String::from_utf8(publish.payload.to_vec())?,
        };
        debug!("RX: {:?}", message);

        if c.system_power_topic() == Some(publish.topic.as_str()) {
            let power = message
                .payload_value()
                .ok()
                .and_then(|v| v.as_f64())
                .filter(|p| p.is_finite());
            self.channels.dc_system_power.send_replace(power);
            return Ok(());
        }

        // remove the namespace, including the first /
        // doing it this way means we don't break if namespace happens to contain a /
        let message = Message {
            topic: message
                .topic
                .get(c.namespace().len() + 1..)
                .unwrap_or_default()
                .to_owned(),
            ..message
        };

        let write = message.to_write(c.service(), c.device_instance())?;
        if self
            .channels
            .from_mqtt
            .send(ChannelData::Write(write))
            .is_err()
        {
            bail!("send(from_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(
        &self,
        client: AsyncClient,
        mut receiver: broadcast::Receiver<ChannelData>,
    ) -> Result<()> {
        use ChannelData::*;

        let c = self.config.mqtt();

        loop {
            let data = tokio::select! {
                _ = self.channels.shutdown.cancelled() => Shutdown,
                data = receiver.recv() => match data {
                    Ok(data) => data,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("MQTT sender lagged, {} messages dropped", n);
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                },
            };

            match data {
                Shutdown => {
                    info!("MQTT sender received shutdown signal");
                    // the event loop may already be gone, so never wait here
                    let _ = client.try_publish(lwt_topic(&self.config), QoS::AtLeastOnce, true, "offline");
                    let _ = client.try_disconnect();
                    break;
                }
                Snapshot(snapshot) => {
                    for message in Message::for_snapshot(c.service(), c.device_instance(), &snapshot)? {
                        let topic = format!("{}/{}", c.namespace(), message.topic);
                        debug!("publishing: {} = {}", topic, message.payload);
                        match client
                            .publish(&topic, QoS::AtLeastOnce, message.retain, message.payload)
                            .await
                        {
                            Ok(_) => {
                                if let Ok(mut stats) = self.shared_stats.lock() {
                                    stats.mqtt_messages_sent += 1;
                                }
                            }
                            Err(err) => {
                                error!("MQTT publish to {} failed: {:?}", topic, err);
                                if let Ok(mut stats) = self.shared_stats.lock() {
                                    stats.mqtt_errors += 1;
                                }
                            }
                        }
                    }
                }
                Write(_) => {} // only travels on from_mqtt
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    async fn keepalive(&self, client: AsyncClient) -> Result<()> {
        let c = self.config.mqtt();
        let topic = format!("{}/R/{}/keepalive", c.namespace(), c.service());
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);

        loop {
            tokio::select! {
                _ = self.channels.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = client.publish(&topic, QoS::AtMostOnce, false, "").await {
                        warn!("keepalive publish failed: {}", err);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(topic: &str, payload: &str) -> Message {
        Message {
            topic: topic.to_owned(),
            retain: false,
            payload: payload.to_owned(),
        }
    }

    #[test]
    fn snapshot_topics_and_payloads() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("/Ac/Out/L1/P", BusValue::Float(73.0));
        snapshot.insert("/Soc", BusValue::Null);

        let messages = Message::for_snapshot("multi", 0, &snapshot).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].topic, "N/multi/0/Ac/Out/L1/P");
        assert_eq!(messages[0].payload, r#"{"value":73.0}"#);
        assert!(messages[0].retain);
        assert_eq!(messages[1].topic, "N/multi/0/Soc");
        assert_eq!(messages[1].payload, r#"{"value":null}"#);
    }

    #[test]
    fn parses_writes() {
        let write = message("W/multi/0/Mode", r#"{"value": 3}"#)
            .to_write("multi", 0)
            .unwrap();
        assert_eq!(write.path, "/Mode");
        assert_eq!(write.value, BusValue::Int(3));

        let write = message("W/multi/0/Ac/In/1/CurrentLimit", "12.5")
            .to_write("multi", 0)
            .unwrap();
        assert_eq!(write.path, "/Ac/In/1/CurrentLimit");
        assert_eq!(write.value, BusValue::Float(12.5));
    }

    #[test]
    fn ignores_other_instances() {
        assert!(message("W/multi/1/Mode", "3").to_write("multi", 0).is_err());
        assert!(message("N/multi/0/Mode", "3").to_write("multi", 0).is_err());
        assert!(message("W/multi/0/", "3").to_write("multi", 0).is_err());
    }

    #[test]
    fn bad_payloads() {
        assert!(message("W/multi/0/Mode", "three").payload_value().is_err());
        assert!(message("W/multi/0/Mode", r#"{"v": 3}"#).payload_value().is_err());
        assert_eq!(
            message("W/multi/0/Mode", r#"{"value": [1]}"#).payload_value().unwrap(),
            BusValue::Null
        );
    }
}
