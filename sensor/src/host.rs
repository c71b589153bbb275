use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tracing::{debug, info, warn};

use vthermostat_common::{TOPIC_SENSOR_ROOM_TEMP, TOPIC_SENSOR_STATUS};

const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let base_temp = std::env::var("SENSOR_BASE_TEMP")
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(21.0);

    let mut mqtt_options = MqttOptions::new("vthermostat-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));
    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 16);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("simulated room sensor started around {base_temp:.1}");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(PUBLISH_INTERVAL);

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        let temperature = simulated_temp(base_temp, tick);
        debug!("room temperature {temperature:.1}");

        mqtt.publish(
            TOPIC_SENSOR_ROOM_TEMP,
            QoS::AtLeastOnce,
            true,
            format!("{temperature:.1}"),
        )
        .await
        .context("failed to publish room temperature")?;
    }
}

/// Triangle wave of +/-3 degrees over 24 samples, enough to walk a
/// default band edge to edge.
fn simulated_temp(base: f32, tick: u64) -> f32 {
    let phase = (tick % 24) as f32;
    let offset = if phase < 12.0 { phase } else { 24.0 - phase };
    base - 3.0 + offset * 0.5
}
