use std::time::Duration;

use anyhow::{bail, Context};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{info, warn};

use heating_common::{sensor_temperature_topic, TOPIC_SENSOR_STATUS};

const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_ADDRESSES: &str = "28FF010000000A9C";

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addresses = std::env::var("SENSOR_ADDRESSES")
        .unwrap_or_else(|_| DEFAULT_ADDRESSES.to_string());
    let addresses = parse_addresses(&addresses)?;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("heating-sensor", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

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

    info!("sensor publisher started for {}", addresses.join(", "));

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(PUBLISH_INTERVAL);

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        for (index, address) in addresses.iter().enumerate() {
            let payload = simulated_reading(index, tick).to_string();
            mqtt.publish(
                sensor_temperature_topic(address),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .await
            .with_context(|| format!("failed to publish reading for {address}"))?;
        }
    }
}

fn parse_addresses(raw: &str) -> anyhow::Result<Vec<String>> {
    let mut addresses = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let hex: String = entry
            .chars()
            .filter(|c| !matches!(c, ':' | '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if hex.len() != 16 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("invalid sensor address '{entry}'");
        }
        if hex.starts_with("00") {
            bail!("sensor address '{entry}' has a zero family code");
        }
        addresses.push(hex);
    }
    if addresses.is_empty() {
        bail!("SENSOR_ADDRESSES lists no sensors");
    }
    Ok(addresses)
}

fn simulated_reading(index: usize, tick: u64) -> i16 {
    const STEPS: u64 = 14;
    let phase = (tick + index as u64 * 3) % (STEPS * 2);
    let step = if phase < STEPS { phase } else { STEPS * 2 - phase };
    1_800 + (step as i16) * 25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_list() {
        let addresses = parse_addresses(" 28ff010000000a9c, 28:FF:02:00:00:00:00:4E ,").unwrap();
        assert_eq!(addresses, vec!["28FF010000000A9C", "28FF02000000004E"]);

        assert!(parse_addresses("28FF01").is_err());
        assert!(parse_addresses("0000000000000000").is_err());
        assert!(parse_addresses(" , ").is_err());
    }

    #[test]
    fn readings_stay_within_band() {
        for index in 0..4 {
            for tick in 0..60 {
                let reading = simulated_reading(index, tick);
                assert!((1_800..=2_150).contains(&reading), "{reading}");
            }
        }
        assert_eq!(simulated_reading(0, 14), 2_150);
        assert_eq!(simulated_reading(0, 28), 1_800);
    }
}
