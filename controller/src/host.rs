use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event as MqttEvent, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use heating_common::{
    sensor_address_from_topic, Clock, ControlCore, CoreError, DayOfWeek, Event, RuntimeConfig,
    SensorBus, SensorFault, TickReport, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_TEMP_FILTER,
};

use crate::{
    bus::{MqttActuators, MqttSensorBus},
    clock::HostClock,
    eeprom::FileEeprom,
    parse::{celsius_to_tenths, format_time, parse_address, parse_day, parse_days, parse_time},
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 64;
const DEFAULT_DUMP_ROW_LEN: usize = 10;

#[derive(Clone)]
struct AppState {
    core: Arc<Mutex<ControlCore<FileEeprom>>>,
    clock: Arc<Mutex<HostClock>>,
    sensors: MqttSensorBus,
    actuators: MqttActuators,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    eeprom_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SensorRequest {
    address: String,
    zone: u8,
}

#[derive(Debug, Serialize)]
struct SensorAdded {
    index: usize,
    address: String,
    zone: u8,
}

#[derive(Debug, Serialize)]
struct ScanResult {
    address: String,
    temperature: Option<f32>,
    fault: Option<SensorFault>,
    zone: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct EventRequest {
    days: Vec<String>,
    time: String,
    zone: u8,
    setpoint: f32,
}

#[derive(Debug, Serialize)]
struct EventView {
    index: usize,
    days: Vec<&'static str>,
    #[serde(rename = "dayMask")]
    day_mask: u8,
    time: String,
    zone: u8,
    setpoint: f32,
}

#[derive(Debug, Serialize)]
struct EventList {
    #[serde(rename = "nextEvent")]
    next_event: String,
    events: Vec<EventView>,
}

#[derive(Debug, Deserialize)]
struct ZoneUpdate {
    hysteresis: f32,
    #[serde(rename = "spaceHeating")]
    space_heating: bool,
    #[serde(default)]
    setpoint: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct TimeUpdate {
    #[serde(default)]
    day: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    reset: bool,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    timezone: String,
    day: &'static str,
    time: String,
    #[serde(rename = "offsetMinutes")]
    offset_minutes: i64,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

#[derive(Debug, Serialize)]
struct EepromDump {
    #[serde(rename = "rowLength")]
    row_length: usize,
    rows: Vec<String>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();
    runtime
        .layout
        .validate()
        .map_err(|reason| anyhow::anyhow!("invalid eeprom layout: {reason}"))?;

    let timezone = runtime.timezone.parse::<Tz>().unwrap_or_else(|_| {
        warn!("unknown timezone '{}', using UTC", runtime.timezone);
        chrono_tz::UTC
    });
    let clock = HostClock::new(timezone);

    let eeprom = FileEeprom::open(store.eeprom_path.as_ref(), runtime.layout.image_len())?;
    let mut core = ControlCore::open(eeprom, runtime.layout.clone())
        .context("failed to load configuration from eeprom")?;

    let now = clock.now();
    if runtime.restore_setpoints_on_boot {
        core.restore_setpoints(now);
    }
    core.process_schedule(now);
    info!("next scheduled event {}", core.next_event());

    let mut mqtt_options = MqttOptions::new(
        "heating-controller",
        runtime.network.mqtt_host.clone(),
        runtime.network.mqtt_port,
    );
    if !runtime.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            runtime.network.mqtt_user.clone(),
            runtime.network.mqtt_pass.clone(),
        );
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        core: Arc::new(Mutex::new(core)),
        clock: Arc::new(Mutex::new(clock)),
        sensors: MqttSensorBus::new(Duration::from_secs(runtime.sensor_stale_timeout_secs)),
        actuators: MqttActuators::new(mqtt.clone()),
        store,
    };

    mqtt.subscribe(TOPIC_SENSOR_TEMP_FILTER, QoS::AtMostOnce).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(
        app_state.clone(),
        mqtt,
        Duration::from_secs(runtime.state_publish_interval_secs),
    );

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route(
            "/api/sensors",
            get(handle_get_sensors)
                .post(handle_add_sensor)
                .delete(handle_clear_sensors),
        )
        .route("/api/sensors/scan", post(handle_scan_sensors))
        .route(
            "/api/events",
            get(handle_get_events)
                .post(handle_add_event)
                .delete(handle_clear_events),
        )
        .route("/api/events/{index}", delete(handle_delete_event))
        .route("/api/zones", get(handle_get_zones))
        .route("/api/zones/{index}", put(handle_put_zone))
        .route("/api/time", get(handle_get_time).put(handle_put_time))
        .route("/api/debug/eeprom", get(handle_get_eeprom))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = env_parse::<u16>("MQTT_PORT") {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(port) = env_parse::<u16>("CONTROLLER_HTTP_PORT") {
        runtime.http_port = port;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(MqttEvent::Incoming(Incoming::Publish(message))) => {
                    handle_mqtt_message(&app_state, &message.topic, &message.payload);
                }
                Ok(MqttEvent::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn handle_mqtt_message(app_state: &AppState, topic: &str, payload: &[u8]) {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {topic} ({} bytes)",
            payload.len()
        );
        return;
    }
    let Some(raw_address) = sensor_address_from_topic(topic) else {
        return;
    };
    let address = match parse_address(raw_address) {
        Ok(address) => address,
        Err(err) => {
            warn!("ignoring reading on {topic}: {err}");
            return;
        }
    };
    let Ok(message) = std::str::from_utf8(payload) else {
        warn!("non utf8 payload on {topic}");
        return;
    };

    if app_state.sensors.record_payload(address, message) {
        debug!("sensor {address} reported {message}");
    } else {
        warn!("unparseable reading '{message}' from sensor {address}");
    }
}

// Ticks on each wall-clock minute boundary so a scheduled event is seen
// during the minute it names.
fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        loop {
            let report = run_tick(&app_state).await;
            if !report.applied_events.is_empty() || !report.sensor_failures.is_empty() {
                debug!(
                    "tick applied events {:?}, {} sensor failures",
                    report.applied_events,
                    report.sensor_failures.len()
                );
            }
            tokio::time::sleep(until_next_minute()).await;
        }
    });
}

async fn run_tick(app_state: &AppState) -> TickReport {
    let now = app_state.clock.lock().await.now();
    let mut sensors = app_state.sensors.clone();
    let mut actuators = app_state.actuators.clone();

    let mut core = app_state.core.lock().await;
    core.tick(now, &mut sensors, &mut actuators)
}

fn until_next_minute() -> Duration {
    let now = Utc::now();
    let into_minute =
        u64::from(now.second()) * 1_000 + u64::from(now.nanosecond() / 1_000_000).min(999);
    Duration::from_millis(60_000 - into_minute)
}

fn spawn_state_publish_loop(app_state: AppState, mqtt: AsyncClient, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;

            let payload = {
                let core = app_state.core.lock().await;
                serde_json::to_vec(&core.status())
            };

            match payload {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.core.lock().await.status();
    Json(status)
}

async fn handle_get_sensors(State(state): State<AppState>) -> impl IntoResponse {
    let sensors = state.core.lock().await.status().sensors;
    Json(sensors)
}

async fn handle_add_sensor(
    State(state): State<AppState>,
    Json(request): Json<SensorRequest>,
) -> impl IntoResponse {
    let address = match parse_address(&request.address) {
        Ok(address) => address,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let result = state.core.lock().await.add_sensor(address, request.zone);
    match result {
        Ok(index) => {
            info!("sensor {address} assigned to zone {}", request.zone);
            Json(SensorAdded {
                index,
                address: address.to_string(),
                zone: request.zone,
            })
            .into_response()
        }
        Err(err) => core_error_response(err),
    }
}

async fn handle_clear_sensors(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.core.lock().await.clear_sensors();
    if let Err(err) = result {
        return core_error_response(err);
    }
    info!("sensor table cleared");
    handle_get_sensors(State(state)).await.into_response()
}

async fn handle_scan_sensors(State(state): State<AppState>) -> impl IntoResponse {
    let found = state.sensors.clone().search();
    let core = state.core.lock().await;

    let results: Vec<ScanResult> = found
        .into_iter()
        .map(|(address, reading)| ScanResult {
            address: address.to_string(),
            temperature: reading.ok().map(|value| f32::from(value) / 100.0),
            fault: reading.err(),
            zone: core
                .sensors()
                .iter()
                .find(|sensor| sensor.address == address)
                .map(|sensor| sensor.zone),
        })
        .collect();
    Json(results)
}

async fn handle_get_events(State(state): State<AppState>) -> impl IntoResponse {
    let core = state.core.lock().await;
    Json(EventList {
        next_event: core.next_event().to_string(),
        events: core
            .events()
            .iter()
            .enumerate()
            .map(|(index, event)| event_view(index, event))
            .collect(),
    })
}

async fn handle_add_event(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> impl IntoResponse {
    let event = match event_from_request(&request) {
        Ok(event) => event,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    let result = state.core.lock().await.add_event(event);
    if let Err(err) = result {
        return core_error_response(err);
    }
    info!(
        "event added: {} {} zone {} -> {:.1}",
        event.days,
        format_time(event.time),
        event.zone,
        request.setpoint
    );
    handle_get_events(State(state)).await.into_response()
}

async fn handle_clear_events(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.core.lock().await.clear_events();
    if let Err(err) = result {
        return core_error_response(err);
    }
    info!("event table cleared");
    handle_get_events(State(state)).await.into_response()
}

async fn handle_delete_event(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> impl IntoResponse {
    let result = state.core.lock().await.delete_event(index);
    match result {
        Ok(event) => info!("event {index} deleted ({} {})", event.days, format_time(event.time)),
        Err(err) => return core_error_response(err),
    }
    handle_get_events(State(state)).await.into_response()
}

async fn handle_get_zones(State(state): State<AppState>) -> impl IntoResponse {
    let zones = state.core.lock().await.status().zones;
    Json(zones)
}

async fn handle_put_zone(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(update): Json<ZoneUpdate>,
) -> impl IntoResponse {
    let hysteresis = match celsius_to_tenths(update.hysteresis).map(u8::try_from) {
        Ok(Ok(tenths)) => tenths,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "hysteresis must be between 0.0 and 25.5",
            )
        }
    };
    let setpoint = match update.setpoint.map(celsius_to_tenths).transpose() {
        Ok(setpoint) => setpoint,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    {
        let mut core = state.core.lock().await;
        if let Err(err) = core.configure_zone(index, hysteresis, update.space_heating) {
            return core_error_response(err);
        }
        if let Some(setpoint) = setpoint {
            if let Err(err) = core.set_setpoint(index, setpoint) {
                return core_error_response(err);
            }
        }
    }

    handle_get_zones(State(state)).await.into_response()
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let clock = state.clock.lock().await;
    let now = clock.now();
    Json(TimeStatus {
        timezone: clock.timezone().name().to_string(),
        day: now.weekday().map_or("-", DayOfWeek::short_name),
        time: format_time(now.minutes),
        offset_minutes: clock.offset_minutes(),
        now_epoch: clock.local_now().timestamp(),
    })
}

async fn handle_put_time(
    State(state): State<AppState>,
    Json(update): Json<TimeUpdate>,
) -> impl IntoResponse {
    let timezone = match update.timezone.as_deref().map(str::parse::<Tz>).transpose() {
        Ok(timezone) => timezone,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid timezone value"),
    };
    let day = match update.day.as_deref().map(parse_day).transpose() {
        Ok(day) => day,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let minutes = match update.time.as_deref().map(parse_time).transpose() {
        Ok(minutes) => minutes,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let now = {
        let mut clock = state.clock.lock().await;
        if let Some(timezone) = timezone {
            clock.set_timezone(timezone);
        }
        if update.reset {
            clock.reset();
        }
        if day.is_some() || minutes.is_some() {
            let current = clock.now();
            let day = day
                .or_else(|| current.weekday())
                .unwrap_or(DayOfWeek::Mon);
            clock.set_time(day, minutes.unwrap_or(current.minutes));
            info!("clock set to {}", clock.now());
        }
        clock.now()
    };
    state.core.lock().await.clock_changed(now);

    if let Some(timezone) = timezone {
        if let Err(err) = state.store.save_timezone(timezone).await {
            warn!("failed to persist timezone update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }

    handle_get_time(State(state)).await.into_response()
}

async fn handle_get_eeprom(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let row_length = params
        .get("row")
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|row| (1..=64).contains(row))
        .unwrap_or(DEFAULT_DUMP_ROW_LEN);

    let result = state.core.lock().await.dump(row_length);
    match result {
        Ok(rows) => Json(EepromDump {
            row_length,
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, row)| hex_row(i * row_length, row))
                .collect(),
        })
        .into_response(),
        Err(err) => core_error_response(err),
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HEATING_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.heating"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            eeprom_path: Arc::new(data_dir.join("eeprom.bin")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    async fn save_timezone(&self, timezone: Tz) -> anyhow::Result<()> {
        let mut runtime = self.load_runtime_config().await?;
        runtime.timezone = timezone.name().to_string();
        self.save_runtime_config(&runtime).await
    }
}

fn event_from_request(request: &EventRequest) -> Result<Event, String> {
    let days = parse_days(&request.days).map_err(|err| err.to_string())?;
    let time = parse_time(&request.time).map_err(|err| err.to_string())?;
    let setpoint = celsius_to_tenths(request.setpoint).map_err(|err| err.to_string())?;
    Ok(Event {
        days,
        time,
        zone: request.zone,
        setpoint,
    })
}

fn event_view(index: usize, event: &Event) -> EventView {
    EventView {
        index,
        days: event.days.days().map(DayOfWeek::short_name).collect(),
        day_mask: event.days.bits(),
        time: format_time(event.time),
        zone: event.zone,
        setpoint: f32::from(event.setpoint) / 10.0,
    }
}

fn hex_row(offset: usize, row: &[u8]) -> String {
    let bytes: Vec<String> = row.iter().map(|byte| format!("{byte:02X}")).collect();
    format!("{offset:04}: {}", bytes.join(" "))
}

fn core_error_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::CapacityExceeded { .. } => StatusCode::CONFLICT,
        CoreError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
        CoreError::StorageUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::SensorReadFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn core_error_response(err: CoreError) -> axum::response::Response {
    let status = core_error_status(&err);
    if status.is_server_error() {
        warn!("request failed: {err}");
    }
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
