use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use vthermostat_common::{
    parse_setpoint_topic, AcActuator, ActuatorCommand, Bound, ControllerStatePayload,
    ControllerWiring, FanMode, LatestReading, ModeSelector, OperatingMode, RuntimeConfig,
    Schedule, SelectedMode, SetpointBand, SetpointPair, ThermostatConfig, ThermostatController,
    TOPIC_AC_COMMAND, TOPIC_AC_FAN_MODE, TOPIC_AC_TARGET, TOPIC_CMD_FAN_MODE, TOPIC_CMD_MODE,
    TOPIC_CMD_SETPOINT_FILTER, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_ROOM_TEMP,
};

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<ThermostatController>>,
    room: Arc<LatestReading>,
    selected: Arc<SelectedMode>,
    setpoints: Arc<Vec<SetpointPair>>,
    schedule: Arc<Schedule>,
    timezone: Arc<String>,
    config: Arc<ThermostatConfig>,
}

struct MqttActuator {
    mqtt: AsyncClient,
}

impl MqttActuator {
    fn publish(&self, topic: &str, payload: String) {
        if let Err(err) = self
            .mqtt
            .try_publish(topic, QoS::AtLeastOnce, true, payload.as_bytes())
        {
            warn!("{topic} <- {payload} not queued: {err}");
        }
    }
}

impl AcActuator for MqttActuator {
    fn command(&self, command: ActuatorCommand) {
        self.publish(TOPIC_AC_COMMAND, command.as_str().to_string());
    }

    fn set_target(&self, temperature: f32) {
        self.publish(TOPIC_AC_TARGET, format!("{temperature:.1}"));
    }

    fn set_fan_mode(&self, fan_mode: FanMode) {
        self.publish(TOPIC_AC_FAN_MODE, fan_mode.as_str().to_string());
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct BandView {
    mode: OperatingMode,
    #[serde(flatten)]
    band: SetpointBand,
}

#[derive(Debug, Serialize)]
struct StatusView {
    #[serde(flatten)]
    state: ControllerStatePayload,
    #[serde(rename = "selectedMode")]
    selected_mode: OperatingMode,
    bands: Vec<BandView>,
    #[serde(rename = "scheduleEnabled")]
    schedule_enabled: bool,
    #[serde(rename = "nextScheduleEventEpoch")]
    next_schedule_event_epoch: Option<i64>,
    timezone: String,
}

#[derive(Debug, Deserialize)]
struct ModeUpdate {
    mode: OperatingMode,
}

#[derive(Debug, Deserialize)]
struct FanUpdate {
    #[serde(rename = "fanMode")]
    fan_mode: FanMode,
}

#[derive(Debug, Deserialize)]
struct SetpointUpdate {
    mode: OperatingMode,
    bound: Bound,
    value: f32,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 128;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    let mut mqtt_options = MqttOptions::new(
        "vthermostat-controller",
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

    let http_port = runtime.network.http_port;
    let app_state = build_app_state(runtime, Arc::new(MqttActuator { mqtt: mqtt.clone() }))?;

    subscribe_topics(&mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone(), mqtt);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/fan", post(handle_set_fan))
        .route("/api/setpoint", post(handle_set_setpoint))
        .route("/api/schedule", get(handle_get_schedule))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_app_state(
    runtime: RuntimeConfig,
    actuator: Arc<dyn AcActuator>,
) -> anyhow::Result<AppState> {
    let thermostat = runtime.thermostat;
    let room = Arc::new(LatestReading::new(Some(Duration::from_millis(
        thermostat.sensor_stale_timeout_ms,
    ))));
    let selected = Arc::new(SelectedMode::new(runtime.initial_mode));

    let setpoints: Vec<SetpointPair> = OperatingMode::ALL
        .into_iter()
        .map(|mode| {
            SetpointPair::new(
                mode,
                runtime.bands.for_mode(mode),
                thermostat.setpoint_limits,
            )
        })
        .collect();

    let mut wiring = ControllerWiring::default()
        .room_sensor(room.clone())
        .actuator(actuator)
        .initial_mode(runtime.initial_mode);
    for pair in &setpoints {
        wiring = wiring.band(pair.mode(), pair.min_source(), pair.max_source());
    }
    let controller =
        ThermostatController::initialize(wiring).context("failed to wire thermostat controller")?;

    Ok(AppState {
        controller: Arc::new(Mutex::new(controller)),
        room,
        selected,
        setpoints: Arc::new(setpoints),
        schedule: Arc::new(runtime.schedule),
        timezone: Arc::new(runtime.timezone),
        config: Arc::new(thermostat),
    })
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let Ok(path) = std::env::var("VTHERMOSTAT_CONFIG").map(PathBuf::from) else {
        return Ok(RuntimeConfig::default());
    };

    match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid config in {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    let network = &mut runtime.network;
    if let Ok(host) = std::env::var("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = env_port("MQTT_PORT") {
        network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Some(port) = env_port("CONTROLLER_HTTP_PORT") {
        network.http_port = port;
    }
}

fn env_port(name: &str) -> Option<u16> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_ROOM_TEMP,
        TOPIC_CMD_MODE,
        TOPIC_CMD_FAN_MODE,
        TOPIC_CMD_SETPOINT_FILTER,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
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

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(app_state.config.tick_interval_ms));
        let mut last_scheduled: Option<OperatingMode> = None;

        loop {
            interval.tick().await;

            if let Some(now) = now_in_timezone(&app_state.timezone) {
                let scheduled = app_state.schedule.current_mode(now);
                if scheduled.is_some() && scheduled != last_scheduled {
                    last_scheduled = scheduled;
                    if let Some(mode) = scheduled {
                        if app_state.selected.select(mode) {
                            info!("schedule selected {} mode", mode.as_str());
                        }
                    }
                }
            }

            let report = {
                let mut controller = app_state.controller.lock().await;
                controller.poll(app_state.selected.as_ref())
            };
            if !report.anomalies.is_empty() {
                debug!("tick anomalies: {:?}", report.anomalies);
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, mqtt: AsyncClient) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(
            app_state.config.state_publish_interval_ms,
        ));
        loop {
            interval.tick().await;

            let payload = {
                let controller = app_state.controller.lock().await;
                serde_json::to_vec(&controller.current_state().payload())
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

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    match topic {
        TOPIC_SENSOR_ROOM_TEMP => match parse_room_temp(message, &app_state.config) {
            Some(temp) => app_state.room.update(temp),
            None => {
                debug!("room temperature {message:?} treated as unavailable");
                app_state.room.clear();
            }
        },
        TOPIC_CMD_MODE => match OperatingMode::parse(message) {
            Some(mode) => {
                if app_state.selected.select(mode) {
                    info!("mode selected over mqtt: {}", mode.as_str());
                }
            }
            None => warn!("ignoring unknown mode {message:?}"),
        },
        TOPIC_CMD_FAN_MODE => match FanMode::parse(message) {
            Some(fan_mode) => {
                app_state.controller.lock().await.set_fan_mode(fan_mode);
            }
            None => warn!("ignoring unknown fan mode {message:?}"),
        },
        _ => {
            let Some((mode, bound)) = parse_setpoint_topic(topic) else {
                return Ok(());
            };
            let value = message
                .parse::<f32>()
                .with_context(|| format!("invalid setpoint {message:?} on {topic}"))?;
            apply_setpoint(app_state, mode, bound, value);
        }
    }

    Ok(())
}

fn parse_room_temp(message: &str, config: &ThermostatConfig) -> Option<f32> {
    let temp = message.parse::<f32>().ok()?;
    config.is_valid_room_temp(temp).then_some(temp)
}

fn apply_setpoint(
    app_state: &AppState,
    mode: OperatingMode,
    bound: Bound,
    value: f32,
) -> Option<SetpointBand> {
    let pair = app_state.setpoints.iter().find(|pair| pair.mode() == mode)?;
    if !value.is_finite() {
        warn!("ignoring non-finite {} setpoint for {}", bound.as_str(), mode.as_str());
        return None;
    }
    let band = match bound {
        Bound::Min => pair.set_min(value),
        Bound::Max => pair.set_max(value),
    };
    info!(
        "{} band now {:.1}..{:.1}",
        mode.as_str(),
        band.min_temperature,
        band.max_temperature
    );
    Some(band)
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let controller_state = state.controller.lock().await.current_state();
    let next_schedule_event_epoch =
        now_in_timezone(&state.timezone).and_then(|now| state.schedule.next_event_epoch(now));

    Json(StatusView {
        state: controller_state.payload(),
        selected_mode: state.selected.read(),
        bands: state
            .setpoints
            .iter()
            .map(|pair| BandView {
                mode: pair.mode(),
                band: pair.band(),
            })
            .collect(),
        schedule_enabled: state.schedule.enabled,
        next_schedule_event_epoch,
        timezone: state.timezone.as_ref().clone(),
    })
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Json(update): Json<ModeUpdate>,
) -> impl IntoResponse {
    if state.selected.select(update.mode) {
        info!("mode selected over http: {}", update.mode.as_str());
    }
    Json(serde_json::json!({ "mode": update.mode }))
}

async fn handle_set_fan(
    State(state): State<AppState>,
    Json(update): Json<FanUpdate>,
) -> impl IntoResponse {
    state.controller.lock().await.set_fan_mode(update.fan_mode);
    Json(serde_json::json!({ "fanMode": update.fan_mode }))
}

async fn handle_set_setpoint(
    State(state): State<AppState>,
    Json(update): Json<SetpointUpdate>,
) -> axum::response::Response {
    match apply_setpoint(&state, update.mode, update.bound, update.value) {
        Some(band) => Json(BandView {
            mode: update.mode,
            band,
        })
        .into_response(),
        None => error_response(StatusCode::BAD_REQUEST, "value must be a finite number"),
    }
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.schedule.as_ref().clone())
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
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
