use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    error::{Anomaly, Bound, ConfigError},
    sources::{AcActuator, ModeSelector, NumericSetpointSource, TemperatureSource},
    types::{ActuatorCommand, ControllerState, FanMode, OperatingMode, SetpointBand},
};

#[derive(Clone)]
struct BandSource {
    min: Arc<dyn NumericSetpointSource>,
    max: Arc<dyn NumericSetpointSource>,
}

impl BandSource {
    fn resolve(&self) -> Option<(SetpointBand, bool)> {
        let min = self.min.read();
        let max = self.max.read();
        if !min.is_finite() || !max.is_finite() {
            return None;
        }
        Some(SetpointBand::normalized(min, max))
    }
}

#[derive(Default)]
pub struct ControllerWiring {
    room_sensor: Option<Arc<dyn TemperatureSource>>,
    actuator: Option<Arc<dyn AcActuator>>,
    setpoints: HashMap<(OperatingMode, usize), Arc<dyn NumericSetpointSource>>,
    initial_mode: Option<OperatingMode>,
}

impl ControllerWiring {
    pub fn room_sensor(mut self, sensor: Arc<dyn TemperatureSource>) -> Self {
        self.room_sensor = Some(sensor);
        self
    }

    pub fn actuator(mut self, actuator: Arc<dyn AcActuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn setpoint(
        mut self,
        mode: OperatingMode,
        bound: Bound,
        source: Arc<dyn NumericSetpointSource>,
    ) -> Self {
        self.setpoints.insert((mode, bound_slot(bound)), source);
        self
    }

    pub fn band(
        self,
        mode: OperatingMode,
        min: Arc<dyn NumericSetpointSource>,
        max: Arc<dyn NumericSetpointSource>,
    ) -> Self {
        self.setpoint(mode, Bound::Min, min)
            .setpoint(mode, Bound::Max, max)
    }

    pub fn initial_mode(mut self, mode: OperatingMode) -> Self {
        self.initial_mode = Some(mode);
        self
    }
}

fn bound_slot(bound: Bound) -> usize {
    match bound {
        Bound::Min => 0,
        Bound::Max => 1,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub command: ActuatorCommand,
    pub issued: bool,
    pub anomalies: Vec<Anomaly>,
}

pub struct ThermostatController {
    room_sensor: Arc<dyn TemperatureSource>,
    actuator: Arc<dyn AcActuator>,
    bands: [BandSource; 3],
    state: ControllerState,
    pushed_target: Option<f32>,
}

impl ThermostatController {
    pub fn initialize(mut wiring: ControllerWiring) -> Result<Self, ConfigError> {
        let room_sensor = wiring
            .room_sensor
            .take()
            .ok_or(ConfigError::MissingRoomSensor)?;
        let actuator = wiring.actuator.take().ok_or(ConfigError::MissingActuator)?;

        let mut take_band = |mode: OperatingMode| -> Result<BandSource, ConfigError> {
            let mut take = |bound: Bound| {
                wiring
                    .setpoints
                    .remove(&(mode, bound_slot(bound)))
                    .ok_or(ConfigError::MissingSetpoint { mode, bound })
            };
            Ok(BandSource {
                min: take(Bound::Min)?,
                max: take(Bound::Max)?,
            })
        };
        let bands = [
            take_band(OperatingMode::Home)?,
            take_band(OperatingMode::Sleep)?,
            take_band(OperatingMode::Away)?,
        ];

        let mode = wiring.initial_mode.unwrap_or(OperatingMode::Home);
        info!("thermostat controller initialized in {} mode", mode.as_str());

        Ok(Self {
            room_sensor,
            actuator,
            bands,
            state: ControllerState::initial(mode),
            pushed_target: None,
        })
    }

    pub fn current_state(&self) -> ControllerState {
        self.state
    }

    pub fn set_fan_mode(&mut self, fan_mode: FanMode) -> bool {
        if self.state.fan_mode == fan_mode {
            return false;
        }
        info!(
            "fan mode {} -> {}",
            self.state.fan_mode.as_str(),
            fan_mode.as_str()
        );
        self.state.fan_mode = fan_mode;
        self.actuator.set_fan_mode(fan_mode);
        true
    }

    pub fn poll(&mut self, selector: &dyn ModeSelector) -> TickReport {
        let room_temp = self.room_sensor.read();
        self.tick(selector.read(), room_temp)
    }

    pub fn tick(&mut self, mode: OperatingMode, room_temp: Option<f32>) -> TickReport {
        let mut anomalies = Vec::new();
        let previous = self.state.actuator_command;

        if mode != self.state.current_mode {
            info!(
                "operating mode {} -> {}",
                self.state.current_mode.as_str(),
                mode.as_str()
            );
            self.state.current_mode = mode;
        }

        let Some((band, inverted)) = self.bands[mode.index()].resolve() else {
            warn!("{} setpoints unavailable, holding {}", mode.as_str(), previous.as_str());
            anomalies.push(Anomaly::SetpointUnavailable { mode });
            return self.report(false, anomalies);
        };
        if inverted {
            debug!(
                "{} band inverted, using {:.1}..{:.1}",
                mode.as_str(),
                band.min_temperature,
                band.max_temperature
            );
            anomalies.push(Anomaly::InvertedBand {
                mode,
                corrected: band,
            });
        }
        self.state.active_band = Some(band);
        self.push_target(band.midpoint());

        let Some(temp) = room_temp.filter(|temp| temp.is_finite()) else {
            debug!("room temperature unavailable, holding {}", previous.as_str());
            self.state.last_room_temperature = None;
            anomalies.push(Anomaly::SensorUnavailable);
            return self.report(false, anomalies);
        };

        let next = next_command(previous, temp, &band);
        self.state.last_room_temperature = Some(temp);
        self.state.actuator_command = next;

        let issued = next != previous;
        if issued {
            info!(
                "room {temp:.1} vs {:.1}..{:.1}: {} -> {}",
                band.min_temperature,
                band.max_temperature,
                previous.as_str(),
                next.as_str()
            );
            self.actuator.command(next);
        }

        self.report(issued, anomalies)
    }

    fn push_target(&mut self, target: f32) {
        if self.pushed_target == Some(target) {
            return;
        }
        debug!("ac target {target:.1}");
        self.pushed_target = Some(target);
        self.actuator.set_target(target);
    }

    fn report(&self, issued: bool, anomalies: Vec<Anomaly>) -> TickReport {
        TickReport {
            command: self.state.actuator_command,
            issued,
            anomalies,
        }
    }
}

/// Three-state hysteresis: leave HEAT only at the top of the band, leave
/// COOL only at the bottom, and start either only outside the band.
pub fn next_command(current: ActuatorCommand, temp: f32, band: &SetpointBand) -> ActuatorCommand {
    match current {
        ActuatorCommand::Heat if temp >= band.max_temperature => ActuatorCommand::Off,
        ActuatorCommand::Heat => ActuatorCommand::Heat,
        ActuatorCommand::Cool if temp <= band.min_temperature => ActuatorCommand::Off,
        ActuatorCommand::Cool => ActuatorCommand::Cool,
        ActuatorCommand::Off if band.contains(temp) => ActuatorCommand::Off,
        ActuatorCommand::Off if temp < band.min_temperature => ActuatorCommand::Heat,
        ActuatorCommand::Off => ActuatorCommand::Cool,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sources::{LatestReading, SelectedMode, SharedSetpoint};

    #[derive(Default)]
    struct RecordingActuator {
        commands: Mutex<Vec<ActuatorCommand>>,
        targets: Mutex<Vec<f32>>,
        fan_modes: Mutex<Vec<FanMode>>,
    }

    impl RecordingActuator {
        fn commands(&self) -> Vec<ActuatorCommand> {
            self.commands.lock().unwrap().clone()
        }

        fn targets(&self) -> Vec<f32> {
            self.targets.lock().unwrap().clone()
        }
    }

    impl AcActuator for RecordingActuator {
        fn command(&self, command: ActuatorCommand) {
            self.commands.lock().unwrap().push(command);
        }

        fn set_target(&self, temperature: f32) {
            self.targets.lock().unwrap().push(temperature);
        }

        fn set_fan_mode(&self, fan_mode: FanMode) {
            self.fan_modes.lock().unwrap().push(fan_mode);
        }
    }

    struct Rig {
        controller: ThermostatController,
        actuator: Arc<RecordingActuator>,
        home_min: Arc<SharedSetpoint>,
        home_max: Arc<SharedSetpoint>,
    }

    fn rig(home: (f32, f32), sleep: (f32, f32)) -> Rig {
        let actuator = Arc::new(RecordingActuator::default());
        let home_min = Arc::new(SharedSetpoint::new(home.0));
        let home_max = Arc::new(SharedSetpoint::new(home.1));

        let wiring = ControllerWiring::default()
            .room_sensor(Arc::new(LatestReading::new(None)))
            .actuator(actuator.clone())
            .band(OperatingMode::Home, home_min.clone(), home_max.clone())
            .band(
                OperatingMode::Sleep,
                Arc::new(SharedSetpoint::new(sleep.0)),
                Arc::new(SharedSetpoint::new(sleep.1)),
            )
            .band(
                OperatingMode::Away,
                Arc::new(SharedSetpoint::new(15.0)),
                Arc::new(SharedSetpoint::new(28.0)),
            );

        Rig {
            controller: ThermostatController::initialize(wiring).unwrap(),
            actuator,
            home_min,
            home_max,
        }
    }

    fn band(min: f32, max: f32) -> SetpointBand {
        SetpointBand {
            min_temperature: min,
            max_temperature: max,
        }
    }

    #[test]
    fn initialize_reports_first_missing_setpoint() {
        let wiring = ControllerWiring::default()
            .room_sensor(Arc::new(LatestReading::new(None)))
            .actuator(Arc::new(RecordingActuator::default()))
            .band(
                OperatingMode::Home,
                Arc::new(SharedSetpoint::new(20.0)),
                Arc::new(SharedSetpoint::new(24.0)),
            )
            .setpoint(
                OperatingMode::Sleep,
                Bound::Min,
                Arc::new(SharedSetpoint::new(18.0)),
            );

        let err = ThermostatController::initialize(wiring).err();

        assert_eq!(
            err,
            Some(ConfigError::MissingSetpoint {
                mode: OperatingMode::Sleep,
                bound: Bound::Max,
            })
        );
    }

    #[test]
    fn initialize_requires_sensor_and_actuator() {
        let no_sensor =
            ControllerWiring::default().actuator(Arc::new(RecordingActuator::default()));
        assert_eq!(
            ThermostatController::initialize(no_sensor).err(),
            Some(ConfigError::MissingRoomSensor)
        );

        let no_actuator =
            ControllerWiring::default().room_sensor(Arc::new(LatestReading::new(None)));
        assert_eq!(
            ThermostatController::initialize(no_actuator).err(),
            Some(ConfigError::MissingActuator)
        );
    }

    #[test]
    fn starts_idle_in_initial_mode() {
        let rig = rig((20.0, 24.0), (18.0, 22.0));
        let state = rig.controller.current_state();

        assert_eq!(state, ControllerState::initial(OperatingMode::Home));
        assert!(rig.actuator.commands().is_empty());
    }

    #[test]
    fn off_state_follows_band_edges() {
        let b = band(20.0, 24.0);

        assert_eq!(next_command(ActuatorCommand::Off, 19.9, &b), ActuatorCommand::Heat);
        assert_eq!(next_command(ActuatorCommand::Off, 24.1, &b), ActuatorCommand::Cool);
        for temp in [20.0, 22.0, 24.0] {
            assert_eq!(next_command(ActuatorCommand::Off, temp, &b), ActuatorCommand::Off);
        }
    }

    #[test]
    fn heat_and_cool_hold_until_opposite_edge() {
        let b = band(20.0, 24.0);

        assert_eq!(next_command(ActuatorCommand::Heat, 23.9, &b), ActuatorCommand::Heat);
        assert_eq!(next_command(ActuatorCommand::Heat, 24.0, &b), ActuatorCommand::Off);
        assert_eq!(next_command(ActuatorCommand::Cool, 20.1, &b), ActuatorCommand::Cool);
        assert_eq!(next_command(ActuatorCommand::Cool, 20.0, &b), ActuatorCommand::Off);
    }

    #[test]
    fn heating_cycle_scenario() {
        let mut rig = rig((20.0, 24.0), (18.0, 22.0));
        let mode = OperatingMode::Home;

        let observed: Vec<(ActuatorCommand, bool)> = [18.0, 19.0, 24.0, 22.0, 26.0]
            .into_iter()
            .map(|temp| {
                let report = rig.controller.tick(mode, Some(temp));
                (report.command, report.issued)
            })
            .collect();

        assert_eq!(
            observed,
            vec![
                (ActuatorCommand::Heat, true),
                (ActuatorCommand::Heat, false),
                (ActuatorCommand::Off, true),
                (ActuatorCommand::Off, false),
                (ActuatorCommand::Cool, true),
            ]
        );
        assert_eq!(
            rig.actuator.commands(),
            vec![
                ActuatorCommand::Heat,
                ActuatorCommand::Off,
                ActuatorCommand::Cool
            ]
        );
        assert_eq!(rig.controller.current_state().last_room_temperature, Some(26.0));
    }

    #[test]
    fn repeated_heat_ticks_issue_one_command() {
        let mut rig = rig((20.0, 24.0), (18.0, 22.0));

        for temp in [18.0, 19.5, 21.0, 23.0, 23.99] {
            rig.controller.tick(OperatingMode::Home, Some(temp));
        }

        assert_eq!(rig.actuator.commands(), vec![ActuatorCommand::Heat]);
    }

    #[test]
    fn inverted_band_behaves_like_ordered_band() {
        let mut inverted = rig((25.0, 20.0), (18.0, 22.0));
        let mut ordered = rig((20.0, 25.0), (18.0, 22.0));

        for temp in [19.0, 22.0, 25.0, 26.0, 21.0, 20.0] {
            let a = inverted.controller.tick(OperatingMode::Home, Some(temp));
            let b = ordered.controller.tick(OperatingMode::Home, Some(temp));
            assert_eq!(a.command, b.command);
            assert_eq!(
                a.anomalies,
                vec![Anomaly::InvertedBand {
                    mode: OperatingMode::Home,
                    corrected: band(20.0, 25.0),
                }]
            );
            assert!(b.anomalies.is_empty());
        }
        assert_eq!(inverted.actuator.commands(), ordered.actuator.commands());
    }

    #[test]
    fn unavailable_sensor_changes_nothing() {
        let mut rig = rig((20.0, 24.0), (18.0, 22.0));
        rig.controller.tick(OperatingMode::Home, Some(18.0));

        for reading in [None, Some(f32::NAN)] {
            let report = rig.controller.tick(OperatingMode::Home, reading);
            assert_eq!(report.command, ActuatorCommand::Heat);
            assert!(!report.issued);
            assert_eq!(report.anomalies, vec![Anomaly::SensorUnavailable]);
        }

        assert_eq!(rig.actuator.commands(), vec![ActuatorCommand::Heat]);
        assert_eq!(rig.controller.current_state().last_room_temperature, None);
    }

    #[test]
    fn unavailable_setpoint_holds_command() {
        let mut rig = rig((20.0, 24.0), (18.0, 22.0));
        rig.home_max.set(f32::NAN);

        let report = rig.controller.tick(OperatingMode::Home, Some(30.0));

        assert_eq!(report.command, ActuatorCommand::Off);
        assert_eq!(
            report.anomalies,
            vec![Anomaly::SetpointUnavailable {
                mode: OperatingMode::Home
            }]
        );
        assert!(rig.actuator.commands().is_empty());
    }

    #[test]
    fn mode_switch_uses_new_band_immediately() {
        let mut rig = rig((20.0, 24.0), (16.0, 19.0));

        rig.controller.tick(OperatingMode::Home, Some(19.0));
        assert_eq!(rig.controller.current_state().actuator_command, ActuatorCommand::Heat);

        // Still heating under home, but sleep's max is already reached.
        let report = rig.controller.tick(OperatingMode::Sleep, Some(19.5));

        assert_eq!(report.command, ActuatorCommand::Off);
        let state = rig.controller.current_state();
        assert_eq!(state.current_mode, OperatingMode::Sleep);
        assert_eq!(state.active_band, Some(band(16.0, 19.0)));

        let report = rig.controller.tick(OperatingMode::Sleep, Some(19.6));
        assert_eq!(report.command, ActuatorCommand::Cool);
        assert_eq!(
            rig.actuator.commands(),
            vec![
                ActuatorCommand::Heat,
                ActuatorCommand::Off,
                ActuatorCommand::Cool
            ]
        );
    }

    #[test]
    fn live_setpoint_changes_apply_on_next_tick() {
        let mut rig = rig((20.0, 24.0), (18.0, 22.0));
        rig.controller.tick(OperatingMode::Home, Some(22.0));

        rig.home_min.set(23.0);
        rig.home_max.set(26.0);
        let report = rig.controller.tick(OperatingMode::Home, Some(22.0));

        assert_eq!(report.command, ActuatorCommand::Heat);
        assert_eq!(rig.controller.current_state().target_temperature(), Some(24.5));
    }

    #[test]
    fn poll_reads_sensor_and_selector() {
        let sensor = Arc::new(LatestReading::new(None));
        let actuator = Arc::new(RecordingActuator::default());
        let mut wiring = ControllerWiring::default()
            .room_sensor(sensor.clone())
            .actuator(actuator.clone())
            .initial_mode(OperatingMode::Away);
        for mode in OperatingMode::ALL {
            wiring = wiring.band(
                mode,
                Arc::new(SharedSetpoint::new(20.0)),
                Arc::new(SharedSetpoint::new(24.0)),
            );
        }
        let mut controller = ThermostatController::initialize(wiring).unwrap();
        let selector = SelectedMode::new(OperatingMode::Sleep);

        let report = controller.poll(&selector);
        assert_eq!(report.anomalies, vec![Anomaly::SensorUnavailable]);

        sensor.update(25.0);
        let report = controller.poll(&selector);

        assert_eq!(report.command, ActuatorCommand::Cool);
        assert_eq!(controller.current_state().current_mode, OperatingMode::Sleep);
        assert_eq!(actuator.commands(), vec![ActuatorCommand::Cool]);
    }

    #[test]
    fn band_midpoint_is_pushed_once_per_change() {
        let mut rig = rig((20.0, 24.0), (16.0, 19.0));

        rig.controller.tick(OperatingMode::Home, Some(22.0));
        rig.controller.tick(OperatingMode::Home, Some(22.5));
        // Sensor outage still keeps the unit's target in step with the band.
        rig.controller.tick(OperatingMode::Sleep, None);
        rig.home_max.set(26.0);
        rig.controller.tick(OperatingMode::Home, Some(22.0));

        assert_eq!(rig.actuator.targets(), vec![22.0, 17.5, 23.0]);
        assert!(rig.actuator.commands().is_empty());
    }

    #[test]
    fn fan_mode_is_forwarded_only_on_change() {
        let mut rig = rig((20.0, 24.0), (18.0, 22.0));

        assert!(!rig.controller.set_fan_mode(FanMode::Auto));
        assert!(rig.controller.set_fan_mode(FanMode::High));
        assert!(!rig.controller.set_fan_mode(FanMode::High));

        assert_eq!(*rig.actuator.fan_modes.lock().unwrap(), vec![FanMode::High]);
        assert_eq!(rig.controller.current_state().fan_mode, FanMode::High);
    }
}
