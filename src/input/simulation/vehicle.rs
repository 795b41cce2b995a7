//! Demo vehicle with simulated telemetry.
//!
//! Commands act on the vehicle's own attributes immediately, the way a real
//! backend would report them on its next poll. A background task drifts the
//! outside temperature and moves the battery level while charging.

use crate::vehicle::command::{HONK_FLASH, LOCK_UNLOCK, START_STOP};
use crate::vehicle::{
    Attribute, Charging, ChargingConnector, ChargingState, Climatization, ClimatizationState,
    Command, CommandAction, ConnectionState, Doors, DriveType, ElectricDrive, HeatingState,
    LockState, SetterError, TemperatureBounds, Vehicle, WindowHeatings,
};
use chrono::Utc;
use log::{debug, info};
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

pub const DEMO_VIN: &str = "WVWZZZE1ZPP000001";
pub const SIMULATION_INTERVAL: Duration = Duration::from_secs(30);

const CHARGING_POWER_KW: f64 = 11.0;
const CLIMATIZATION_MINUTES: i64 = 20;
const LEVEL_STEP_CHARGING: f64 = 1.0;
const LEVEL_STEP_IDLE: f64 = 0.1;
const LEVEL_MIN: f64 = 5.0;

/// Build an enabled electric demo vehicle offering every capability.
pub fn demo_vehicle() -> Arc<Vehicle> {
    let climatization = Climatization::new().with_target_temperature_bounds(TemperatureBounds {
        min: 15.5,
        max: 30.0,
        step: 0.5,
    });
    climatization.state.set_value(ClimatizationState::Off);
    climatization.target_temperature.set_value(21.0);
    climatization
        .target_temperature
        .set_setter_hook(Arc::new(|attribute: &Attribute<f64>, value: f64| {
            info!("[Sim] Target temperature set to {:.1}°C", value);
            attribute.set_value(value);
            Ok(())
        }));
    climatization.commands.add(climatization_command(&climatization));

    let connector = ChargingConnector::new();
    connector.connection_state.set_value(ConnectionState::Connected);
    let charging = Charging::new().with_connector(connector);
    charging.state.set_value(ChargingState::ReadyForCharging);
    charging.power.set_value(0.0);
    charging.commands.add(charging_command(&charging));

    let drive = ElectricDrive::new();
    drive.level.set_value(64.0);

    let doors = Doors::new();
    doors.lock_state.set_value(LockState::Locked);
    let lock_state = doors.lock_state.clone();
    doors.commands.add(Command::new(
        LOCK_UNLOCK,
        Arc::new(move |action: CommandAction| {
            let state = match action {
                CommandAction::Lock => LockState::Locked,
                CommandAction::Unlock => LockState::Unlocked,
                _ => return Err(SetterError::NotSupported(action.to_string())),
            };
            info!("[Sim] Doors {:?}", state);
            lock_state.set_value(state);
            Ok(())
        }),
    ));

    let heatings = WindowHeatings::new();
    heatings.heating_state.set_value(HeatingState::Off);
    let heating_state = heatings.heating_state.clone();
    heatings.commands.add(Command::new(
        START_STOP,
        Arc::new(move |action: CommandAction| {
            let state = match action {
                CommandAction::Start => HeatingState::On,
                CommandAction::Stop => HeatingState::Off,
                _ => return Err(SetterError::NotSupported(action.to_string())),
            };
            info!("[Sim] Window heating {:?}", state);
            heating_state.set_value(state);
            Ok(())
        }),
    ));

    let vehicle = Vehicle::new(DEMO_VIN, DriveType::Electric)
        .with_climatization(climatization)
        .with_charging(charging)
        .with_electric_drive(drive)
        .with_outside_temperature()
        .with_doors(doors)
        .with_window_heatings(heatings);
    vehicle.name.set_value("Demo ID.3".to_string());
    vehicle.manufacturer.set_value("Volkswagen".to_string());
    vehicle.model.set_value("ID.3".to_string());
    vehicle.software_version.set_value("3.2".to_string());
    if let Some(temperature) = &vehicle.outside_temperature {
        temperature.set_value(12.5);
    }
    vehicle.commands.add(Command::new(
        HONK_FLASH,
        Arc::new(|action: CommandAction| {
            info!("[Sim] {}", action);
            Ok(())
        }),
    ));

    vehicle.flag.set_enabled(true);
    Arc::new(vehicle)
}

fn climatization_command(climatization: &Climatization) -> Command {
    let state = climatization.state.clone();
    let reached = climatization.estimated_date_reached.clone();
    Command::new(
        START_STOP,
        Arc::new(move |action: CommandAction| {
            match action {
                CommandAction::Start => {
                    state.set_value(ClimatizationState::Heating);
                    reached.set_value(Utc::now() + chrono::Duration::minutes(CLIMATIZATION_MINUTES));
                }
                CommandAction::Stop => {
                    state.set_value(ClimatizationState::Off);
                    reached.clear_value();
                }
                _ => return Err(SetterError::NotSupported(action.to_string())),
            }
            info!("[Sim] Climatization {}", action);
            Ok(())
        }),
    )
}

fn charging_command(charging: &Charging) -> Command {
    let state = charging.state.clone();
    let power = charging.power.clone();
    let connection = charging
        .connector
        .as_ref()
        .map(|connector| connector.connection_state.clone());
    Command::new(
        START_STOP,
        Arc::new(move |action: CommandAction| {
            match action {
                CommandAction::Start => {
                    let plugged = connection
                        .as_ref()
                        .and_then(|connection| connection.value())
                        == Some(ConnectionState::Connected);
                    if !plugged {
                        return Err(SetterError::Rejected("charging cable not connected".into()));
                    }
                    state.set_value(ChargingState::Charging);
                    power.set_value(CHARGING_POWER_KW);
                }
                CommandAction::Stop => {
                    state.set_value(ChargingState::ReadyForCharging);
                    power.set_value(0.0);
                }
                _ => return Err(SetterError::NotSupported(action.to_string())),
            }
            info!("[Sim] Charging {}", action);
            Ok(())
        }),
    )
}

/// Advance the simulated telemetry by one tick.
fn step(vehicle: &Vehicle, temperature_drift: f64) {
    if let Some(temperature) = &vehicle.outside_temperature {
        let current = temperature.value().unwrap_or(12.5);
        temperature.set_value(((current + temperature_drift) * 10.0).round() / 10.0);
    }

    let (Some(drive), Some(charging)) = (&vehicle.electric_drive, &vehicle.charging) else {
        return;
    };
    let level = drive.level.value().unwrap_or(LEVEL_MIN);
    if charging.state.value() == Some(ChargingState::Charging) {
        let level = (level + LEVEL_STEP_CHARGING).min(100.0);
        drive.level.set_value(level);
        if level >= 100.0 {
            info!("[Sim] Battery full, charging stopped");
            charging.state.set_value(ChargingState::ReadyForCharging);
            charging.power.set_value(0.0);
        }
    } else {
        drive.level.set_value((level - LEVEL_STEP_IDLE).max(LEVEL_MIN));
    }

    if let Some(climatization) = &vehicle.climatization
        && climatization
            .estimated_date_reached
            .value()
            .is_some_and(|reached| reached <= Utc::now())
    {
        climatization.state.set_value(ClimatizationState::Off);
        climatization.estimated_date_reached.clear_value();
    }
}

fn temperature_drift() -> f64 {
    rand::thread_rng().gen_range(-0.5..=0.5)
}

/// Spawn the task that updates the demo vehicle every [`SIMULATION_INTERVAL`].
pub fn run_vehicle_simulation(vehicle: Arc<Vehicle>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(SIMULATION_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    step(&vehicle, temperature_drift());
                    debug!("[Sim] Tick for {}", DEMO_VIN);
                }
            }
        }
        debug!("[Sim] Simulation stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessories::CapabilityKind;
    use strum::IntoEnumIterator;
    use tokio_test::{assert_err, assert_ok};

    fn charging(vehicle: &Vehicle) -> &Charging {
        vehicle.charging.as_ref().unwrap()
    }

    fn level(vehicle: &Vehicle) -> f64 {
        vehicle.electric_drive.as_ref().unwrap().level.value().unwrap()
    }

    #[test]
    fn test_demo_vehicle_offers_every_capability() {
        let vehicle = demo_vehicle();
        assert!(vehicle.is_enabled());
        assert_eq!(vehicle.vin().as_deref(), Some(DEMO_VIN));
        for kind in CapabilityKind::iter() {
            assert!(kind.is_available(&vehicle), "{kind} unavailable");
        }
    }

    #[test]
    fn test_charging_requires_cable() {
        let vehicle = demo_vehicle();
        let command = charging(&vehicle).commands.get(START_STOP).unwrap();
        if let Some(connector) = &charging(&vehicle).connector {
            connector.connection_state.set_value(ConnectionState::Disconnected);
        }
        let err = assert_err!(command.execute(CommandAction::Start));
        assert!(matches!(err, SetterError::Rejected(_)));
        assert_eq!(
            charging(&vehicle).state.value(),
            Some(ChargingState::ReadyForCharging)
        );
    }

    #[test]
    fn test_step_charges_battery() {
        let vehicle = demo_vehicle();
        let command = charging(&vehicle).commands.get(START_STOP).unwrap();
        assert_ok!(command.execute(CommandAction::Start));
        assert_eq!(charging(&vehicle).power.value(), Some(CHARGING_POWER_KW));

        step(&vehicle, 0.0);
        assert_eq!(level(&vehicle), 65.0);

        command.execute(CommandAction::Stop).unwrap();
        step(&vehicle, 0.0);
        assert!(level(&vehicle) < 65.0);
    }

    #[test]
    fn test_full_battery_stops_charging() {
        let vehicle = demo_vehicle();
        vehicle.electric_drive.as_ref().unwrap().level.set_value(99.5);
        charging(&vehicle)
            .commands
            .get(START_STOP)
            .unwrap()
            .execute(CommandAction::Start)
            .unwrap();

        step(&vehicle, 0.0);
        assert_eq!(level(&vehicle), 100.0);
        assert_eq!(
            charging(&vehicle).state.value(),
            Some(ChargingState::ReadyForCharging)
        );
    }

    #[test]
    fn test_lock_command_updates_state() {
        let vehicle = demo_vehicle();
        let doors = vehicle.doors.as_ref().unwrap();
        let command = doors.commands.get(LOCK_UNLOCK).unwrap();
        assert_ok!(command.execute(CommandAction::Unlock));
        assert_eq!(doors.lock_state.value(), Some(LockState::Unlocked));
        assert_err!(command.execute(CommandAction::Flash));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let task = run_vehicle_simulation(demo_vehicle(), shutdown.clone());
        tokio::time::sleep(SIMULATION_INTERVAL * 2).await;
        shutdown.cancel();
        task.await.unwrap();
    }
}
