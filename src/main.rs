use carconnectivity_homekit_bridge::bridge::Bridge;
use carconnectivity_homekit_bridge::config::{self, Args, Config};
use carconnectivity_homekit_bridge::error::Result;
use carconnectivity_homekit_bridge::hap::{AccessoryHost, Category, LogHost, setup};
use carconnectivity_homekit_bridge::input::simulation;
use carconnectivity_homekit_bridge::instance_lock::InstanceLock;
use carconnectivity_homekit_bridge::store::IdentityStore;
use carconnectivity_homekit_bridge::vehicle::Garage;
use clap::Parser;
use log::{LevelFilter, error, info};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle};
use tokio::signal;
use tokio_util::sync::CancellationToken;

fn init_logger(level: Option<LevelFilter>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    // RUST_LOG wins over the configured level.
    if let Some(level) = level
        && std::env::var_os("RUST_LOG").is_none()
    {
        builder.filter_level(level);
    }
    builder.format_timestamp_millis().init();
}

// The environment is settled before the runtime spawns its workers.
fn main() {
    config::load_dotenv();
    let config = Config::from_env().with_args(Args::parse());
    init_logger(config.log_filter().ok().flatten());

    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    let runtime = match Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(config)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting CarConnectivity HomeKit Bridge");
    info!("Configuration loaded:");
    info!("  Bridge Name: {}", config.bridge_name);
    info!("  Port: {}", config.port);
    info!("  Accessory Config: {:?}", config.accessory_config_file);

    let _lock = InstanceLock::acquire(&config.accessory_config_file)?;
    let store = IdentityStore::load(&config.accessory_config_file)?;

    let pincode = config.pincode_or_generate();
    if config.pincode.is_none() {
        info!("  Generated Pincode: {}", pincode);
    }
    let setup_uri = setup::setup_uri(&pincode, &setup::generate_setup_id(), Category::Bridge.code())?;
    info!("  Setup URI: {}", setup_uri);

    let host: Arc<dyn AccessoryHost> = Arc::new(LogHost::new());
    let shutdown = CancellationToken::new();
    let bridge = Bridge::new(
        store,
        config.bridge_settings()?,
        host,
        Handle::current(),
        shutdown.clone(),
    );

    let garage = Garage::new();
    bridge.attach_garage(&garage);

    let simulation_task = config.simulate.then(|| {
        let vehicle = simulation::demo_vehicle();
        garage.add_vehicle(vehicle.clone());
        simulation::run_vehicle_simulation(vehicle, shutdown.clone())
    });

    info!(
        "CarConnectivity HomeKit Bridge is running with {} accessories",
        bridge.accessories().len()
    );
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    shutdown.cancel();
    if let Some(task) = simulation_task
        && let Err(e) = task.await
    {
        error!("Simulation task failed: {}", e);
    }
    bridge.shutdown();

    info!("CarConnectivity HomeKit Bridge stopped");
    Ok(())
}
