use async_channel::Sender;
use log::{error, info};
use rustop::opts;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use velbus_climate::{
    channel::TemperatureRange,
    sim::{self, SimulatedBus, SimulatedChannel},
    ChannelId, ClimateConfig, ClimatePlatform, ControlSurface, EntityId, Field, SetupContext,
    StateSink, WireValue,
};

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn get_version() -> String {
    format!("{} (built {})", built_info::PKG_VERSION, built_info::BUILT_TIME_UTC)
}

struct ChangeForwarder(Sender<EntityId>);

impl StateSink for ChangeForwarder {
    fn notify_state_changed(&self, entity_id: &EntityId) {
        let _ = self.0.try_send(entity_id.clone());
    }
}

#[tokio::main]
async fn main() {
    let (args, _) = opts! {
        synopsis "Velbus thermostat climate adapter, running against a simulated bus";
        opt channels:u8=2, desc: "Number of simulated thermostat channels";
        opt config:Option<String>, desc: "JSON configuration file";
        opt latency:u64=50, desc: "Simulated bus latency (in milliseconds)";
        opt reporting:u16=5, desc: "Temperature report period (in seconds)";
    }.parse_or_exit();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("velbus_climate {}", get_version());

    let config = match args.config {
        Some(path) => match ClimateConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("{:?}", e);
                std::process::exit(1);
            }
        },
        None => ClimateConfig::default(),
    };

    let channels: Vec<Arc<SimulatedChannel>> = (0..args.channels)
        .map(|n| {
            Arc::new(
                SimulatedChannel::new(
                    ChannelId { address: 0x20u8.wrapping_add(n), channel: 1 },
                    format!("Thermostat {}", n + 1),
                )
                .with_range(TemperatureRange { min: 5.0, max: 30.0 })
                .with_latency(Duration::from_millis(args.latency))
                .with_reading(Field::CurrentTemperature, WireValue::Temperature(20.5))
                .with_reading(Field::TargetTemperature, WireValue::Temperature(21.0))
                .with_reading(Field::Mode, WireValue::CoolMode(false)),
            )
        })
        .collect();

    let bus = Arc::new(SimulatedBus::new(channels.clone()));
    let (changed_tx, changed_rx) = async_channel::unbounded();
    let context = SetupContext::new(bus.clone(), bus.ready_signal());

    let platform = match ClimatePlatform::new(config, context, Arc::new(ChangeForwarder(changed_tx))) {
        Ok(platform) => platform,
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    };

    bus.finish_scan();
    let platform = match platform.setup_entry().await {
        Ok(platform) => platform,
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    };

    let entities = platform.entities().to_vec();
    tokio::spawn(async move {
        while let Ok(entity_id) = changed_rx.recv().await {
            if let Some(entity) = entities.iter().find(|e| e.entity_id() == &entity_id) {
                match serde_json::to_string(&entity.state()) {
                    Ok(state) => info!("{} state: {}", entity_id, state),
                    Err(e) => error!("Cannot serialize state of {}: {}", entity_id, e),
                }
            }
        }
    });

    let reporting_period = Duration::from_secs(args.reporting.max(1) as u64);
    let reporter = tokio::spawn(sim::report_worker(reporting_period, channels));

    if let Some(entity) = platform.entities().first() {
        if let Err(e) = entity.set_preset_mode("comfort").await {
            error!("Initial preset failed: {:?}", e);
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot wait for ctrl-c: {}", e);
    }

    reporter.abort();
    let _ = platform.unload().await;
}
