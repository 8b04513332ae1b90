use error_stack::{Report, Result};
use log::{error, info};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::{sync::watch, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::{
    channel::{BusController, ThermostatChannel},
    config::ClimateConfig,
    dispatcher::Dispatcher,
    entity::{ClimateEntity, ControlSurface, EntityId},
    error::{AdapterError, ConfigError},
    registry::ClimateRegistry,
};

/// Host side hook, called every time an entity's cached state is written.
pub trait StateSink: Send + Sync {
    fn notify_state_changed(&self, entity_id: &EntityId);
}

/// Everything a configuration entry hands to the climate platform.
pub struct SetupContext {
    controller: Arc<dyn BusController>,
    ready: watch::Receiver<bool>,
}

impl SetupContext {
    /// `ready` flips to `true` once the controller finished scanning the bus.
    pub fn new(controller: Arc<dyn BusController>, ready: watch::Receiver<bool>) -> Self {
        SetupContext { controller, ready }
    }

    pub async fn wait_until_ready(&self) -> Result<(), AdapterError> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Report::new(AdapterError::SetupAborted))
    }
}

pub struct Started {}
pub struct Stopped {}

pub struct ClimatePlatform<Status = Stopped> {
    config: ClimateConfig,
    registry: Arc<ClimateRegistry>,
    context: SetupContext,
    sink: Arc<dyn StateSink>,

    entities: Vec<Arc<ClimateEntity>>,
    workers: JoinSet<()>,
    cancel_token: CancellationToken,
    _status: PhantomData<Status>,
}

impl ClimatePlatform {
    pub fn new(
        config: ClimateConfig,
        context: SetupContext,
        sink: Arc<dyn StateSink>,
    ) -> Result<ClimatePlatform<Stopped>, ConfigError> {
        config.validate()?;
        let registry = Arc::new(config.registry()?);

        Ok(ClimatePlatform {
            config,
            registry,
            context,
            sink,
            entities: Vec::new(),
            workers: JoinSet::new(),
            cancel_token: CancellationToken::new(),
            _status: PhantomData,
        })
    }
}

impl<Status> ClimatePlatform<Status> {
    fn into_status<Next>(self) -> ClimatePlatform<Next> {
        ClimatePlatform {
            config: self.config,
            registry: self.registry,
            context: self.context,
            sink: self.sink,
            entities: self.entities,
            workers: self.workers,
            cancel_token: self.cancel_token,
            _status: PhantomData,
        }
    }
}

impl ClimatePlatform<Stopped> {
    /// Waits for the bus scan, then creates one entity and one dispatcher worker per climate channel.
    pub async fn setup_entry(mut self) -> Result<ClimatePlatform<Started>, AdapterError> {
        self.context.wait_until_ready().await?;

        self.cancel_token = CancellationToken::new();
        for channel in self.context.controller.climate_channels() {
            let entity = self.add_channel(channel);
            self.entities.push(entity);
        }

        info!("Climate platform set up with {} entities", self.entities.len());
        Ok(self.into_status())
    }

    fn add_channel(&mut self, channel: Arc<dyn ThermostatChannel>) -> Arc<ClimateEntity> {
        let id = channel.id();
        let range = self
            .config
            .temperature_range
            .unwrap_or_else(|| channel.temperature_range());

        let (dispatcher, state) = Dispatcher::new(
            EntityId::for_channel(id),
            channel.clone(),
            self.registry.clone(),
            self.sink.clone(),
        );

        let (to_dispatcher_tx, to_dispatcher_rx) = async_channel::bounded(self.config.queue_depth());
        let span = info_span!("dispatcher", channel = %id);
        self.workers.spawn(
            dispatcher
                .dispatcher_worker(to_dispatcher_rx, self.cancel_token.clone())
                .instrument(span),
        );

        info!("Added climate entity for channel {} ({})", id, channel.name());
        Arc::new(ClimateEntity::new(
            channel.as_ref(),
            range,
            self.registry.clone(),
            state,
            to_dispatcher_tx,
        ))
    }
}

impl ClimatePlatform<Started> {
    pub fn entities(&self) -> &[Arc<ClimateEntity>] {
        &self.entities
    }

    pub fn entity(&self, entity_id: &EntityId) -> Option<Arc<ClimateEntity>> {
        self.entities
            .iter()
            .find(|entity| entity.entity_id() == entity_id)
            .cloned()
    }

    /// Stops every dispatcher. Commands already on the bus finish first.
    pub async fn unload(mut self) -> ClimatePlatform<Stopped> {
        self.cancel_token.cancel();

        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("Dispatcher worker ended abnormally: {:?}", e);
            }
        }

        self.entities.clear();
        info!("Climate platform unloaded");
        self.into_status()
    }
}
