use async_channel::Receiver;
use error_stack::{Result, ResultExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use log::{debug, error, info, warn};

use crate::channel::{Ack, ChannelReport, Field, ThermostatChannel, WireValue};
use crate::entity::EntityId;
use crate::error::AdapterError;
use crate::messages::{PendingCommand, ToDispatcherMessage};
use crate::registry::ClimateRegistry;
use crate::setup::StateSink;
use crate::state::{ClimateState, StateCache, StateView, Value};

/// Sole writer of one channel's state cache. Set operations run one at a time, in queue order.
pub struct Dispatcher {
    entity_id: EntityId,
    channel: Arc<dyn ThermostatChannel>,
    registry: Arc<ClimateRegistry>,
    cache: StateCache,
    reports: Receiver<ChannelReport>,
    sink: Arc<dyn StateSink>,
}

impl Dispatcher {
    pub fn new(
        entity_id: EntityId,
        channel: Arc<dyn ThermostatChannel>,
        registry: Arc<ClimateRegistry>,
        sink: Arc<dyn StateSink>,
    ) -> (Dispatcher, StateView) {
        // Subscribe before seeding so no report falls in between
        let reports = channel.subscribe();

        let mut initial = ClimateState::default();
        for field in Field::ALL {
            initial.set(field, registry.decode(field, channel.current_reading(field)));
        }

        let (cache, view) = StateCache::new(initial);
        let dispatcher = Dispatcher {
            entity_id,
            channel,
            registry,
            cache,
            reports,
            sink,
        };

        (dispatcher, view)
    }

    pub async fn dispatcher_worker(
        self,
        to_dispatcher_channel: Receiver<ToDispatcherMessage>,
        cancel_token: CancellationToken,
    ) {
        let mut reports_open = true;
        info!("Dispatcher for {} started", self.entity_id);

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Dispatcher for {} cancelled", self.entity_id);
                    break;
                }

                report = self.reports.recv(), if reports_open => match report {
                    Ok(report) => self.apply_report(report),
                    Err(_) => {
                        warn!("Push reports for {} stopped, only commands will update its state", self.entity_id);
                        reports_open = false;
                    }
                },

                message = to_dispatcher_channel.recv() => match message {
                    Ok(message) => self.handle_message(message).await,
                    Err(_) => {
                        info!("Command queue for {} closed", self.entity_id);
                        break;
                    }
                },
            }
        }
    }

    async fn handle_message(&self, message: ToDispatcherMessage) {
        match message {
            ToDispatcherMessage::SetTarget(PendingCommand {
                field,
                value,
                wire,
                reply,
            }) => {
                let outcome = self.dispatch(field, value, wire).await;

                if reply.send(outcome).is_err() {
                    debug!(
                        "Caller of {} on {} went away, outcome was applied anyway",
                        field, self.entity_id
                    );
                }
            }
        }
    }

    async fn dispatch(&self, field: Field, value: Value, wire: WireValue) -> Result<(), AdapterError> {
        let into_context = || {
            AdapterError::Transport(format!(
                "Setting {} to {:?} on channel {}",
                field,
                wire,
                self.channel.id()
            ))
        };

        debug!("Dispatching {} = {:?} for {}", field, wire, self.entity_id);

        match self.channel.set_value(field, wire).await.change_context_lazy(into_context) {
            Ok(Ack) => {
                self.cache.write(field, Some(value));
                self.sink.notify_state_changed(&self.entity_id);
                Ok(())
            }

            Err(e) => {
                error!("Failed to set {} for {}: {:?}", field, self.entity_id, e);
                Err(e)
            }
        }
    }

    fn apply_report(&self, report: ChannelReport) {
        debug!("Push report for {}: {:?}", self.entity_id, report);

        let value = self.registry.decode(report.field, report.value);
        if self.cache.write(report.field, value) {
            self.sink.notify_state_changed(&self.entity_id);
        }
    }
}
