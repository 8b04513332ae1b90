use std::sync::Mutex;
use std::time::Duration;

use crate::entity::EntityId;
use crate::setup::StateSink;
use crate::state::{ClimateState, StateView};

pub fn set_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    notified: Mutex<Vec<EntityId>>,
}

impl RecordingSink {
    pub fn notified(&self) -> Vec<EntityId> {
        self.notified.lock().unwrap().clone()
    }
}

impl StateSink for RecordingSink {
    fn notify_state_changed(&self, entity_id: &EntityId) {
        self.notified.lock().unwrap().push(entity_id.clone());
    }
}

pub async fn wait_for_state(view: &StateView, predicate: impl FnMut(&ClimateState) -> bool) -> bool {
    let mut rx = view.watch();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(predicate))
        .await
        .map(|reached| reached.is_ok())
        .unwrap_or(false)
}
