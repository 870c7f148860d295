//! Forwards every domain event to an attachable out-of-process push channel
//! (e.g. a websocket/UI layer owned by the surrounding application). The
//! core's obligation stops at offering this attach point.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bus::EventBus;
use crate::types::DomainEvent;

pub struct PushForwarder {
    task: JoinHandle<()>,
}

impl PushForwarder {
    /// Subscribe to `bus` and forward every event to `sender` until either
    /// the bus closes or the receiving end is dropped.
    pub fn attach(bus: &EventBus, sender: mpsc::Sender<DomainEvent>) -> Self {
        let mut subscriber = bus.subscribe();
        let task = tokio::spawn(async move {
            while let Some(event) = subscriber.recv().await {
                if sender.send(event).await.is_err() {
                    debug!("push forwarder: receiver dropped, detaching");
                    break;
                }
            }
        });
        Self { task }
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
