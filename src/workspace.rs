// Workspace: a mounted store plus the poller that tracks its jobs

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::gateway::RemoteGateway;
use crate::jobs::{JobPoller, PollerHandle};
use crate::models::{AnalysisJob, QuickTrainConfig};
use crate::notify::{Notification, Notifier};
use crate::types::AppResult;
use crate::workflow::WorkflowStore;

pub struct Workspace {
    store: Arc<WorkflowStore>,
    poller: PollerHandle,
}

impl Workspace {
    /// Build the store and start polling. Notifications from both arrive on
    /// the returned receiver.
    pub fn mount(
        config: &Config,
        gateway: Arc<dyn RemoteGateway>,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (notifier, notifications) = Notifier::channel(config.workspace.notification_capacity);
        let store = Arc::new(WorkflowStore::new(
            gateway.clone(),
            notifier.clone(),
            config.workspace.clone(),
        ));
        let poller = JobPoller::spawn(gateway, config.poller.clone(), notifier);
        info!("Workspace mounted");
        (Self { store, poller }, notifications)
    }

    pub fn store(&self) -> &Arc<WorkflowStore> {
        &self.store
    }

    pub fn poller(&self) -> &PollerHandle {
        &self.poller
    }

    pub async fn run_analysis(&self, intent: &str, model: Option<&str>) -> AppResult<AnalysisJob> {
        let job = self.store.run_analysis(intent, model).await?;
        self.poller.trigger_aggressive();
        Ok(job)
    }

    pub async fn quick_train(&self, config: QuickTrainConfig) -> AppResult<AnalysisJob> {
        let job = self.store.quick_train(config).await?;
        self.poller.trigger_aggressive();
        Ok(job)
    }

    /// Re-fetch the active tool when the poller has seen it in a different
    /// status. Returns whether a refresh happened.
    pub async fn sync_active_tool(&self) -> AppResult<bool> {
        let Some(tool) = self.store.snapshot().await.active_tool else {
            return Ok(false);
        };
        let observed = self
            .poller
            .jobs()
            .into_iter()
            .find(|job| job.id == tool.id)
            .map(|job| job.status);

        match observed {
            Some(status) if status != tool.status => {
                debug!("Active tool {} moved from {} to {}", tool.id, tool.status, status);
                self.store.refresh_active_tool().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn unmount(self) {
        self.store.close();
        self.poller.shutdown().await;
        info!("Workspace unmounted");
    }
}
