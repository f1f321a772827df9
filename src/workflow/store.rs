//! Workflow Store
//!
//! Owns the `WorkspaceState` and exposes the operations that are the only
//! legal way to change it. Every operation follows the same shape: validate
//! locally, flag `is_processing`, perform the remote calls, then commit one
//! state patch. A failed remote call is surfaced as a notification and
//! leaves the state as it was.
//!
//! Operations may be invoked concurrently and suspend at every gateway call.
//! Two of them carry latest-wins request tokens: dataset selection (keyed by
//! the active-dataset slot) and the add-path of each comparison id. A
//! completion whose token was superseded is dropped instead of committed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::config::WorkspaceConfig;
use crate::gateway::RemoteGateway;
use crate::models::{
    AnalysisJob, CreateJobRequest, Dataset, DatasetMetadata, FredMergeConfig, InsightRequest,
    InsightResult, QuickTrainConfig, UploadFile,
};
use crate::notify::{Notification, Notifier};
use crate::types::{AppError, AppResult};
use crate::workflow::gate::{self, StageAvailability};
use crate::workflow::state::{Stage, WorkspaceState};

const ACTIVE_DATASET: &str = "active-dataset";
const COMPARE_PREFIX: &str = "compare:";
const MULTI_INSIGHTS: &str = "multi-insights";
const MAX_JOB_NAME_LEN: usize = 48;

fn compare_key(id: &str) -> String {
    format!("{COMPARE_PREFIX}{id}")
}

#[derive(Default)]
struct StoreInner {
    state: WorkspaceState,
    tokens: HashMap<String, u64>,
    next_token: u64,
}

impl StoreInner {
    fn issue(&mut self, key: &str) -> u64 {
        self.next_token += 1;
        self.tokens.insert(key.to_string(), self.next_token);
        self.next_token
    }

    fn is_current(&self, key: &str, token: u64) -> bool {
        self.tokens.get(key) == Some(&token)
    }

    /// The comparison selection changed; any multi-dataset result in flight
    /// was computed for the old selection
    fn comparison_changed(&mut self) {
        self.state.multi_insights = None;
        self.issue(MULTI_INSIGHTS);
    }

    fn invalidate_prefix(&mut self, prefix: &str) {
        let keys: Vec<String> = self
            .tokens
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in keys {
            self.issue(&key);
        }
    }
}

pub struct WorkflowStore {
    gateway: Arc<dyn RemoteGateway>,
    notifier: Notifier,
    settings: WorkspaceConfig,
    inner: RwLock<StoreInner>,
    closed: AtomicBool,
}

impl WorkflowStore {
    pub fn new(gateway: Arc<dyn RemoteGateway>, notifier: Notifier, settings: WorkspaceConfig) -> Self {
        Self {
            gateway,
            notifier,
            settings,
            inner: RwLock::new(StoreInner::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Clone of the current state for rendering
    pub async fn snapshot(&self) -> WorkspaceState {
        self.inner.read().await.state.clone()
    }

    pub async fn stage(&self) -> Stage {
        self.inner.read().await.state.stage
    }

    pub async fn reachable(&self) -> StageAvailability {
        gate::reachable(&self.inner.read().await.state)
    }

    /// Stop accepting commits; pending operations finish without effect
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ---- commit plumbing ----------------------------------------------------

    async fn commit<F>(&self, patch: F) -> bool
    where
        F: FnOnce(&mut WorkspaceState),
    {
        let mut inner = self.inner.write().await;
        if self.is_closed() {
            return false;
        }
        patch(&mut inner.state);
        true
    }

    /// Commit only if `token` is still the latest issued for `key`
    async fn commit_current<F>(&self, key: &str, token: u64, patch: F) -> bool
    where
        F: FnOnce(&mut WorkspaceState),
    {
        self.commit_inner_current(key, token, |inner| patch(&mut inner.state))
            .await
    }

    async fn commit_inner_current<F>(&self, key: &str, token: u64, patch: F) -> bool
    where
        F: FnOnce(&mut StoreInner),
    {
        let mut inner = self.inner.write().await;
        if self.is_closed() {
            return false;
        }
        if !inner.is_current(key, token) {
            debug!("Discarding superseded result for {}", key);
            return false;
        }
        patch(&mut *inner);
        true
    }

    async fn issue_token(&self, key: &str) -> u64 {
        self.inner.write().await.issue(key)
    }

    async fn set_processing(&self, processing: bool) {
        self.commit(|state| state.is_processing = processing).await;
    }

    /// Run a remote-backed operation with the processing flag raised.
    /// Failures are surfaced here so no caller has to clean up after them.
    async fn run<T, F>(&self, failure_title: &str, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.set_processing(true).await;
        let result = operation.await;
        self.set_processing(false).await;
        if let Err(e) = &result {
            self.surface(failure_title, e).await;
        }
        result
    }

    /// Reject before any remote call
    async fn reject<T>(&self, failure_title: &str, err: AppError) -> AppResult<T> {
        self.surface(failure_title, &err).await;
        Err(err)
    }

    async fn surface(&self, title: &str, err: &AppError) {
        error!("{}: {}", title, err);
        let message = err.to_string();
        if self.commit(|state| state.last_error = Some(message.clone())).await {
            self.notifier.error(title, message);
        }
    }

    /// A torn-down workspace has nobody to tell
    fn announce(&self, notification: Notification) {
        if !self.is_closed() {
            self.notifier.notify(notification);
        }
    }

    fn degraded<T>(&self, what: &str, dataset_id: &str, result: AppResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Could not load {} for dataset {}: {}", what, dataset_id, e);
                None
            }
        }
    }

    async fn fetch_metadata(&self, dataset_id: &str) -> Option<DatasetMetadata> {
        let result = self.gateway.get_metadata(dataset_id).await;
        self.degraded("metadata", dataset_id, result)
    }

    async fn active_dataset_id(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .state
            .active_dataset
            .as_ref()
            .map(|d| d.id.clone())
    }

    async fn active_tool(&self) -> Option<AnalysisJob> {
        self.inner.read().await.state.active_tool.clone()
    }

    // ---- operations ---------------------------------------------------------

    pub async fn refresh_datasets(&self) -> AppResult<()> {
        self.run("Failed to load datasets", async {
            let datasets = self.gateway.list_datasets().await?;
            info!("Loaded {} datasets", datasets.len());
            self.commit(|state| state.datasets = datasets).await;
            Ok(())
        })
        .await
    }

    pub async fn select_dataset(&self, id: &str) -> AppResult<()> {
        debug!("Selecting dataset {}", id);
        let token = self.issue_token(ACTIVE_DATASET).await;

        self.run("Failed to load dataset", async {
            let (dataset, preview, metadata) = tokio::join!(
                self.gateway.get_dataset(id),
                self.gateway.get_preview(id, self.settings.preview_rows),
                self.gateway.get_metadata(id),
            );
            let dataset = dataset?;
            let preview = preview?;
            let metadata = self.degraded("metadata", id, metadata);
            let insights = dataset.cached_insights.as_ref().map(InsightResult::from);

            self.commit_current(ACTIVE_DATASET, token, |state| {
                state.preview_columns = preview.columns;
                state.preview_rows = preview.rows;
                state.metadata = metadata;
                state.data_insights = insights;
                state.active_dataset = Some(dataset);
                state.stage = Stage::Explore;
            })
            .await;
            Ok(())
        })
        .await
    }

    /// Upload a file as a new dataset. The new dataset is not selected.
    pub async fn upload_dataset(
        &self,
        file: UploadFile,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Dataset> {
        if name.trim().is_empty() {
            return self
                .reject("Upload failed", AppError::validation("dataset name is required"))
                .await;
        }
        if file.data.is_empty() {
            return self
                .reject("Upload failed", AppError::validation("file is empty"))
                .await;
        }

        self.run("Upload failed", async {
            let created = self.gateway.create_dataset(file, name.trim(), description).await?;
            info!("Uploaded dataset {} ({})", created.name, created.id);

            let refreshed = self.gateway.list_datasets().await;
            self.commit(|state| match refreshed {
                Ok(datasets) => state.datasets = datasets,
                Err(e) => {
                    warn!("Catalog refresh after upload failed: {}", e);
                    if !state.datasets.iter().any(|d| d.id == created.id) {
                        state.datasets.push(created.clone());
                    }
                }
            })
            .await;

            self.announce(Notification::success(
                "Dataset uploaded",
                format!("{} is ready to explore", created.name),
            ));
            Ok(created)
        })
        .await
    }

    pub async fn run_analysis(&self, intent: &str, model: Option<&str>) -> AppResult<AnalysisJob> {
        const TITLE: &str = "Analysis failed";
        let Some(dataset_id) = self.active_dataset_id().await else {
            return self
                .reject(TITLE, AppError::validation("select a dataset before running an analysis"))
                .await;
        };
        let intent = intent.trim();
        if intent.is_empty() {
            return self
                .reject(TITLE, AppError::validation("describe what you want to predict"))
                .await;
        }

        let request = CreateJobRequest {
            dataset_id,
            name: job_name(intent),
            intent: intent.to_string(),
            model: model.map(str::to_string),
        };

        self.run(TITLE, async {
            let job = self.gateway.create_job(&request).await?;
            info!("Created analysis {} with status {}", job.id, job.status);
            let committed = job.clone();
            self.commit(|state| {
                state.active_tool = Some(committed);
                state.stage = Stage::Insights;
            })
            .await;
            Ok(job)
        })
        .await
    }

    /// Configure and start training the active tool in one step
    pub async fn quick_train(&self, config: QuickTrainConfig) -> AppResult<AnalysisJob> {
        const TITLE: &str = "Training failed";
        let Some(tool) = self.active_tool().await else {
            return self
                .reject(TITLE, AppError::validation("run an analysis before training"))
                .await;
        };
        if let Err(e) = validate_train_config(&config, &tool) {
            return self.reject(TITLE, e).await;
        }

        self.run(TITLE, async {
            self.gateway.configure_job(&tool.id, &config).await?;
            let job = self.gateway.train_job(&tool.id).await?;
            info!("Training started for {} ({})", job.name, job.status);
            let committed = job.clone();
            self.commit(|state| {
                state.active_tool = Some(committed);
                state.stage = Stage::Predict;
            })
            .await;
            self.announce(Notification::success(
                "Training started",
                format!("{} is training", job.name),
            ));
            Ok(job)
        })
        .await
    }

    /// Merge FRED series into the active dataset, then reload it so the new columns show
    pub async fn merge_fred(&self, config: FredMergeConfig) -> AppResult<()> {
        const TITLE: &str = "FRED merge failed";
        let Some(dataset_id) = self.active_dataset_id().await else {
            return self
                .reject(TITLE, AppError::validation("select a dataset before merging FRED data"))
                .await;
        };
        if let Err(e) = config.validate() {
            return self.reject(TITLE, e.into()).await;
        }

        self.run(TITLE, async {
            self.gateway.merge_fred(&dataset_id, &config).await?;
            let (dataset, preview) = tokio::try_join!(
                self.gateway.get_dataset(&dataset_id),
                self.gateway.get_preview(&dataset_id, self.settings.preview_rows),
            )?;

            // Keep a comparison entry for this dataset from going stale
            let in_comparison = self.inner.read().await.state.compare.contains(&dataset_id);
            let compare_entry = if in_comparison {
                let (preview, metadata) = tokio::join!(
                    self.gateway.get_preview(&dataset_id, self.settings.compare_preview_rows),
                    self.fetch_metadata(&dataset_id),
                );
                self.degraded("comparison preview", &dataset_id, preview)
                    .map(|p| (p, metadata))
            } else {
                None
            };

            self.commit(|state| {
                if state.is_active_dataset(&dataset_id) {
                    state.preview_columns = preview.columns;
                    state.preview_rows = preview.rows;
                    state.active_dataset = Some(dataset.clone());
                }
                if let Some((preview, metadata)) = compare_entry {
                    state.compare.refresh(&dataset_id, preview, metadata);
                }
                if let Some(entry) = state.datasets.iter_mut().find(|d| d.id == dataset_id) {
                    *entry = dataset;
                }
            })
            .await;

            self.announce(Notification::success(
                "FRED data merged",
                format!("Merged {} series", config.series_ids.len()),
            ));
            Ok(())
        })
        .await
    }

    /// Toggle `id` in the comparison selection. Returns whether it is selected afterwards.
    pub async fn toggle_compare_dataset(&self, id: &str) -> AppResult<bool> {
        let key = compare_key(id);
        {
            let mut inner = self.inner.write().await;
            if self.is_closed() {
                return Ok(false);
            }
            if inner.state.compare.contains(id) {
                inner.issue(&key);
                inner.state.compare.remove(id);
                inner.comparison_changed();
                debug!("Removed {} from comparison", id);
                return Ok(false);
            }
        }

        let token = self.issue_token(&key).await;
        self.run("Failed to add dataset to comparison", async {
            let (preview, metadata) = tokio::join!(
                self.gateway.get_preview(id, self.settings.compare_preview_rows),
                self.fetch_metadata(id),
            );
            let preview = preview?;
            let applied = self
                .commit_inner_current(&key, token, |inner| {
                    inner.state.compare.insert(id, preview, metadata);
                    inner.comparison_changed();
                })
                .await;
            Ok(applied)
        })
        .await
    }

    pub async fn clear_compare_datasets(&self) {
        let mut inner = self.inner.write().await;
        if self.is_closed() {
            return;
        }
        inner.invalidate_prefix(COMPARE_PREFIX);
        inner.state.compare.clear();
        inner.comparison_changed();
    }

    pub async fn delete_dataset(&self, id: &str) -> AppResult<()> {
        self.run("Failed to delete dataset", async {
            self.gateway.delete_dataset(id).await?;
            info!("Deleted dataset {}", id);

            {
                let mut inner = self.inner.write().await;
                if !self.is_closed() {
                    // Also supersedes an add of this id still in flight
                    inner.issue(&compare_key(id));
                    if inner.state.compare.contains(id) {
                        inner.state.compare.remove(id);
                        inner.comparison_changed();
                    }
                    let state = &mut inner.state;
                    if state.is_active_dataset(id) {
                        state.clear_active_dataset();
                        state.stage = Stage::Upload;
                    }
                    state.datasets.retain(|d| d.id != id);
                }
            }

            match self.gateway.list_datasets().await {
                Ok(datasets) => {
                    self.commit(|state| state.datasets = datasets).await;
                }
                Err(e) => warn!("Catalog refresh after delete failed: {}", e),
            }

            self.announce(Notification::info("Dataset deleted", id.to_string()));
            Ok(())
        })
        .await
    }

    pub async fn fetch_data_insights(
        &self,
        intent: Option<&str>,
        providers: Option<Vec<String>>,
    ) -> AppResult<InsightResult> {
        const TITLE: &str = "Failed to generate insights";
        let Some(dataset_id) = self.active_dataset_id().await else {
            return self
                .reject(TITLE, AppError::validation("select a dataset to generate insights"))
                .await;
        };
        let request = InsightRequest {
            dataset_id: Some(dataset_id.clone()),
            dataset_ids: None,
            intent: intent.map(str::to_string),
            providers,
        };

        self.run(TITLE, async {
            let result = self.gateway.data_insights(&request).await?;
            let committed = result.clone();
            self.commit(|state| {
                if state.is_active_dataset(&dataset_id) {
                    state.data_insights = Some(committed);
                }
            })
            .await;
            Ok(result)
        })
        .await
    }

    pub async fn fetch_multi_dataset_insights(
        &self,
        intent: Option<&str>,
        providers: Option<Vec<String>>,
    ) -> AppResult<InsightResult> {
        const TITLE: &str = "Failed to compare datasets";
        let (dataset_ids, token) = {
            let mut inner = self.inner.write().await;
            let ids = inner.state.compare.selected_ids();
            (ids, inner.issue(MULTI_INSIGHTS))
        };
        if dataset_ids.len() < 2 {
            return self
                .reject(TITLE, AppError::validation("select at least two datasets to compare"))
                .await;
        }
        let request = InsightRequest {
            dataset_id: None,
            dataset_ids: Some(dataset_ids),
            intent: intent.map(str::to_string),
            providers,
        };

        self.run(TITLE, async {
            let result = self.gateway.data_insights(&request).await?;
            let committed = result.clone();
            self.commit_current(MULTI_INSIGHTS, token, |state| {
                state.multi_insights = Some(committed)
            })
            .await;
            Ok(result)
        })
        .await
    }

    /// Load an existing tool as the active one
    pub async fn select_tool(&self, id: &str) -> AppResult<AnalysisJob> {
        self.run("Failed to load analysis", async {
            let job = self.gateway.get_job(id).await?;
            let committed = job.clone();
            self.commit(|state| {
                state.active_tool = Some(committed);
                state.stage = Stage::Insights;
            })
            .await;
            Ok(job)
        })
        .await
    }

    /// Re-fetch the active tool, e.g. after the poller saw its status change
    pub async fn refresh_active_tool(&self) -> AppResult<AnalysisJob> {
        const TITLE: &str = "Failed to refresh analysis";
        let Some(tool) = self.active_tool().await else {
            return self
                .reject(TITLE, AppError::validation("no active analysis"))
                .await;
        };

        self.run(TITLE, async {
            let job = self.gateway.get_job(&tool.id).await?;
            let committed = job.clone();
            self.commit(|state| {
                if state.active_tool.as_ref().is_some_and(|t| t.id == committed.id) {
                    state.active_tool = Some(committed);
                }
            })
            .await;
            Ok(job)
        })
        .await
    }

    /// Move to `stage` if it is currently reachable; otherwise a no-op returning false
    pub async fn set_stage(&self, stage: Stage) -> bool {
        let mut inner = self.inner.write().await;
        if self.is_closed() {
            return false;
        }
        if !gate::reachable(&inner.state).allows(stage) {
            debug!("Stage {} is not reachable from {}", stage, inner.state.stage);
            return false;
        }
        inner.state.stage = stage;
        true
    }

    /// Back to mount-time defaults; the dataset catalog is kept
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        if self.is_closed() {
            return;
        }
        let datasets = std::mem::take(&mut inner.state.datasets);
        inner.state = WorkspaceState {
            datasets,
            ..Default::default()
        };
        inner.invalidate_prefix("");
    }
}

fn job_name(intent: &str) -> String {
    if intent.chars().count() <= MAX_JOB_NAME_LEN {
        return intent.to_string();
    }
    let truncated: String = intent.chars().take(MAX_JOB_NAME_LEN).collect();
    format!("{}…", truncated.trim_end())
}

fn validate_train_config(config: &QuickTrainConfig, tool: &AnalysisJob) -> AppResult<()> {
    config.validate()?;
    if config.feature_columns.contains(&config.target_column) {
        return Err(AppError::validation(
            "target column cannot also be a feature column",
        ));
    }
    if let Some(analysis) = &tool.analysis {
        if !analysis.approaches.is_empty() && config.approach_index >= analysis.approaches.len() {
            return Err(AppError::validation(format!(
                "approach {} does not exist; {} available",
                config.approach_index,
                analysis.approaches.len()
            )));
        }
    }
    Ok(())
}
