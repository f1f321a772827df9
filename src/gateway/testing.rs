//! In-memory gateway for tests
//!
//! Keys used for scripted failures and holds are either an operation name
//! (`"get_metadata"`) or an operation scoped to an id (`"get_metadata:d1"`).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::gateway::RemoteGateway;
use crate::models::{
    AnalysisJob, AnalysisResult, ColumnSchema, CreateJobRequest, Dataset, DatasetKind,
    DatasetMetadata, DatasetPreview, FredMergeConfig, InsightRequest, InsightResult, JobFilter,
    JobStatus, QuickTrainConfig, Row, UploadFile,
};
use crate::types::{AppError, AppResult};

#[derive(Default)]
pub struct FakeState {
    pub datasets: Vec<Dataset>,
    pub previews: HashMap<String, DatasetPreview>,
    pub metadata: HashMap<String, DatasetMetadata>,
    pub jobs: Vec<AnalysisJob>,
    /// Scripted `list_jobs` responses; the last one repeats
    pub job_snapshots: VecDeque<Vec<AnalysisJob>>,
    pub insights: InsightResult,
    pub create_status: Option<JobStatus>,
    pub create_analysis: Option<AnalysisResult>,
    pub insight_requests: Vec<InsightRequest>,
    failing: HashSet<String>,
    holds: HashMap<String, Arc<Notify>>,
    calls: Vec<String>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

pub fn dataset(id: &str, columns: &[(&str, &str)]) -> Dataset {
    Dataset {
        id: id.to_string(),
        name: format!("{id} dataset"),
        description: None,
        row_count: 100,
        column_count: columns.len() as u64,
        columns: columns
            .iter()
            .map(|(name, data_type)| ColumnSchema {
                name: name.to_string(),
                data_type: data_type.to_string(),
            })
            .collect(),
        file_size: 2_048,
        kind: DatasetKind::Csv,
        cached_insights: None,
        created_at: None,
    }
}

pub fn preview(columns: &[&str], rows: usize) -> DatasetPreview {
    DatasetPreview {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: (0..rows)
            .map(|i| {
                let mut row = Row::new();
                for column in columns {
                    row.insert(column.to_string(), serde_json::json!(i));
                }
                row
            })
            .collect(),
    }
}

pub fn job(id: &str, status: JobStatus) -> AnalysisJob {
    AnalysisJob {
        id: id.to_string(),
        name: format!("job {id}"),
        dataset_id: None,
        status,
        intent: None,
        analysis: None,
        training_config: None,
        trained_version: None,
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a dataset together with its preview and metadata
    pub fn with_dataset(self, dataset: Dataset, rows: usize) -> Self {
        {
            let mut state = self.state();
            let columns: Vec<&str> = dataset.columns.iter().map(|c| c.name.as_str()).collect();
            state.previews.insert(dataset.id.clone(), preview(&columns, rows));
            state.metadata.insert(
                dataset.id.clone(),
                DatasetMetadata {
                    quality_score: Some(0.9),
                    ..Default::default()
                },
            );
            state.datasets.push(dataset);
        }
        self
    }

    pub fn fail(&self, key: &str) {
        self.state().failing.insert(key.to_string());
    }

    pub fn recover(&self, key: &str) {
        self.state().failing.remove(key);
    }

    /// Block the next call matching `key` until the returned handle is notified
    pub fn hold(&self, key: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state().holds.insert(key.to_string(), notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&format!("{op}:")))
            .count()
    }

    pub fn set_job_status(&self, id: &str, status: JobStatus) {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = status;
        }
    }

    async fn enter(&self, op: &str, id: Option<&str>) -> AppResult<()> {
        let key = match id {
            Some(id) => format!("{op}:{id}"),
            None => op.to_string(),
        };
        let hold = {
            let mut state = self.state();
            state.calls.push(key.clone());
            state.holds.remove(&key).or_else(|| state.holds.remove(op))
        };
        if let Some(notify) = hold {
            notify.notified().await;
        }
        let state = self.state();
        if state.failing.contains(&key) || state.failing.contains(op) {
            return Err(AppError::Remote {
                status: Some(503),
                message: format!("{key} unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn list_datasets(&self) -> AppResult<Vec<Dataset>> {
        self.enter("list_datasets", None).await?;
        Ok(self.state().datasets.clone())
    }

    async fn get_dataset(&self, id: &str) -> AppResult<Dataset> {
        self.enter("get_dataset", Some(id)).await?;
        self.state()
            .datasets
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    async fn create_dataset(
        &self,
        file: UploadFile,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Dataset> {
        self.enter("create_dataset", None).await?;
        let mut state = self.state();
        state.next_id += 1;
        let mut created = dataset(&format!("ds-{}", state.next_id), &[("value", "numeric")]);
        created.name = name.to_string();
        created.description = description.map(str::to_string);
        created.kind = file.kind();
        created.file_size = file.data.len() as u64;
        state
            .previews
            .insert(created.id.clone(), preview(&["value"], 3));
        state.datasets.push(created.clone());
        Ok(created)
    }

    async fn delete_dataset(&self, id: &str) -> AppResult<()> {
        self.enter("delete_dataset", Some(id)).await?;
        let mut state = self.state();
        let before = state.datasets.len();
        state.datasets.retain(|d| d.id != id);
        if state.datasets.len() == before {
            return Err(AppError::NotFound(id.to_string()));
        }
        state.previews.remove(id);
        state.metadata.remove(id);
        Ok(())
    }

    async fn list_jobs(&self, filter: Option<&JobFilter>) -> AppResult<Vec<AnalysisJob>> {
        self.enter("list_jobs", None).await?;
        let mut state = self.state();
        let jobs = if state.job_snapshots.len() > 1 {
            state.job_snapshots.pop_front().unwrap_or_default()
        } else if let Some(last) = state.job_snapshots.front() {
            last.clone()
        } else {
            state.jobs.clone()
        };
        Ok(jobs
            .into_iter()
            .filter(|j| filter.and_then(|f| f.status).map_or(true, |s| j.status == s))
            .collect())
    }

    async fn get_job(&self, id: &str) -> AppResult<AnalysisJob> {
        self.enter("get_job", Some(id)).await?;
        self.state()
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    async fn create_job(&self, request: &CreateJobRequest) -> AppResult<AnalysisJob> {
        self.enter("create_job", Some(&request.dataset_id)).await?;
        let mut state = self.state();
        state.next_id += 1;
        let mut created = job(
            &format!("tool-{}", state.next_id),
            state.create_status.unwrap_or(JobStatus::Analyzing),
        );
        created.name = request.name.clone();
        created.dataset_id = Some(request.dataset_id.clone());
        created.intent = Some(request.intent.clone());
        created.analysis = state.create_analysis.clone();
        state.jobs.push(created.clone());
        Ok(created)
    }

    async fn configure_job(&self, id: &str, config: &QuickTrainConfig) -> AppResult<AnalysisJob> {
        self.enter("configure_job", Some(id)).await?;
        let mut state = self.state();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        job.training_config = Some(config.clone());
        job.status = JobStatus::Configured;
        Ok(job.clone())
    }

    async fn train_job(&self, id: &str) -> AppResult<AnalysisJob> {
        self.enter("train_job", Some(id)).await?;
        let mut state = self.state();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        job.status = JobStatus::Training;
        Ok(job.clone())
    }

    async fn get_preview(&self, dataset_id: &str, max_rows: usize) -> AppResult<DatasetPreview> {
        self.enter("get_preview", Some(dataset_id)).await?;
        let mut preview = self
            .state()
            .previews
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(dataset_id.to_string()))?;
        preview.rows.truncate(max_rows);
        Ok(preview)
    }

    async fn get_metadata(&self, dataset_id: &str) -> AppResult<DatasetMetadata> {
        self.enter("get_metadata", Some(dataset_id)).await?;
        self.state()
            .metadata
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(dataset_id.to_string()))
    }

    async fn merge_fred(&self, dataset_id: &str, config: &FredMergeConfig) -> AppResult<()> {
        self.enter("merge_fred", Some(dataset_id)).await?;
        let mut state = self.state();
        let preview = state
            .previews
            .get_mut(dataset_id)
            .ok_or_else(|| AppError::NotFound(dataset_id.to_string()))?;
        preview.columns.extend(config.series_ids.iter().cloned());
        if let Some(dataset) = state.datasets.iter_mut().find(|d| d.id == dataset_id) {
            dataset.column_count += config.series_ids.len() as u64;
        }
        Ok(())
    }

    async fn data_insights(&self, request: &InsightRequest) -> AppResult<InsightResult> {
        self.enter("data_insights", None).await?;
        let mut state = self.state();
        state.insight_requests.push(request.clone());
        Ok(state.insights.clone())
    }
}
