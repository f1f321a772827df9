// Remote service boundary

pub mod http;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;

use crate::models::{
    AnalysisJob, CreateJobRequest, Dataset, DatasetMetadata, DatasetPreview, FredMergeConfig,
    InsightRequest, InsightResult, JobFilter, QuickTrainConfig, UploadFile,
};
use crate::types::AppResult;

pub use http::HttpGateway;

/// Calls into the analysis service. Every method may fail or be slow.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_datasets(&self) -> AppResult<Vec<Dataset>>;
    async fn get_dataset(&self, id: &str) -> AppResult<Dataset>;
    async fn create_dataset(
        &self,
        file: UploadFile,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Dataset>;
    async fn delete_dataset(&self, id: &str) -> AppResult<()>;

    async fn list_jobs(&self, filter: Option<&JobFilter>) -> AppResult<Vec<AnalysisJob>>;
    async fn get_job(&self, id: &str) -> AppResult<AnalysisJob>;
    async fn create_job(&self, request: &CreateJobRequest) -> AppResult<AnalysisJob>;
    async fn configure_job(&self, id: &str, config: &QuickTrainConfig) -> AppResult<AnalysisJob>;
    async fn train_job(&self, id: &str) -> AppResult<AnalysisJob>;

    async fn get_preview(&self, dataset_id: &str, max_rows: usize) -> AppResult<DatasetPreview>;
    async fn get_metadata(&self, dataset_id: &str) -> AppResult<DatasetMetadata>;
    async fn merge_fred(&self, dataset_id: &str, config: &FredMergeConfig) -> AppResult<()>;
    async fn data_insights(&self, request: &InsightRequest) -> AppResult<InsightResult>;
}
