// Data shapes exchanged with the analysis service
// Note: these mirror the service's JSON payloads; unknown fields are ignored

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A single preview row keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Discriminator used to filter the dataset catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    #[default]
    Csv,
    Excel,
    Json,
    Pdf,
    #[serde(other)]
    Other,
}

impl DatasetKind {
    /// Infer the kind from a file name's extension
    pub fn from_filename(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => DatasetKind::Csv,
            "xls" | "xlsx" => DatasetKind::Excel,
            "json" | "jsonl" => DatasetKind::Json,
            "pdf" => DatasetKind::Pdf,
            _ => DatasetKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Csv => "csv",
            DatasetKind::Excel => "excel",
            DatasetKind::Json => "json",
            DatasetKind::Pdf => "pdf",
            DatasetKind::Other => "other",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(DatasetKind::Csv),
            "excel" | "xlsx" => Ok(DatasetKind::Excel),
            "json" => Ok(DatasetKind::Json),
            "pdf" => Ok(DatasetKind::Pdf),
            "other" => Ok(DatasetKind::Other),
            other => Err(format!("unknown dataset kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Inferred type, e.g. "numeric", "categorical", "datetime"
    #[serde(rename = "type", default)]
    pub data_type: String,
}

/// AI analysis previously computed for a dataset and stored alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CachedInsights {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub suggested_intents: Vec<String>,
    #[serde(default)]
    pub generated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub column_count: u64,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(rename = "type", default)]
    pub kind: DatasetKind,
    #[serde(default)]
    pub cached_insights: Option<CachedInsights>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DatasetPreview {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Quality and profiling data for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DatasetMetadata {
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub missing_values: HashMap<String, u64>,
    #[serde(default)]
    pub date_columns: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A file to upload as a new dataset
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub data: bytes::Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: impl Into<bytes::Bytes>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> DatasetKind {
        DatasetKind::from_filename(&self.filename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initial,
    Analyzing,
    Configuring,
    Configured,
    CodeReady,
    Training,
    Trained,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Statuses the service is actively working on
    pub fn is_in_progress(&self) -> bool {
        matches!(self, JobStatus::Analyzing | JobStatus::Training)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initial => "initial",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Configuring => "configuring",
            JobStatus::Configured => "configured",
            JobStatus::CodeReady => "code_ready",
            JobStatus::Training => "training",
            JobStatus::Trained => "trained",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Feasibility {
    pub feasible: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateApproach {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequiredConfig {
    #[serde(default)]
    pub target_column: Option<String>,
    #[serde(default)]
    pub feature_columns: Vec<String>,
    #[serde(default)]
    pub temporal_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    #[serde(default)]
    pub feasibility: Feasibility,
    #[serde(default)]
    pub approaches: Vec<CandidateApproach>,
    #[serde(default)]
    pub required_config: RequiredConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainedVersion {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub artifacts: Vec<TrainedArtifact>,
}

/// Server-tracked analysis and training task bound to one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dataset_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub training_config: Option<QuickTrainConfig>,
    #[serde(default)]
    pub trained_version: Option<TrainedVersion>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateJobRequest {
    pub dataset_id: String,
    pub name: String,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QuickTrainConfig {
    pub approach_index: usize,
    #[validate(length(min = 1, message = "target column is required"))]
    pub target_column: String,
    #[validate(length(min = 1, message = "at least one feature column is required"))]
    pub feature_columns: Vec<String>,
    #[validate(range(min = 0.05, max = 0.95, message = "split ratio must be between 0.05 and 0.95"))]
    pub split_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_column: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    #[default]
    Forward,
    Backward,
}

impl std::str::FromStr for FillStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" | "ffill" => Ok(FillStrategy::Forward),
            "backward" | "bfill" => Ok(FillStrategy::Backward),
            other => Err(format!("unknown fill strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FredMergeConfig {
    #[validate(length(min = 1, message = "at least one FRED series is required"))]
    pub series_ids: Vec<String>,
    #[validate(length(min = 1, message = "date column is required"))]
    pub date_column: String,
    pub fill_strategy: FillStrategy,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    #[serde(default)]
    pub detail: String,
}

/// AI-generated insight payload, committed verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InsightResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    /// True when adapted from a dataset's stored analysis instead of fetched fresh
    #[serde(default)]
    pub cached: bool,
}

impl From<&CachedInsights> for InsightResult {
    fn from(cached: &CachedInsights) -> Self {
        InsightResult {
            summary: cached.summary.clone(),
            insights: cached
                .findings
                .iter()
                .map(|finding| Insight {
                    title: finding.clone(),
                    detail: String::new(),
                })
                .collect(),
            recommendations: cached.suggested_intents.clone(),
            providers: Vec::new(),
            cached: true,
        }
    }
}
