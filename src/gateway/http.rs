// HTTP implementation of the remote gateway
// Routes follow the analysis service's REST API under /api

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::gateway::RemoteGateway;
use crate::models::{
    AnalysisJob, CreateJobRequest, Dataset, DatasetMetadata, DatasetPreview, FredMergeConfig,
    InsightRequest, InsightResult, JobFilter, QuickTrainConfig, UploadFile,
};
use crate::types::{AppError, AppResult};

pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

// Error bodies come in a couple of shapes depending on the framework layer
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> AppResult<Response> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&error_text) {
            Ok(ErrorBody { detail: Some(serde_json::Value::String(s)), .. }) => s,
            Ok(ErrorBody { detail: Some(other), .. }) => other.to_string(),
            Ok(ErrorBody { error: Some(e), .. }) => e,
            _ if error_text.is_empty() => status.canonical_reason().unwrap_or("request failed").to_string(),
            _ => error_text,
        };

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(message));
        }
        Err(AppError::Remote {
            status: Some(status.as_u16()),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AppResult<T> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_datasets(&self) -> AppResult<Vec<Dataset>> {
        self.send_json(self.client.get(self.url("/datasets"))).await
    }

    async fn get_dataset(&self, id: &str) -> AppResult<Dataset> {
        self.send_json(self.client.get(self.url(&format!("/datasets/{}", id))))
            .await
    }

    async fn create_dataset(
        &self,
        file: UploadFile,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Dataset> {
        debug!("Uploading {} ({} bytes)", file.filename, file.data.len());
        let kind = file.kind();
        let part = Part::bytes(file.data.to_vec())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(|e| AppError::validation(format!("Invalid content type: {}", e)))?;

        let mut form = Form::new()
            .part("file", part)
            .text("name", name.to_string())
            .text("type", kind.as_str());
        if let Some(description) = description {
            form = form.text("description", description.to_string());
        }

        self.send_json(self.client.post(self.url("/datasets")).multipart(form))
            .await
    }

    async fn delete_dataset(&self, id: &str) -> AppResult<()> {
        self.send(self.client.delete(self.url(&format!("/datasets/{}", id))))
            .await?;
        Ok(())
    }

    async fn list_jobs(&self, filter: Option<&JobFilter>) -> AppResult<Vec<AnalysisJob>> {
        let mut builder = self.client.get(self.url("/tools"));
        if let Some(filter) = filter {
            builder = builder.query(filter);
        }
        self.send_json(builder).await
    }

    async fn get_job(&self, id: &str) -> AppResult<AnalysisJob> {
        self.send_json(self.client.get(self.url(&format!("/tools/{}", id))))
            .await
    }

    async fn create_job(&self, request: &CreateJobRequest) -> AppResult<AnalysisJob> {
        self.send_json(self.client.post(self.url("/tools")).json(request))
            .await
    }

    async fn configure_job(&self, id: &str, config: &QuickTrainConfig) -> AppResult<AnalysisJob> {
        self.send_json(
            self.client
                .post(self.url(&format!("/tools/{}/configure", id)))
                .json(config),
        )
        .await
    }

    async fn train_job(&self, id: &str) -> AppResult<AnalysisJob> {
        self.send_json(self.client.post(self.url(&format!("/tools/{}/train", id))))
            .await
    }

    async fn get_preview(&self, dataset_id: &str, max_rows: usize) -> AppResult<DatasetPreview> {
        self.send_json(
            self.client
                .get(self.url(&format!("/workspace/datasets/{}/preview", dataset_id)))
                .query(&[("max_rows", max_rows)]),
        )
        .await
    }

    async fn get_metadata(&self, dataset_id: &str) -> AppResult<DatasetMetadata> {
        self.send_json(
            self.client
                .get(self.url(&format!("/workspace/datasets/{}/metadata", dataset_id))),
        )
        .await
    }

    async fn merge_fred(&self, dataset_id: &str, config: &FredMergeConfig) -> AppResult<()> {
        self.send(
            self.client
                .post(self.url(&format!("/workspace/datasets/{}/fred-merge", dataset_id)))
                .json(config),
        )
        .await?;
        Ok(())
    }

    async fn data_insights(&self, request: &InsightRequest) -> AppResult<InsightResult> {
        self.send_json(
            self.client
                .post(self.url("/workspace/data-insights"))
                .json(request),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FillStrategy, JobStatus};
    use mockito::Matcher;

    fn gateway_for(server: &mockito::Server, token: Option<&str>) -> HttpGateway {
        HttpGateway::new(&GatewayConfig {
            base_url: server.url(),
            api_token: token.map(str::to_string),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_datasets_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/datasets")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"d1","name":"sales","row_count":100,"type":"csv"}]"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server, Some("secret"));
        let datasets = gateway.list_datasets().await.unwrap();

        mock.assert_async().await;
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].id, "d1");
        assert_eq!(datasets[0].row_count, 100);
    }

    #[tokio::test]
    async fn test_preview_passes_row_cap() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/workspace/datasets/d1/preview")
            .match_query(Matcher::UrlEncoded("max_rows".into(), "50".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"columns":["a","b"],"rows":[{"a":1,"b":"x"}]}"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server, None);
        let preview = gateway.get_preview("d1", 50).await.unwrap();

        mock.assert_async().await;
        assert_eq!(preview.columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(preview.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_error_detail_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/tools")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"detail":"intent must not be empty"}"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server, None);
        let err = gateway
            .create_job(&CreateJobRequest {
                dataset_id: "d1".to_string(),
                name: "job".to_string(),
                intent: String::new(),
                model: None,
            })
            .await
            .unwrap_err();

        match err {
            AppError::Remote { status, message } => {
                assert_eq!(status, Some(422));
                assert_eq!(message, "intent must not be empty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_dataset_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/datasets/gone")
            .with_status(404)
            .with_body(r#"{"error":"dataset not found"}"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server, None);
        let err = gateway.get_dataset("gone").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "dataset not found"));
    }

    #[tokio::test]
    async fn test_list_jobs_with_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tools")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "training".into()),
                Matcher::UrlEncoded("dataset_id".into(), "d1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"t1","name":"churn","status":"training"}]"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server, None);
        let filter = JobFilter {
            status: Some(JobStatus::Training),
            dataset_id: Some("d1".to_string()),
        };
        let jobs = gateway.list_jobs(Some(&filter)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(jobs[0].status, JobStatus::Training);
    }

    #[tokio::test]
    async fn test_fred_merge_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/workspace/datasets/d1/fred-merge")
            .match_body(Matcher::Json(serde_json::json!({
                "series_ids": ["GDP", "UNRATE"],
                "date_column": "date",
                "fill_strategy": "backward"
            })))
            .with_status(204)
            .create_async()
            .await;

        let gateway = gateway_for(&server, None);
        let config = FredMergeConfig {
            series_ids: vec!["GDP".to_string(), "UNRATE".to_string()],
            date_column: "date".to_string(),
            fill_strategy: FillStrategy::Backward,
        };
        gateway.merge_fred("d1", &config).await.unwrap();
        mock.assert_async().await;
    }
}
