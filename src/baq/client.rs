use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::baq::error::{QueryError, RequestFailure};
use crate::baq::events::{QueryEvent, QueryObserver, TracingObserver};
use crate::baq::filters::{QueryRequest, Select};
use crate::baq::plan::{BatchPlan, Plan, plan_batches};
use crate::baq::report::{DEFAULT_REPORT_PATH, write_report};
use crate::baq::tracker::{FoundValues, MissingValues, Row, dedupe_rows};

const API_KEY_HEADER: &str = "X-api-key";
const JSON_MIME: &str = "application/json";

/// Connection settings, injected once per client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// BAQ service root; requests go to `{base_url}/{query}/Data`.
    pub base_url: String,
    pub api_key: String,
    /// Pre-encoded value for the `Authorization: Basic` header.
    pub credentials: String,
    pub timeout_secs: Option<u64>,
    pub accept_invalid_certs: bool,
    pub missing_report_path: PathBuf,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        credentials: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            credentials: credentials.into(),
            timeout_secs: None,
            accept_invalid_certs: false,
            missing_report_path: PathBuf::from(DEFAULT_REPORT_PATH),
        }
    }
}

/// Result of a query before the side artifact is written.
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub rows: Vec<Row>,
    pub missing: MissingValues,
    pub plans: usize,
    pub failed_plans: usize,
}

/// One request a query would issue.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedRequest {
    pub index: usize,
    #[serde(rename = "$filter", skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(rename = "$select", skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
}

/// Everything a query would send, without sending it.
#[derive(Debug, Clone, Serialize)]
pub struct DryRun {
    pub url: String,
    pub requests: Vec<PlannedRequest>,
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    value: Option<Vec<Row>>,
}

/// Chunked BAQ client.
///
/// Plans are issued one after another; a failing plan contributes no rows and
/// never aborts the call.
pub struct BaqClient {
    config: ClientConfig,
    base_url: Url,
    http: reqwest::Client,
    observer: Arc<dyn QueryObserver>,
}

impl BaqClient {
    pub fn new(config: ClientConfig) -> Result<Self, QueryError> {
        let base_url = parse_base_url(&config.base_url)?;

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout_secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let http = builder.build().map_err(QueryError::Client)?;

        Ok(Self {
            config,
            base_url,
            http,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replaces the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `{base_url}/{query_name}/Data`, with the query name percent-encoded.
    pub fn query_url(&self, query_name: &str) -> Url {
        let mut url = self.base_url.clone();
        // `parse_base_url` rejected cannot-be-a-base URLs.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(query_name).push("Data");
        }
        url
    }

    pub fn dry_run(&self, request: &QueryRequest) -> Result<DryRun, QueryError> {
        request.validate()?;
        let batch = plan_batches(&request.filters);
        let select = request.select.as_ref().map(Select::to_param);
        let requests = batch
            .plans
            .iter()
            .map(|plan| PlannedRequest {
                index: plan.index,
                filter: batch.filter_expression(plan),
                select: select.clone(),
            })
            .collect();

        Ok(DryRun {
            url: self.query_url(&request.query_name).to_string(),
            requests,
        })
    }

    /// Runs every plan and returns rows plus coverage, without writing a report.
    pub async fn run_query(
        &self,
        request: &QueryRequest,
        retry_method: Option<&str>,
    ) -> Result<QueryReport, QueryError> {
        request.validate()?;
        let retry_method = retry_method
            .map(str::trim)
            .filter(|method| !method.is_empty());

        let url = self.query_url(&request.query_name);
        let select = request.select.as_ref().map(Select::to_param);
        let batch = plan_batches(&request.filters);
        let total = batch.plans.len();

        let mut found = FoundValues::new();
        let mut collected = Vec::new();
        let mut failed_plans = 0;

        for plan in &batch.plans {
            self.emit(QueryEvent::PlanStarted {
                plan: plan.index,
                total,
            });
            let Some(rows) = self
                .run_plan(&url, select.as_deref(), &batch, plan, retry_method)
                .await
            else {
                failed_plans += 1;
                continue;
            };

            if rows.is_empty() {
                self.emit(QueryEvent::NoRows { plan: plan.index });
                continue;
            }
            for (key, _) in &plan.chunks {
                if !found.record(key, &rows) {
                    self.emit(QueryEvent::FilterKeyAbsent {
                        plan: plan.index,
                        key: key.to_string(),
                    });
                }
            }
            collected.extend(rows);
        }

        let missing = MissingValues::compute(batch.lists.iter().copied(), &found);
        for (key, values) in missing.iter() {
            self.emit(QueryEvent::MissingValues {
                key: key.to_string(),
                count: values.len(),
            });
        }

        Ok(QueryReport {
            rows: dedupe_rows(collected),
            missing,
            plans: total,
            failed_plans,
        })
    }

    /// Runs the query, writes the missing-value report when anything was not
    /// returned, and hands back the deduplicated rows.
    pub async fn execute_query(
        &self,
        request: &QueryRequest,
        retry_method: Option<&str>,
    ) -> Result<Vec<Row>, QueryError> {
        let report = self.run_query(request, retry_method).await?;
        if !report.missing.is_empty() {
            self.save_missing(&report.missing);
        }
        Ok(report.rows)
    }

    /// Writes the report to the configured path and returns whether it was
    /// written. Either outcome is also emitted as an event.
    pub fn save_missing(&self, missing: &MissingValues) -> bool {
        let path = self.config.missing_report_path.clone();
        match write_report(&path, missing) {
            Ok(()) => {
                self.emit(QueryEvent::ReportWritten {
                    path,
                    rows: missing.len(),
                    unique_values: missing.unique_values(),
                });
                true
            }
            Err(err) => {
                self.emit(QueryEvent::ReportFailed {
                    path,
                    error: err.to_string(),
                });
                false
            }
        }
    }

    // `None` means the plan failed, including its retry.
    async fn run_plan(
        &self,
        url: &Url,
        select: Option<&str>,
        batch: &BatchPlan<'_>,
        plan: &Plan<'_>,
        retry_method: Option<&str>,
    ) -> Option<Vec<Row>> {
        let params = request_params(batch.filter_expression(plan), select);
        let failure = match self.fetch(url, &params).await {
            Ok(rows) => return Some(rows),
            Err(failure) => failure,
        };

        let (status, body) = match failure {
            RequestFailure::Status { status, body } => (status, body),
            other => {
                self.emit(QueryEvent::RequestFailed {
                    plan: plan.index,
                    error: other.to_string(),
                });
                return None;
            }
        };
        self.emit(QueryEvent::StatusError {
            plan: plan.index,
            status: status.as_u16(),
            body,
        });

        let method = retry_method?;
        self.emit(QueryEvent::Retrying {
            plan: plan.index,
            method: method.to_string(),
        });
        let params = request_params(batch.retry_expression(method), select);
        match self.fetch(url, &params).await {
            Ok(rows) => Some(rows),
            Err(failure) => {
                self.emit(QueryEvent::RetryFailed {
                    plan: plan.index,
                    error: failure.to_string(),
                });
                None
            }
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        params: &[(&'static str, String)],
    ) -> Result<Vec<Row>, RequestFailure> {
        let mut request = self.http.get(url.clone());
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request
            .header(CONTENT_TYPE, JSON_MIME)
            .header(ACCEPT, JSON_MIME)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(AUTHORIZATION, format!("Basic {}", self.config.credentials))
            .send()
            .await
            .map_err(RequestFailure::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Status { status, body });
        }

        let bytes = response.bytes().await.map_err(RequestFailure::Transport)?;
        let body: DataResponse =
            serde_json::from_slice(&bytes).map_err(RequestFailure::MalformedBody)?;
        Ok(body.value.unwrap_or_default())
    }

    fn emit(&self, event: QueryEvent) {
        self.observer.on_event(&event);
    }
}

fn request_params(filter: Option<String>, select: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(2);
    if let Some(filter) = filter {
        params.push(("$filter", filter));
    }
    if let Some(select) = select {
        params.push(("$select", select.to_string()));
    }
    params
}

fn parse_base_url(raw: &str) -> Result<Url, QueryError> {
    let invalid = |reason: String| QueryError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be used as a base".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::{BaqClient, ClientConfig, request_params};
    use crate::baq::error::QueryError;
    use crate::baq::filters::{FilterValue, QueryRequest};

    fn client(base_url: &str) -> BaqClient {
        BaqClient::new(ClientConfig::new(base_url, "key", "creds")).expect("client should build")
    }

    #[test]
    fn query_url_escapes_name_and_tolerates_trailing_slash() {
        let trailing = client("https://erp.example.com/api/v2/BaqSvc/");
        assert_eq!(
            trailing.query_url("Order Tracker").as_str(),
            "https://erp.example.com/api/v2/BaqSvc/Order%20Tracker/Data"
        );

        let bare = client("https://erp.example.com/api/v2/BaqSvc");
        assert_eq!(
            bare.query_url("OrdersQ").as_str(),
            "https://erp.example.com/api/v2/BaqSvc/OrdersQ/Data"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = BaqClient::new(ClientConfig::new("not a url", "key", "creds"))
            .err()
            .expect("client should not build");
        assert!(matches!(err, QueryError::InvalidBaseUrl { .. }));

        let err = BaqClient::new(ClientConfig::new("mailto:ops@example.com", "key", "creds"))
            .err()
            .expect("client should not build");
        assert!(matches!(err, QueryError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn params_are_omitted_when_absent() {
        assert!(request_params(None, None).is_empty());

        let params = request_params(Some("A eq 1".to_string()), Some("A,B"));
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], ("$filter", "A eq 1".to_string()));
        assert_eq!(params[1], ("$select", "A,B".to_string()));
    }

    #[test]
    fn dry_run_lists_every_plan() {
        let request = QueryRequest::new("OrdersQ")
            .select(vec!["OrderNum", "PONum"])
            .filter("OrderNum", FilterValue::list(1..=75i64));
        let dry_run = client("http://localhost:9/BaqSvc")
            .dry_run(&request)
            .expect("dry run should succeed");

        assert_eq!(dry_run.url, "http://localhost:9/BaqSvc/OrdersQ/Data");
        assert_eq!(dry_run.requests.len(), 2);
        let first = dry_run.requests[0].filter.as_deref().unwrap_or_default();
        assert!(first.ends_with("OrderNum eq 50)"));
        let second = dry_run.requests[1].filter.as_deref().unwrap_or_default();
        assert!(second.starts_with("(OrderNum eq 51 or"));
        let select = dry_run.requests[1].select.as_deref();
        assert_eq!(select, Some("OrderNum,PONum"));
    }

    #[test]
    fn dry_run_rejects_invalid_input() {
        let request = QueryRequest::new("").select("OrderNum");
        assert!(matches!(
            client("http://localhost:9").dry_run(&request),
            Err(QueryError::EmptyQueryName)
        ));
    }
}
