//! Target application drivers
//!
//! The engine only sees [`TargetApplication`]. [`HttpTarget`] talks to the
//! bank's REST service; the Playwright driver lives in
//! [`crate::playwright`].

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use odc_common::{DriverKind, HarnessConfig, TargetConfig, WorkflowInput};

use crate::error::{E2eError, E2eResult, TargetError};
use crate::playwright::PlaywrightTarget;

/// Whether the application took the submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Accepted,
    Rejected,
}

/// What the application answered to one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResponse {
    pub status: ResponseStatus,

    /// Field values the application reflected back, keyed by form field name
    #[serde(default)]
    pub echo: BTreeMap<String, String>,

    /// Message shown or returned by the application
    #[serde(default)]
    pub detail: Option<String>,

    /// Page capture taken when the submission did not go through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl TargetResponse {
    pub fn accepted() -> Self {
        Self {
            status: ResponseStatus::Accepted,
            echo: BTreeMap::new(),
            detail: None,
            screenshot: None,
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Rejected,
            echo: BTreeMap::new(),
            detail: Some(detail.into()),
            screenshot: None,
        }
    }

    pub fn with_echo(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.echo.insert(field.into(), value.into());
        self
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ResponseStatus::Accepted
    }
}

/// The application under test, reached only through workflow actions
#[async_trait]
pub trait TargetApplication: Send + Sync {
    /// Driver name for logs
    fn name(&self) -> &str;

    /// Perform one workflow submission
    async fn submit(&self, input: &WorkflowInput) -> Result<TargetResponse, TargetError>;

    /// Values the application stored for an accepted submission, keyed by
    /// form field name. Drivers whose submit response already carries them
    /// keep the empty default.
    async fn read_back(&self, _input: &WorkflowInput) -> Result<BTreeMap<String, String>, TargetError> {
        Ok(BTreeMap::new())
    }
}

/// Build the driver selected in the config
pub fn build_target(config: &HarnessConfig) -> E2eResult<Arc<dyn TargetApplication>> {
    match config.target.driver {
        DriverKind::Http => Ok(Arc::new(HttpTarget::new(&config.target)?)),
        DriverKind::Playwright => {
            let mut target = PlaywrightTarget::new(&config.target)?;
            if config.target.screenshot_on_failure {
                target = target.with_screenshot_dir(config.report.output_dir.join("screenshots"));
            }
            Ok(Arc::new(target))
        }
    }
}

/// A REST call for one workflow submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRoute {
    pub method: Method,
    /// Path segments appended to the base URL, unencoded
    pub segments: Vec<String>,
    pub query: Vec<(&'static str, String)>,
}

/// REST driver for the bank's service API
pub struct HttpTarget {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTarget {
    pub fn new(config: &TargetConfig) -> E2eResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            E2eError::Config(odc_common::ConfigError::InvalidValue {
                field: "target.base_url".to_string(),
                reason: e.to_string(),
            })
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Map a workflow to its REST endpoint
    pub fn route(input: &WorkflowInput) -> HttpRoute {
        match input {
            WorkflowInput::Login(login) => HttpRoute {
                method: Method::GET,
                segments: vec![
                    "login".to_string(),
                    login.username.clone(),
                    login.password.clone(),
                ],
                query: vec![],
            },
            WorkflowInput::LoanApplication(loan) => HttpRoute {
                method: Method::POST,
                segments: vec!["requestLoan".to_string()],
                query: vec![
                    ("customerId", loan.customer_id.clone()),
                    ("amount", loan.amount.clone()),
                    ("downPayment", loan.down_payment.clone()),
                    ("fromAccountId", loan.from_account.clone()),
                ],
            },
            WorkflowInput::AccountTransfer(transfer) => HttpRoute {
                method: Method::POST,
                segments: vec!["transfer".to_string()],
                query: vec![
                    ("fromAccountId", transfer.from_account.clone()),
                    ("toAccountId", transfer.to_account.clone()),
                    ("amount", transfer.amount.clone()),
                ],
            },
            WorkflowInput::ProfileUpdate(profile) => HttpRoute {
                method: Method::POST,
                segments: vec![
                    "customers".to_string(),
                    "update".to_string(),
                    profile.customer_id.clone(),
                ],
                query: vec![
                    ("firstName", profile.first_name.clone()),
                    ("lastName", profile.last_name.clone()),
                    ("street", profile.address.clone()),
                    ("city", profile.city.clone()),
                    ("state", profile.state.clone()),
                    ("zipCode", profile.zip_code.clone()),
                    ("phoneNumber", profile.phone.clone()),
                ],
            },
        }
    }

    /// GET endpoints that show what a submission stored
    pub fn read_back_routes(input: &WorkflowInput) -> Vec<HttpRoute> {
        let get = |segments: Vec<String>| HttpRoute {
            method: Method::GET,
            segments,
            query: vec![],
        };
        match input {
            WorkflowInput::ProfileUpdate(profile) => {
                vec![get(vec!["customers".to_string(), profile.customer_id.clone()])]
            }
            WorkflowInput::AccountTransfer(transfer) => vec![
                get(vec![
                    "accounts".to_string(),
                    transfer.from_account.clone(),
                    "transactions".to_string(),
                ]),
                get(vec![
                    "accounts".to_string(),
                    transfer.to_account.clone(),
                    "transactions".to_string(),
                ]),
            ],
            WorkflowInput::Login(_) | WorkflowInput::LoanApplication(_) => vec![],
        }
    }

    async fn send(&self, route: &HttpRoute) -> Result<(StatusCode, String), TargetError> {
        let url = self.url_for(route)?;
        debug!("{} {}", route.method, url);

        let response = self
            .client
            .request(route.method.clone(), url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&route.query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;
        Ok((status, body))
    }

    fn url_for(&self, route: &HttpRoute) -> Result<Url, TargetError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TargetError::Protocol(format!("base URL cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(route.segments.iter().map(String::as_str));
        Ok(url)
    }
}

#[async_trait]
impl TargetApplication for HttpTarget {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, input: &WorkflowInput) -> Result<TargetResponse, TargetError> {
        let (status, body) = self.send(&Self::route(input)).await?;
        classify_response(status, &body)
    }

    async fn read_back(&self, input: &WorkflowInput) -> Result<BTreeMap<String, String>, TargetError> {
        let mut bodies = Vec::new();
        for route in Self::read_back_routes(input) {
            let (status, body) = self.send(&route).await?;
            bodies.push(read_back_body(status, body)?);
        }

        match (input, bodies.as_slice()) {
            (WorkflowInput::ProfileUpdate(_), [customer]) => customer_echo(customer),
            (WorkflowInput::AccountTransfer(transfer), [sent, received]) => {
                transfer_echo(&transfer.amount, sent, received)
            }
            _ => Ok(BTreeMap::new()),
        }
    }
}

fn read_back_body(status: StatusCode, body: String) -> Result<String, TargetError> {
    if is_gateway_error(status) {
        return Err(TargetError::Connection(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(TargetError::Protocol(format!(
            "read-back failed with HTTP {}: {}",
            status.as_u16(),
            truncate(body.trim(), 200)
        )));
    }
    Ok(body)
}

/// Echo map from a `GET /customers/{id}` document
pub fn customer_echo(body: &str) -> Result<BTreeMap<String, String>, TargetError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TargetError::Protocol(format!("unreadable customer document: {}", e)))?;
    let mut echo = BTreeMap::new();
    flatten_echo(&value, &mut echo);
    Ok(echo)
}

/// Echo map for a transfer, from the transaction lists of both accounts.
///
/// Picks the newest "Funds Transfer Sent" debit on the source account and
/// the newest "Funds Transfer Received" credit on the destination account,
/// preferring entries whose amount equals the submitted one so concurrent
/// transfers between the same accounts do not get mixed up.
pub fn transfer_echo(
    amount: &str,
    sent: &str,
    received: &str,
) -> Result<BTreeMap<String, String>, TargetError> {
    let parse = |body: &str| -> Result<Vec<Value>, TargetError> {
        serde_json::from_str(body)
            .map_err(|e| TargetError::Protocol(format!("unreadable transaction list: {}", e)))
    };
    let (sent, received) = (parse(sent)?, parse(received)?);

    let mut echo = BTreeMap::new();
    if let Some(debit) = newest_transfer(&sent, "Funds Transfer Sent", amount) {
        if let Some(account) = debit.get("accountId") {
            echo.insert("from_account".to_string(), scalar(account));
        }
        if let Some(value) = debit.get("amount") {
            echo.insert("amount".to_string(), scalar(value));
        }
    }
    if let Some(credit) = newest_transfer(&received, "Funds Transfer Received", amount) {
        if let Some(account) = credit.get("accountId") {
            echo.insert("to_account".to_string(), scalar(account));
        }
    }
    Ok(echo)
}

fn newest_transfer<'a>(transactions: &'a [Value], description: &str, amount: &str) -> Option<&'a Value> {
    let wanted = amount.trim().parse::<f64>().ok();
    let newest = |candidates: Vec<&'a Value>| {
        candidates
            .into_iter()
            .max_by_key(|t| t.get("id").and_then(Value::as_u64).unwrap_or(0))
    };

    let transfers: Vec<&Value> = transactions
        .iter()
        .filter(|t| t.get("description").and_then(Value::as_str) == Some(description))
        .collect();
    let matching: Vec<&Value> = transfers
        .iter()
        .copied()
        .filter(|t| match (wanted, t.get("amount").and_then(Value::as_f64)) {
            (Some(a), Some(b)) => (a - b).abs() < 0.005,
            _ => false,
        })
        .collect();

    newest(matching).or_else(|| newest(transfers))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_gateway_error(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn classify_transport_error(e: reqwest::Error) -> TargetError {
    if e.is_connect() || e.is_timeout() {
        TargetError::Connection(e.to_string())
    } else {
        TargetError::Protocol(e.to_string())
    }
}

/// Interpret an HTTP answer.
///
/// 2xx accepts unless the body says `"approved": false`; 4xx rejects;
/// gateway errors are transient; anything else is a protocol error.
pub fn classify_response(status: StatusCode, body: &str) -> Result<TargetResponse, TargetError> {
    if is_gateway_error(status) {
        return Err(TargetError::Connection(format!("HTTP {}", status)));
    }

    if status.is_client_error() {
        return Ok(TargetResponse::rejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate(body.trim(), 200)
        )));
    }

    if !status.is_success() {
        return Err(TargetError::Protocol(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate(body.trim(), 200)
        )));
    }

    let json: Option<Value> = serde_json::from_str(body).ok();
    let mut response = TargetResponse::accepted();

    if let Some(value) = &json {
        if value.get("approved").and_then(Value::as_bool) == Some(false) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request denied");
            return Ok(TargetResponse::rejected(message));
        }
        flatten_echo(value, &mut response.echo);
    } else if !body.trim().is_empty() {
        response.detail = Some(truncate(body.trim(), 200).to_string());
    }

    Ok(response)
}

/// Collect scalar leaves of a JSON document under their form field names
fn flatten_echo(value: &Value, out: &mut BTreeMap<String, String>) {
    if let Value::Object(map) = value {
        for (key, child) in map {
            match child {
                Value::String(s) => {
                    out.insert(form_field_name(key), s.clone());
                }
                Value::Number(n) => {
                    out.insert(form_field_name(key), n.to_string());
                }
                Value::Object(_) => flatten_echo(child, out),
                _ => {}
            }
        }
    }
}

/// Map a service JSON key onto the form field it reflects
fn form_field_name(key: &str) -> String {
    match key {
        "street" => "address".to_string(),
        "phoneNumber" => "phone".to_string(),
        "fromAccountId" => "from_account".to_string(),
        "toAccountId" => "to_account".to_string(),
        "loanAmount" => "amount".to_string(),
        other => {
            let mut snake = String::with_capacity(other.len() + 4);
            for (i, c) in other.chars().enumerate() {
                if c.is_ascii_uppercase() {
                    if i > 0 {
                        snake.push('_');
                    }
                    snake.push(c.to_ascii_lowercase());
                } else {
                    snake.push(c);
                }
            }
            snake
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
