//! HTTP boundary to the aggregation engine that produces report snapshots.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::request::ReportSpec;
use crate::snapshot::{ReportCatalogEntry, ReportSnapshot};

const USER_AGENT: &str = concat!("usage-report/", env!("CARGO_PKG_VERSION"));
const REPORTS_PATH: &str = "api/reports";

/// Remote side of report creation, retrieval and listing.
#[async_trait]
pub trait ReportSource {
    async fn create(&self, spec: &ReportSpec) -> Result<ReportSnapshot, ReportError>;
    async fn fetch(&self, id: &str) -> Result<ReportSnapshot, ReportError>;
    async fn list(&self) -> Result<Vec<ReportCatalogEntry>, ReportError>;
}

/// `{success, data?, message?}` wrapper used by every report endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Producer message, or `fallback` when it sent none.
    fn message_or(&self, fallback: impl Into<String>) -> String {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback.into())
    }
}

pub struct HttpProducer {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpProducer {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ReportError> {
        let mut base = Url::parse(base_url.trim())
            .map_err(|e| ReportError::Transport(format!("invalid base url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn reports_url(&self) -> Result<Url, ReportError> {
        self.base
            .join(REPORTS_PATH)
            .map_err(|e| ReportError::Transport(format!("invalid reports url: {e}")))
    }

    fn report_url(&self, id: &str) -> Result<Url, ReportError> {
        let mut url = self.reports_url()?;
        url.path_segments_mut()
            .map_err(|_| ReportError::Transport("base url cannot carry a path".to_string()))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, Envelope<T>), ReportError> {
        let resp = self.authorize(req).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "producer responded");

        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(envelope) => Ok((status, envelope)),
            Err(err) if status.is_success() => {
                warn!(error = %err, "undecodable producer response");
                Err(ReportError::Transport(format!("invalid response body: {err}")))
            }
            Err(_) if status == StatusCode::NOT_FOUND => {
                Err(ReportError::NotFound(format!("http {}", status.as_u16())))
            }
            Err(_) => Err(ReportError::Transport(format!("http {}", status.as_u16()))),
        }
    }
}

#[async_trait]
impl ReportSource for HttpProducer {
    async fn create(&self, spec: &ReportSpec) -> Result<ReportSnapshot, ReportError> {
        let url = self.reports_url()?;
        debug!(%url, name = %spec.name, "creating report");
        let (_, envelope) = self
            .send::<ReportSnapshot>(self.client.post(url).json(&spec.payload()))
            .await?;

        match envelope {
            Envelope {
                success: true,
                data: Some(snapshot),
                ..
            } => Ok(snapshot),
            other => Err(ReportError::Producer(other.message_or("生成报告失败"))),
        }
    }

    async fn fetch(&self, id: &str) -> Result<ReportSnapshot, ReportError> {
        let url = self.report_url(id)?;
        debug!(%url, "fetching report");
        let (status, envelope) = self.send::<ReportSnapshot>(self.client.get(url)).await?;

        if envelope.success {
            return match envelope.data {
                Some(snapshot) => Ok(snapshot),
                None => Err(ReportError::NotFound(
                    envelope.message_or(format!("report {id}")),
                )),
            };
        }
        let message = envelope.message_or(format!("无法加载报告 (ID: {id})"));
        if status == StatusCode::NOT_FOUND {
            Err(ReportError::NotFound(message))
        } else {
            Err(ReportError::Producer(message))
        }
    }

    async fn list(&self) -> Result<Vec<ReportCatalogEntry>, ReportError> {
        let url = self.reports_url()?;
        debug!(%url, "listing reports");
        let (_, envelope) = self
            .send::<Vec<ReportCatalogEntry>>(self.client.get(url))
            .await?;

        if envelope.success {
            Ok(envelope.data.unwrap_or_default())
        } else {
            Err(ReportError::Producer(envelope.message_or("无法加载报告列表")))
        }
    }
}
