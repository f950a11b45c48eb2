use super::{Backend, BackendError, JobId, types::*};
use crate::config::Config;
use crate::timeline::Timeline;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// `Backend` over the parse service's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(cfg: &Config) -> Result<Self, BackendError> {
        let mut raw = cfg.server.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base =
            Url::parse(&raw).map_err(|e| BackendError::InvalidUrl(format!("{raw}: {e}")))?;
        let client = Client::builder()
            .user_agent(cfg.server.user_agent.clone())
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::InvalidUrl(format!("{path}: {e}")))
    }

    fn endpoint_with(&self, path: &str, key: &str, value: &str) -> Result<Url, BackendError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().append_pair(key, value);
        Ok(url)
    }

    /// Absolute URLs are used as-is; anything else resolves against the base.
    fn asset_url(&self, raw: &str) -> Result<Url, BackendError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(_) => self.endpoint(raw),
        }
    }
}

impl Backend for HttpBackend {
    async fn list_demos(&self) -> Result<Vec<String>, BackendError> {
        let url = self.endpoint("api/demos")?;
        debug!("GET {url}");
        let out: DemosOut = read_json(self.client.get(url).send().await?).await?;
        Ok(out.demos)
    }

    async fn start_parse(&self, req: &StartParseIn) -> Result<JobId, BackendError> {
        let url = self.endpoint("api/start-parse")?;
        debug!("POST {url} name={} every_n={}", req.name, req.every_n);
        let out: StartParseOut = read_json(self.client.post(url).json(req).send().await?).await?;
        if let Some(err) = out.error {
            return Err(BackendError::server(err));
        }
        match out.job {
            Some(job) if !job.is_empty() => Ok(JobId(job)),
            _ => Err(BackendError::invalid_response("start-parse reply has no job id")),
        }
    }

    async fn progress(&self, job: &JobId) -> Result<ProgressOut, BackendError> {
        let url = self.endpoint_with("api/progress", "job", &job.0)?;
        let out: ProgressOut = read_json(self.client.get(url).send().await?).await?;
        if let Some(err) = out.error.as_deref() {
            return Err(BackendError::server(err));
        }
        Ok(out)
    }

    async fn result(&self, job: &JobId) -> Result<Timeline, BackendError> {
        let url = self.endpoint_with("api/result", "job", &job.0)?;
        debug!("GET {url}");
        read_json(self.client.get(url).send().await?).await
    }

    async fn map_url(&self, name: &str) -> Result<Option<String>, BackendError> {
        let url = self.endpoint_with("api/map", "name", name)?;
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let out: MapOut = read_json(resp).await?;
        Ok(out.url.filter(|u| !u.trim().is_empty()))
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let url = self.asset_url(url)?;
        debug!("GET {url}");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, BackendError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            message: error_message(&bytes),
        });
    }
    serde_json::from_slice(&bytes).map_err(|e| BackendError::invalid_response(e.to_string()))
}

fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorOut {
        error: Option<String>,
    }

    serde_json::from_slice::<ErrorOut>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect())
}
