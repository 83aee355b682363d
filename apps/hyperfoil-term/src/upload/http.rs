use super::{UploadError, UploadReceipt, UploadRequest};
use async_trait::async_trait;
use reqwest::header::{IF_MATCH, LOCATION};
use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Base URL of the controller that serves the web CLI.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    base_url: Url,
}

impl ControllerConfig {
    pub fn new(server_base_url: impl AsRef<str>) -> Result<Self, UploadError> {
        let mut base = server_base_url.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(UploadError::InvalidConfig(
                "controller url cannot be empty".into(),
            ));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            base = format!("http://{base}");
        }
        if !base.ends_with('/') {
            base.push('/');
        }
        let parsed = Url::parse(&base)
            .map_err(|err| UploadError::InvalidConfig(format!("invalid controller url: {err}")))?;
        Ok(Self { base_url: parsed })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, UploadError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| UploadError::InvalidConfig(format!("invalid endpoint {path}: {err}")))
    }
}

#[async_trait]
pub trait ControllerBackend: Send + Sync {
    async fn upload(&self, endpoint: Url, request: UploadRequest)
    -> Result<UploadReceipt, UploadError>;

    async fn fetch(&self, endpoint: Url, auth_token: Option<&str>) -> Result<Vec<u8>, UploadError>;
}

/// HTTP side of the client: benchmark uploads and indirect downloads.
#[derive(Clone)]
pub struct ControllerClient {
    config: Arc<ControllerConfig>,
    backend: Arc<dyn ControllerBackend>,
}

impl ControllerClient {
    pub fn new(config: ControllerConfig) -> Result<Self, UploadError> {
        let backend = Arc::new(ReqwestControllerBackend::new()?);
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: ControllerConfig, backend: Arc<dyn ControllerBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, UploadError> {
        let endpoint = self.config.endpoint("benchmark")?;
        debug!(
            target: "upload",
            %endpoint,
            parts = request.parts.len(),
            version = ?request.version,
            "submitting benchmark"
        );
        let receipt = self.backend.upload(endpoint, request).await?;
        info!(target: "upload", benchmark = %receipt.benchmark, "benchmark accepted");
        Ok(receipt)
    }

    pub async fn download(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<u8>, UploadError> {
        let endpoint = self.config.endpoint(path)?;
        debug!(target: "download", %endpoint, "fetching file");
        self.backend.fetch(endpoint, auth_token).await
    }
}

pub struct ReqwestControllerBackend {
    client: reqwest::Client,
}

impl ReqwestControllerBackend {
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ControllerBackend for ReqwestControllerBackend {
    async fn upload(
        &self,
        endpoint: Url,
        request: UploadRequest,
    ) -> Result<UploadReceipt, UploadError> {
        let UploadRequest {
            parts,
            version,
            auth_token,
        } = request;
        let mut form = Form::new();
        for part in parts {
            form = form.part(part.field, Part::bytes(part.content).file_name(part.filename));
        }
        let mut builder = self.client.post(endpoint).multipart(form);
        if let Some(version) = version {
            builder = builder.header(IF_MATCH, version);
        }
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, body });
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(UploadError::MissingLocation)?;
        Ok(UploadReceipt::from_location(location))
    }

    async fn fetch(&self, endpoint: Url, auth_token: Option<&str>) -> Result<Vec<u8>, UploadError> {
        let mut builder = self.client.get(endpoint);
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(UploadError::HttpStatus(response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
