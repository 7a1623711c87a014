use std::time::Duration;

use reqwest::blocking::Client;

use crate::VerifyError;

pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";
pub const DEFAULT_PKCS7_PATH: &str = "/latest/dynamic/instance-identity/pkcs7";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TOKEN_TTL_SECS: u32 = 60;

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Retrieves the raw bytes stored at a metadata path.
pub trait Fetch {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, VerifyError>;
}

#[derive(Debug, Clone)]
pub struct ImdsConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// IMDSv2 session token lifetime. `None` issues plain IMDSv1 requests.
    pub token_ttl: Option<u32>,
}

impl Default for ImdsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            token_ttl: Some(DEFAULT_TOKEN_TTL_SECS),
        }
    }
}

/// Blocking client for the EC2 instance metadata service.
pub struct ImdsClient {
    client: Client,
    config: ImdsConfig,
}

impl ImdsClient {
    pub fn new(config: ImdsConfig) -> Result<Self, VerifyError> {
        // the service is link-local, a proxy can only get in the way
        let client = Client::builder()
            .timeout(config.timeout)
            .no_proxy()
            .build()
            .map_err(|err| VerifyError::Transport(format!("build http client: {}", err)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ImdsConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn session_token(&self, ttl: u32) -> Result<String, VerifyError> {
        let url = self.url(TOKEN_PATH);
        let response = self
            .client
            .put(&url)
            .header(TOKEN_TTL_HEADER, ttl.to_string())
            .send()
            .map_err(|err| VerifyError::Transport(format!("PUT {}: {}", url, err)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Transport(format!(
                "PUT {}: unexpected status {}",
                url, status
            )));
        }
        response
            .text()
            .map_err(|err| VerifyError::Transport(format!("read session token: {}", err)))
    }
}

impl Fetch for ImdsClient {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, VerifyError> {
        let url = self.url(path);
        let mut request = self.client.get(&url);
        if let Some(ttl) = self.config.token_ttl {
            request = request.header(TOKEN_HEADER, self.session_token(ttl)?);
        }
        let response = request
            .send()
            .map_err(|err| VerifyError::Transport(format!("GET {}: {}", url, err)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Transport(format!(
                "GET {}: unexpected status {}",
                url, status
            )));
        }
        let body = response
            .bytes()
            .map_err(|err| VerifyError::Transport(format!("read {}: {}", url, err)))?;
        Ok(body.to_vec())
    }
}
