use std::time::Duration;

use aws_instance_identity_verifier::{
    ImdsClient, ImdsConfig, VerifyError, DEFAULT_IMDS_ENDPOINT, DEFAULT_TIMEOUT,
    DEFAULT_TOKEN_TTL_SECS,
};
use clap::Args;

#[derive(Args, Clone, Debug)]
pub struct ImdsArgs {
    /// Base URL of the instance metadata service
    #[arg(long, env = "IMDS_ENDPOINT", default_value = DEFAULT_IMDS_ENDPOINT)]
    pub endpoint: String,

    /// Request timeout in seconds
    #[arg(long, env = "IMDS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Send plain IMDSv1 requests without a session token
    #[arg(long, default_value = "false", env = "IMDS_V1")]
    pub imds_v1: bool,

    /// Lifetime of the IMDSv2 session token
    #[arg(long, env = "IMDS_TOKEN_TTL_SECS", default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub token_ttl_secs: u32,
}

impl ImdsArgs {
    pub fn config(&self) -> ImdsConfig {
        ImdsConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            token_ttl: if self.imds_v1 {
                None
            } else {
                Some(self.token_ttl_secs)
            },
        }
    }

    pub fn client(&self) -> Result<ImdsClient, VerifyError> {
        ImdsClient::new(self.config())
    }
}
