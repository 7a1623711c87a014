use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// The JSON payload AWS signs for an instance.
///
/// Fields follow `http://169.254.169.254/latest/dynamic/instance-identity/document`.
/// Anything the service may leave out or send as `null` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentityDocument {
    pub account_id: String,
    pub architecture: String,
    pub availability_zone: String,
    #[serde(default)]
    pub billing_products: Option<Vec<String>>,
    #[serde(default)]
    pub devpay_product_codes: Option<Vec<String>>,
    #[serde(default)]
    pub marketplace_product_codes: Option<Vec<String>>,
    pub image_id: String,
    pub instance_id: String,
    pub instance_type: String,
    #[serde(default)]
    pub kernel_id: Option<String>,
    #[serde(default)]
    pub pending_time: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub ramdisk_id: Option<String>,
    pub region: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl InstanceIdentityDocument {
    /// Parses verified content. Only call this on bytes returned by the verifier.
    pub fn parse(content: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(content)
            .map_err(|err| anyhow!("instance identity document parse failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let content = std::fs::read("./samples/document.json").unwrap();
        let doc = InstanceIdentityDocument::parse(&content).unwrap();
        assert_eq!(doc.account_id, "123456789012");
        assert_eq!(doc.instance_id, "i-0123456789abcdef0");
        assert_eq!(doc.region, "us-east-1");
        assert_eq!(doc.private_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(doc.billing_products, None);
        assert_eq!(doc.kernel_id, None);
    }

    #[test]
    fn test_parse_product_codes() {
        let content = br#"{
            "accountId": "1", "architecture": "arm64", "availabilityZone": "eu-west-1b",
            "imageId": "ami-1", "instanceId": "i-1", "instanceType": "m7g.large",
            "region": "eu-west-1", "marketplaceProductCodes": ["abc123"]
        }"#;
        let doc = InstanceIdentityDocument::parse(content).unwrap();
        assert_eq!(doc.marketplace_product_codes, Some(vec!["abc123".to_string()]));
        assert_eq!(doc.version, None);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(InstanceIdentityDocument::parse(b"not json").is_err());
        assert!(InstanceIdentityDocument::parse(br#"{"accountId": "1"}"#).is_err());
    }
}
