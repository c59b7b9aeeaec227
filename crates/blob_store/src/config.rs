//! Backend settings.
//!
//! One immutable record per backend kind. Each record carries exactly what is
//! needed to address one container on that backend; a missing or empty
//! required value is rejected when the record is built or validated.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult};

/// Default number of entries returned by one `enumerate` call.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn require(field: &str, value: &str) -> BlobResult<()> {
    if value.trim().is_empty() {
        return Err(BlobError::InvalidSettings {
            reason: format!("{} must not be empty", field),
        });
    }
    Ok(())
}

fn require_page_size(page_size: usize) -> BlobResult<()> {
    if page_size == 0 {
        return Err(BlobError::InvalidSettings {
            reason: "page_size must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// The kind of backend a facade is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Cloud object storage (S3).
    ObjectStore,
    /// Cloud blob containers (Azure).
    BlobContainer,
    /// A directory on the local filesystem.
    Disk,
    /// REST key/value storage service (kvpbase).
    KvpStore,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::ObjectStore => "aws",
            StorageType::BlobContainer => "azure",
            StorageType::Disk => "disk",
            StorageType::KvpStore => "kvp",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "s3" => Ok(StorageType::ObjectStore),
            "azure" | "az" => Ok(StorageType::BlobContainer),
            "disk" | "file" => Ok(StorageType::Disk),
            "kvp" | "kvpbase" => Ok(StorageType::KvpStore),
            other => Err(BlobError::UnsupportedBackend {
                kind: other.to_string(),
            }),
        }
    }
}

/// Settings for an S3 bucket.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwsSettings {
    pub access_key: String,
    pub secret_key: String,
    /// Either `us-west-1` or `USWest1`.
    pub region: String,
    pub bucket: String,
    /// S3-compatible endpoint (MinIO, LocalStack). AWS itself when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl AwsSettings {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> BlobResult<Self> {
        let settings = Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            bucket: bucket.into(),
            endpoint: None,
            page_size: DEFAULT_PAGE_SIZE,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> BlobResult<()> {
        require("access_key", &self.access_key)?;
        require("secret_key", &self.secret_key)?;
        require("region", &self.region)?;
        require("bucket", &self.bucket)?;
        require_page_size(self.page_size)
    }

    /// Region in the `us-west-1` form expected by S3.
    pub fn region_name(&self) -> String {
        normalize_region(&self.region)
    }
}

impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("access_key", &"<hidden>")
            .field("secret_key", &"<hidden>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Turns `USWest1` / `EUCentral1` / `APSoutheast2` into `us-west-1` style
/// names. Names already in that style pass through lowercased.
pub fn normalize_region(region: &str) -> String {
    let region = region.trim();
    if region.contains('-') || region.len() < 3 || !region.is_ascii() {
        return region.to_ascii_lowercase();
    }

    let (area, rest) = region.split_at(2);
    let digits_at = rest
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (words, digits) = rest.split_at(digits_at);

    let mut parts = vec![area.to_ascii_lowercase()];
    let mut word = String::new();
    for c in words.chars() {
        if c.is_ascii_uppercase() && !word.is_empty() {
            parts.push(std::mem::take(&mut word).to_ascii_lowercase());
        }
        word.push(c);
    }
    if !word.is_empty() {
        parts.push(word.to_ascii_lowercase());
    }
    if !digits.is_empty() {
        parts.push(digits.to_string());
    }
    parts.join("-")
}

/// Settings for an Azure blob container.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AzureSettings {
    pub account_name: String,
    pub access_key: String,
    pub endpoint: String,
    pub container: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl AzureSettings {
    pub fn new(
        account_name: impl Into<String>,
        access_key: impl Into<String>,
        endpoint: impl Into<String>,
        container: impl Into<String>,
    ) -> BlobResult<Self> {
        let settings = Self {
            account_name: account_name.into(),
            access_key: access_key.into(),
            endpoint: endpoint.into(),
            container: container.into(),
            page_size: DEFAULT_PAGE_SIZE,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> BlobResult<()> {
        require("account_name", &self.account_name)?;
        require("access_key", &self.access_key)?;
        require("endpoint", &self.endpoint)?;
        require("container", &self.container)?;
        require_page_size(self.page_size)
    }
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("account_name", &self.account_name)
            .field("access_key", &"<hidden>")
            .field("endpoint", &self.endpoint)
            .field("container", &self.container)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Settings for a directory on the local filesystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskSettings {
    pub directory: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl DiskSettings {
    pub fn new(directory: impl Into<PathBuf>) -> BlobResult<Self> {
        let settings = Self {
            directory: directory.into(),
            page_size: DEFAULT_PAGE_SIZE,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> BlobResult<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(BlobError::InvalidSettings {
                reason: "directory must not be empty".to_string(),
            });
        }
        require_page_size(self.page_size)
    }
}

/// Settings for a kvpbase container.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KvpbaseSettings {
    pub endpoint: String,
    pub user_guid: String,
    pub container: String,
    pub api_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl KvpbaseSettings {
    pub fn new(
        endpoint: impl Into<String>,
        user_guid: impl Into<String>,
        container: impl Into<String>,
        api_key: impl Into<String>,
    ) -> BlobResult<Self> {
        let settings = Self {
            endpoint: endpoint.into(),
            user_guid: user_guid.into(),
            container: container.into(),
            api_key: api_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> BlobResult<()> {
        require("endpoint", &self.endpoint)?;
        require("user_guid", &self.user_guid)?;
        require("container", &self.container)?;
        require("api_key", &self.api_key)?;
        require_page_size(self.page_size)
    }
}

impl fmt::Debug for KvpbaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvpbaseSettings")
            .field("endpoint", &self.endpoint)
            .field("user_guid", &self.user_guid)
            .field("container", &self.container)
            .field("api_key", &"<hidden>")
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Settings for exactly one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageSettings {
    Aws(AwsSettings),
    Azure(AzureSettings),
    Disk(DiskSettings),
    Kvpbase(KvpbaseSettings),
}

impl StorageSettings {
    pub fn storage_type(&self) -> StorageType {
        match self {
            StorageSettings::Aws(_) => StorageType::ObjectStore,
            StorageSettings::Azure(_) => StorageType::BlobContainer,
            StorageSettings::Disk(_) => StorageType::Disk,
            StorageSettings::Kvpbase(_) => StorageType::KvpStore,
        }
    }

    pub fn validate(&self) -> BlobResult<()> {
        match self {
            StorageSettings::Aws(s) => s.validate(),
            StorageSettings::Azure(s) => s.validate(),
            StorageSettings::Disk(s) => s.validate(),
            StorageSettings::Kvpbase(s) => s.validate(),
        }
    }
}

impl From<AwsSettings> for StorageSettings {
    fn from(settings: AwsSettings) -> Self {
        StorageSettings::Aws(settings)
    }
}

impl From<AzureSettings> for StorageSettings {
    fn from(settings: AzureSettings) -> Self {
        StorageSettings::Azure(settings)
    }
}

impl From<DiskSettings> for StorageSettings {
    fn from(settings: DiskSettings) -> Self {
        StorageSettings::Disk(settings)
    }
}

impl From<KvpbaseSettings> for StorageSettings {
    fn from(settings: KvpbaseSettings) -> Self {
        StorageSettings::Kvpbase(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("USWest1"), "us-west-1");
        assert_eq!(normalize_region("USEast2"), "us-east-2");
        assert_eq!(normalize_region("EUCentral1"), "eu-central-1");
        assert_eq!(normalize_region("APSoutheast2"), "ap-southeast-2");
        assert_eq!(normalize_region("us-west-1"), "us-west-1");
        assert_eq!(normalize_region("US-WEST-1"), "us-west-1");
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        assert!(AwsSettings::new("key", "", "USWest1", "bucket").is_err());
        assert!(AzureSettings::new("acct", "key", " ", "container").is_err());
        assert!(DiskSettings::new("").is_err());
        assert!(KvpbaseSettings::new("http://localhost:8000", "user", "", "key").is_err());
        assert!(
            DiskSettings::new("/tmp/blobs")
                .unwrap()
                .with_page_size(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let aws = AwsSettings::new("AKIA", "s3cr3t", "USWest1", "bucket").unwrap();
        let printed = format!("{:?}", aws);
        assert!(!printed.contains("AKIA"));
        assert!(!printed.contains("s3cr3t"));

        let kvp = KvpbaseSettings::new("http://localhost:8000", "user", "c", "apikey").unwrap();
        assert!(!format!("{:?}", kvp).contains("apikey"));
    }

    #[test]
    fn test_storage_settings_deserialize() {
        let json = r#"{"type": "disk", "directory": "/var/blobs"}"#;
        let settings: StorageSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.storage_type(), StorageType::Disk);
        match settings {
            StorageSettings::Disk(disk) => {
                assert_eq!(disk.directory, PathBuf::from("/var/blobs"));
                assert_eq!(disk.page_size, DEFAULT_PAGE_SIZE);
            }
            other => panic!("unexpected settings: {:?}", other),
        }

        let json = r#"{"type": "kvpbase", "endpoint": "http://localhost:8000"}"#;
        assert!(serde_json::from_str::<StorageSettings>(json).is_err());
    }

    #[test]
    fn test_storage_type_parse() {
        assert_eq!("aws".parse::<StorageType>().unwrap(), StorageType::ObjectStore);
        assert_eq!("azure".parse::<StorageType>().unwrap(), StorageType::BlobContainer);
        assert_eq!("disk".parse::<StorageType>().unwrap(), StorageType::Disk);
        assert_eq!("kvp".parse::<StorageType>().unwrap(), StorageType::KvpStore);
        assert!("ftp".parse::<StorageType>().is_err());
        assert_eq!(StorageType::KvpStore.to_string(), "kvp");
    }
}
