use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use blob_store::{DEFAULT_PAGE_SIZE, DiskSettings, StorageSettings};
use figment::{
    Figment,
    providers::{Env, Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "BLOBHELPER_";

fn default_storage() -> StorageSettings {
    StorageSettings::Disk(DiskSettings {
        directory: PathBuf::from("./blobs"),
        page_size: DEFAULT_PAGE_SIZE,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHelperConfig {
    #[serde(default = "default_storage")]
    pub storage: StorageSettings,
    #[serde(default)]
    pub structured_logging: bool,
}

impl Default for BlobHelperConfig {
    fn default() -> Self {
        BlobHelperConfig {
            storage: default_storage(),
            structured_logging: false,
        }
    }
}

impl BlobHelperConfig {
    /// Loads the config file (YAML, or TOML by extension) if one is given,
    /// then applies `BLOBHELPER_` environment overrides, e.g.
    /// `BLOBHELPER_STORAGE__DIRECTORY=/data`.
    pub fn load(path: Option<&Path>) -> Result<BlobHelperConfig> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.is_file() {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                _ => figment.merge(Yaml::file(path)),
            };
        }
        let config: BlobHelperConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        Ok(())
    }
}
