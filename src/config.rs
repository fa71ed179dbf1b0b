use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::keystore::KeyDerivationPolicy;
use crate::smali::LaunchReporterConfig;

/// Result type for configuration loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Configuration file format for the hardening service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardenConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub public: PublicConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root for per-job staging directories and the keystore directory
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,
    /// Root of the public tree; artifacts land in `uploads/{domain}/app/apk`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicConfig {
    /// Base URL artifact locators are built from
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_java")]
    pub java: String,
    #[serde(default = "default_apktool_jar")]
    pub apktool_jar: PathBuf,
    #[serde(default = "default_zipalign")]
    pub zipalign: String,
    #[serde(default = "default_apksigner")]
    pub apksigner: String,
    /// Run `apksigner` as `java -jar <apksigner>`
    #[serde(default)]
    pub signer_is_jar: bool,
    #[serde(default = "default_keytool")]
    pub keytool: String,
    #[serde(default = "default_curl")]
    pub curl: String,
}

/// Per-call time budgets, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,
    #[serde(default = "default_apktool_secs")]
    pub unpack_secs: u64,
    #[serde(default = "default_apktool_secs")]
    pub repack_secs: u64,
    #[serde(default = "default_signing_secs")]
    pub align_secs: u64,
    #[serde(default = "default_signing_secs")]
    pub sign_secs: u64,
    #[serde(default = "default_signing_secs")]
    pub keygen_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// How a job maps to its persistent keystore
    #[serde(default)]
    pub key_derivation: KeyDerivationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    /// Launch reporter endpoint; no reporter or hooks are injected when unset
    pub launch_report_url: Option<String>,
    /// Key sent with every launch report
    pub launch_report_key: Option<String>,
    #[serde(default = "default_true")]
    pub protection_stub: bool,
    #[serde(default = "default_true")]
    pub camouflage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Required `api_key` for intake requests; open when unset
    pub api_key: Option<String>,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Jobs allowed to run at once; unbounded when unset
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
}

// Default value functions
fn default_jobs_dir() -> PathBuf { PathBuf::from("jobs") }
fn default_output_dir() -> PathBuf { PathBuf::from("downloads") }
fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_java() -> String { "java".to_string() }
fn default_apktool_jar() -> PathBuf { PathBuf::from("apktool/apktool.jar") }
fn default_zipalign() -> String { "zipalign".to_string() }
fn default_apksigner() -> String { "apksigner".to_string() }
fn default_keytool() -> String { "keytool".to_string() }
fn default_curl() -> String { "curl".to_string() }
fn default_fetch_secs() -> u64 { 600 }
fn default_apktool_secs() -> u64 { 3600 }
fn default_signing_secs() -> u64 { 300 }
fn default_true() -> bool { true }
fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_cors_origins() -> Vec<String> { vec!["*".to_string()] }
fn default_callback_timeout_secs() -> u64 { 15 }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            apktool_jar: default_apktool_jar(),
            zipalign: default_zipalign(),
            apksigner: default_apksigner(),
            signer_is_jar: false,
            keytool: default_keytool(),
            curl: default_curl(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            unpack_secs: default_apktool_secs(),
            repack_secs: default_apktool_secs(),
            align_secs: default_signing_secs(),
            sign_secs: default_signing_secs(),
            keygen_secs: default_signing_secs(),
        }
    }
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            launch_report_url: None,
            launch_report_key: None,
            protection_stub: true,
            camouflage: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: None,
            callback_timeout_secs: default_callback_timeout_secs(),
        }
    }
}

impl PathsConfig {
    pub fn keystores_dir(&self) -> PathBuf {
        self.jobs_dir.join("keystores")
    }
}

impl TimeoutsConfig {
    pub fn fetch(&self) -> Duration { Duration::from_secs(self.fetch_secs) }
    pub fn unpack(&self) -> Duration { Duration::from_secs(self.unpack_secs) }
    pub fn repack(&self) -> Duration { Duration::from_secs(self.repack_secs) }
    pub fn align(&self) -> Duration { Duration::from_secs(self.align_secs) }
    pub fn sign(&self) -> Duration { Duration::from_secs(self.sign_secs) }
    pub fn keygen(&self) -> Duration { Duration::from_secs(self.keygen_secs) }
}

impl InjectionConfig {
    /// Reporter settings, present only when a report URL is configured
    pub fn launch_reporter(&self) -> Option<LaunchReporterConfig> {
        let url = self.launch_report_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(LaunchReporterConfig {
            report_url: url.to_string(),
            key: self.launch_report_key.clone().unwrap_or_default(),
        })
    }
}

impl HardenConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (or defaults) plus environment overrides, validated
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                log::info!("loading configuration from {}", path.display());
                Self::load_from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply deployment overrides from `lookup`.
    ///
    /// `PUBLIC_DOMAIN` wins over `HARDENING_BASE_URL`, and
    /// `HARDENED_APK_OUTPUT_DIR` over `HARDENING_DOWNLOAD_DIR`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(base_url) = get("PUBLIC_DOMAIN").or_else(|| get("HARDENING_BASE_URL")) {
            self.public.base_url = base_url;
        }
        if let Some(dir) = get("HARDENED_APK_OUTPUT_DIR").or_else(|| get("HARDENING_DOWNLOAD_DIR")) {
            self.paths.output_dir = PathBuf::from(dir);
        }
        if let Some(key) = get("HARDENING_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(zipalign) = get("APK_Z") {
            self.tools.zipalign = zipalign;
        }
        if let Some(apksigner) = get("APK_S") {
            self.tools.apksigner = apksigner;
        }
        if let Some(server_type) = get("SERVER_TYPE") {
            self.tools.signer_is_jar = server_type.eq_ignore_ascii_case("LOCAL");
        }
        if let Some(origins) = get("SOCKETIO_CORS_ORIGINS") {
            self.server.cors_origins = origins.split(',').map(|o| o.trim().to_string()).collect();
        }
    }

    /// Base URL without a trailing slash
    pub fn public_base_url(&self) -> &str {
        self.public.base_url.trim_end_matches('/')
    }

    /// Generate a sample configuration file content
    pub fn generate_sample_config() -> String {
        let mut sample = Self::default();
        sample.injection.launch_report_url = Some("https://telemetry.example.com/launch".to_string());
        sample.injection.launch_report_key = Some("change-me".to_string());
        sample.pipeline.max_concurrent_jobs = Some(4);
        toml::to_string_pretty(&sample).unwrap_or_else(|_| "# Failed to generate sample configuration".to_string())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match Url::parse(&self.public.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!("public.base_url must be http or https, got '{}'", url.scheme())),
            Err(e) => errors.push(format!("public.base_url is not a valid URL: {}", e)),
        }

        let timeouts = [
            ("fetch_secs", self.timeouts.fetch_secs),
            ("unpack_secs", self.timeouts.unpack_secs),
            ("repack_secs", self.timeouts.repack_secs),
            ("align_secs", self.timeouts.align_secs),
            ("sign_secs", self.timeouts.sign_secs),
            ("keygen_secs", self.timeouts.keygen_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                errors.push(format!("timeouts.{} must be greater than 0", name));
            }
        }

        if self.pipeline.max_concurrent_jobs == Some(0) {
            errors.push("pipeline.max_concurrent_jobs must be greater than 0 when set".to_string());
        }
        if self.pipeline.callback_timeout_secs == 0 {
            errors.push("pipeline.callback_timeout_secs must be greater than 0".to_string());
        }

        if let Some(url) = &self.injection.launch_report_url {
            if Url::parse(url).is_err() {
                errors.push(format!("injection.launch_report_url '{}' is not a valid URL", url));
            }
        }

        if self.server.bind.parse::<SocketAddr>().is_err() {
            errors.push(format!("server.bind '{}' is not a socket address", self.server.bind));
        }

        if self.paths.jobs_dir == self.paths.output_dir {
            errors.push("paths.jobs_dir and paths.output_dir must differ".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = HardenConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeouts.unpack(), Duration::from_secs(3600));
        assert_eq!(config.timeouts.sign(), Duration::from_secs(300));
        assert_eq!(config.timeouts.fetch(), Duration::from_secs(600));
        assert_eq!(config.signing.key_derivation, KeyDerivationPolicy::FileAndId);
        assert!(config.pipeline.max_concurrent_jobs.is_none());
        assert!(config.injection.launch_reporter().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: HardenConfig = toml::from_str(
            r#"
            [signing]
            key_derivation = "package-hash"

            [injection]
            launch_report_url = "https://t.example.com/launch"
            "#,
        )
        .unwrap();

        assert_eq!(config.signing.key_derivation, KeyDerivationPolicy::PackageHash);
        assert_eq!(config.tools.curl, "curl");
        let reporter = config.injection.launch_reporter().unwrap();
        assert_eq!(reporter.report_url, "https://t.example.com/launch");
        assert_eq!(reporter.key, "");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HARDENING_BASE_URL", "https://ignored.example.com"),
            ("PUBLIC_DOMAIN", "https://cdn.example.com/"),
            ("HARDENING_DOWNLOAD_DIR", "/srv/downloads"),
            ("HARDENING_API_KEY", "secret"),
            ("APK_Z", "/opt/zipalign"),
            ("APK_S", "/opt/apksigner.jar"),
            ("SERVER_TYPE", "LOCAL"),
        ]
        .into_iter()
        .collect();

        let mut config = HardenConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.public_base_url(), "https://cdn.example.com");
        assert_eq!(config.paths.output_dir, PathBuf::from("/srv/downloads"));
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.tools.zipalign, "/opt/zipalign");
        assert_eq!(config.tools.apksigner, "/opt/apksigner.jar");
        assert!(config.tools.signer_is_jar);
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = HardenConfig::default();
        config.public.base_url = "ftp://files.example.com".to_string();
        config.timeouts.sign_secs = 0;
        config.pipeline.max_concurrent_jobs = Some(0);
        config.server.bind = "nowhere".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = HardenConfig::generate_sample_config();
        let parsed: HardenConfig = toml::from_str(&sample).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.pipeline.max_concurrent_jobs, Some(4));
    }
}
