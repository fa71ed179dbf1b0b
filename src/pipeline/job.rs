// Job request intake and the validated, immutable job

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

use super::error::ValidationError;
use crate::manifest::is_valid_package_name;

/// How the output package identity is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    /// Keep the decoded identity
    #[serde(alias = "no_change")]
    Preserve,
    /// Generate `com.xxx.yyyyyyyyyy`
    Random,
    /// Use the caller-supplied `package_name`
    #[serde(alias = "no_random")]
    Explicit,
}

impl FromStr for NamingStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" | "no_change" => Ok(NamingStrategy::Preserve),
            "random" => Ok(NamingStrategy::Random),
            "explicit" | "no_random" => Ok(NamingStrategy::Explicit),
            other => Err(ValidationError::Invalid {
                field: "naming",
                reason: format!("unknown naming strategy '{}'", other),
            }),
        }
    }
}

impl fmt::Display for NamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NamingStrategy::Preserve => "preserve",
            NamingStrategy::Random => "random",
            NamingStrategy::Explicit => "explicit",
        })
    }
}

/// Raw job request as received on the wire.
///
/// Every field is optional here so that a missing or malformed value is
/// reported as a [`ValidationError`] naming the field rather than as a
/// generic decoding failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub apk_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "service_domain")]
    pub domain: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, alias = "package_name_method")]
    pub naming: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default, alias = "current_version", deserialize_with = "string_or_number")]
    pub version_code: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    /// Intake credential; never part of the job
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::Missing(field))
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn http_url(value: String, field: &'static str) -> Result<Url, ValidationError> {
    let url = Url::parse(&value).map_err(|e| ValidationError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::Invalid {
            field,
            reason: format!("scheme '{}' is not http or https", url.scheme()),
        });
    }
    Ok(url)
}

/// A value used as a single directory or file name component
fn path_segment(value: String, field: &'static str) -> Result<String, ValidationError> {
    let unsafe_segment = value == "."
        || value == ".."
        || value.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if unsafe_segment {
        return Err(ValidationError::Invalid {
            field,
            reason: "must be a single path segment".to_string(),
        });
    }
    Ok(value)
}

impl JobRequest {
    /// Validate into a [`Job`] with a fresh job id
    pub fn validate(&self) -> Result<Job, ValidationError> {
        let apk_url = http_url(required(&self.apk_url, "apk_url")?, "apk_url")?;
        let callback_url = http_url(required(&self.callback_url, "callback_url")?, "callback_url")?;
        let id = path_segment(required(&self.id, "id")?, "id")?;
        let domain = path_segment(required(&self.domain, "domain")?, "domain")?;
        let file_name = path_segment(required(&self.file_name, "file_name")?, "file_name")?;
        let naming: NamingStrategy = required(&self.naming, "naming")?.parse()?;

        let package_name = optional(&self.package_name);
        if naming == NamingStrategy::Explicit {
            match &package_name {
                None => return Err(ValidationError::Missing("package_name")),
                Some(package) if !is_valid_package_name(package) => {
                    return Err(ValidationError::Invalid {
                        field: "package_name",
                        reason: format!("'{}' is not a dotted package identity", package),
                    })
                }
                Some(_) => {}
            }
        }

        let version_code = optional(&self.version_code)
            .map(|code| {
                code.parse::<u64>().map_err(|_| ValidationError::Invalid {
                    field: "version_code",
                    reason: format!("'{}' is not a non-negative integer", code),
                })
            })
            .transpose()?;

        Ok(Job {
            job_id: Uuid::new_v4(),
            apk_url,
            callback_url,
            id,
            domain,
            file_name,
            naming,
            package_name,
            version_code,
            app_name: optional(&self.app_name),
        })
    }
}

/// One hardening job. Immutable once built.
#[derive(Debug, Clone)]
pub struct Job {
    job_id: Uuid,
    apk_url: Url,
    callback_url: Url,
    id: String,
    domain: String,
    file_name: String,
    naming: NamingStrategy,
    package_name: Option<String>,
    version_code: Option<u64>,
    app_name: Option<String>,
}

impl Job {
    pub fn new(request: &JobRequest) -> Result<Self, ValidationError> {
        request.validate()
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn apk_url(&self) -> &Url {
        &self.apk_url
    }

    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    /// Caller correlation id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn naming(&self) -> NamingStrategy {
        self.naming
    }

    /// Requested identity for [`NamingStrategy::Explicit`]
    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }

    pub fn version_code(&self) -> Option<u64> {
        self.version_code
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }
}
