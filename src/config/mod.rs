//! Environment configuration.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::SettingsError;

use std::env;
use std::net::IpAddr;

/// Default Redis broker URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
/// Default Qdrant endpoint.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Service settings resolved from the environment.
///
/// Nothing outside this struct controls the protocol: broker URL,
/// relational store coordinates, vector store coordinates, provider keys
/// (passed through to the outbound services), and the service identity.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Service name, used as `origin_service` on every emitted action.
    pub service_name: String,

    /// Service version, logged at startup.
    pub service_version: String,

    /// HTTP bind address.
    pub bind_addr: IpAddr,

    /// HTTP port.
    pub port: u16,

    /// Redis broker URL.
    pub redis_url: String,

    /// Relational store base URL (PostgREST-style).
    pub relational_url: String,

    /// Relational anon key.
    pub relational_anon_key: String,

    /// Relational service key for admin operations.
    pub relational_service_key: Option<String>,

    /// Qdrant endpoint.
    pub qdrant_url: String,

    /// Qdrant API key.
    pub qdrant_api_key: Option<String>,

    /// Embedding provider API key (forwarded to the embedding service).
    pub embedding_api_key: Option<String>,

    /// LLM provider API key (forwarded to the execution service).
    pub llm_api_key: Option<String>,

    /// Consumer workers per service.
    pub worker_count: usize,

    /// TTL for the shared agent-config cache, seconds.
    pub config_cache_ttl_secs: u64,

    /// TTL for the ingestion task mirror in shared KV, seconds.
    pub task_mirror_ttl_secs: u64,

    /// Timeout for `send_and_wait` calls, seconds.
    pub send_wait_timeout_secs: u64,

    /// Timeout granted to the execution service for a chat turn, seconds.
    pub execution_timeout_secs: u64,

    /// Max accepted PDF size, MiB.
    pub max_pdf_mib: u64,

    /// Max accepted DOCX size, MiB.
    pub max_docx_mib: u64,

    /// Max accepted size for any other document type, MiB.
    pub max_other_mib: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: "nooble".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            port: 8000,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            relational_url: String::new(),
            relational_anon_key: String::new(),
            relational_service_key: None,
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            embedding_api_key: None,
            llm_api_key: None,
            worker_count: 2,
            config_cache_ttl_secs: 600,
            task_mirror_ttl_secs: 3600,
            send_wait_timeout_secs: 30,
            execution_timeout_secs: 120,
            max_pdf_mib: 50,
            max_docx_mib: 20,
            max_other_mib: 10,
        }
    }
}

impl Settings {
    const ENV_SERVICE_NAME: &'static str = "NOOBLE_SERVICE_NAME";
    const ENV_SERVICE_VERSION: &'static str = "NOOBLE_SERVICE_VERSION";
    const ENV_BIND_ADDR: &'static str = "NOOBLE_BIND_ADDR";
    const ENV_PORT: &'static str = "NOOBLE_PORT";
    const ENV_REDIS_URL: &'static str = "NOOBLE_REDIS_URL";
    const ENV_RELATIONAL_URL: &'static str = "NOOBLE_RELATIONAL_URL";
    const ENV_RELATIONAL_ANON_KEY: &'static str = "NOOBLE_RELATIONAL_ANON_KEY";
    const ENV_RELATIONAL_SERVICE_KEY: &'static str = "NOOBLE_RELATIONAL_SERVICE_KEY";
    const ENV_QDRANT_URL: &'static str = "NOOBLE_QDRANT_URL";
    const ENV_QDRANT_API_KEY: &'static str = "NOOBLE_QDRANT_API_KEY";
    const ENV_EMBEDDING_API_KEY: &'static str = "NOOBLE_EMBEDDING_API_KEY";
    const ENV_LLM_API_KEY: &'static str = "NOOBLE_LLM_API_KEY";
    const ENV_WORKER_COUNT: &'static str = "NOOBLE_WORKER_COUNT";
    const ENV_CONFIG_CACHE_TTL: &'static str = "NOOBLE_CONFIG_CACHE_TTL";
    const ENV_TASK_MIRROR_TTL: &'static str = "NOOBLE_TASK_MIRROR_TTL";
    const ENV_SEND_WAIT_TIMEOUT: &'static str = "NOOBLE_SEND_WAIT_TIMEOUT";
    const ENV_EXECUTION_TIMEOUT: &'static str = "NOOBLE_EXECUTION_TIMEOUT";

    /// Reads settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;

        Ok(Self {
            service_name: Self::parse_string_from_env(
                Self::ENV_SERVICE_NAME,
                defaults.service_name,
            ),
            service_version: Self::parse_string_from_env(
                Self::ENV_SERVICE_VERSION,
                defaults.service_version,
            ),
            bind_addr,
            port,
            redis_url: Self::parse_string_from_env(Self::ENV_REDIS_URL, defaults.redis_url),
            relational_url: Self::parse_string_from_env(
                Self::ENV_RELATIONAL_URL,
                defaults.relational_url,
            ),
            relational_anon_key: Self::parse_string_from_env(
                Self::ENV_RELATIONAL_ANON_KEY,
                defaults.relational_anon_key,
            ),
            relational_service_key: Self::parse_optional_from_env(Self::ENV_RELATIONAL_SERVICE_KEY),
            qdrant_url: Self::parse_string_from_env(Self::ENV_QDRANT_URL, defaults.qdrant_url),
            qdrant_api_key: Self::parse_optional_from_env(Self::ENV_QDRANT_API_KEY),
            embedding_api_key: Self::parse_optional_from_env(Self::ENV_EMBEDDING_API_KEY),
            llm_api_key: Self::parse_optional_from_env(Self::ENV_LLM_API_KEY),
            worker_count: Self::parse_u64_from_env(
                Self::ENV_WORKER_COUNT,
                defaults.worker_count as u64,
            ) as usize,
            config_cache_ttl_secs: Self::parse_u64_from_env(
                Self::ENV_CONFIG_CACHE_TTL,
                defaults.config_cache_ttl_secs,
            ),
            task_mirror_ttl_secs: Self::parse_u64_from_env(
                Self::ENV_TASK_MIRROR_TTL,
                defaults.task_mirror_ttl_secs,
            ),
            send_wait_timeout_secs: Self::parse_u64_from_env(
                Self::ENV_SEND_WAIT_TIMEOUT,
                defaults.send_wait_timeout_secs,
            ),
            execution_timeout_secs: Self::parse_u64_from_env(
                Self::ENV_EXECUTION_TIMEOUT,
                defaults.execution_timeout_secs,
            ),
            max_pdf_mib: defaults.max_pdf_mib,
            max_docx_mib: defaults.max_docx_mib,
            max_other_mib: defaults.max_other_mib,
        })
    }

    /// Validates cross-field requirements.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.relational_url.is_empty() {
            return Err(SettingsError::MissingVar {
                name: Self::ENV_RELATIONAL_URL,
            });
        }
        if self.relational_anon_key.is_empty() {
            return Err(SettingsError::MissingVar {
                name: Self::ENV_RELATIONAL_ANON_KEY,
            });
        }
        if self.worker_count == 0 {
            return Err(SettingsError::InvalidWorkerCount {
                value: self.worker_count.to_string(),
            });
        }
        Ok(())
    }

    /// Returns `bind_addr:port` for the HTTP listener.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Size limit in bytes for a declared document type name.
    pub fn max_document_bytes(&self, document_type: &str) -> u64 {
        let mib = match document_type {
            "pdf" => self.max_pdf_mib,
            "docx" => self.max_docx_mib,
            _ => self.max_other_mib,
        };
        mib * 1024 * 1024
    }

    fn parse_port_from_env(default: u16) -> Result<u16, SettingsError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| SettingsError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;
                if port == 0 {
                    return Err(SettingsError::InvalidPort { value });
                }
                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, SettingsError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| SettingsError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_u64_from_env(var_name: &str, default: u64) -> u64 {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
