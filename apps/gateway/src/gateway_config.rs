use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use permitra_core::AppError;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Service-account credentials used when no client refresh token is held.
#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    pub username: String,
    pub password: String,
}

/// Connection settings for the upstream reference and auth services.
#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
    pub reference_api_url: Url,
    pub auth_api_url: Url,
    pub service_credentials: Option<ServiceCredentials>,
}

/// Which relation directory backs the gateway.
#[derive(Debug, Clone)]
pub enum DirectoryProviderConfig {
    Http(HttpDirectoryConfig),
    Memory,
}

/// Runtime configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub frontend_url: String,
    pub gateway_host: String,
    pub gateway_port: u16,
    pub http_timeout_secs: u64,
    pub directory_provider: DirectoryProviderConfig,
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());

        let gateway_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let gateway_port = env::var("GATEWAY_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(30);

        let directory_provider = match env::var("DIRECTORY_PROVIDER")
            .unwrap_or_else(|_| "http".to_owned())
            .as_str()
        {
            "http" => {
                let reference_api_url = required_url_env("REFERENCE_API_URL")?;
                let auth_api_url = required_url_env("AUTH_API_URL")?;

                let username = env::var("SERVICE_USERNAME").ok().filter(|v| !v.is_empty());
                let password = env::var("SERVICE_PASSWORD").ok().filter(|v| !v.is_empty());
                let service_credentials = match (username, password) {
                    (Some(username), Some(password)) => Some(ServiceCredentials {
                        username,
                        password,
                    }),
                    (None, None) => None,
                    _ => {
                        return Err(AppError::Validation(
                            "SERVICE_USERNAME and SERVICE_PASSWORD must be set together"
                                .to_owned(),
                        ));
                    }
                };

                DirectoryProviderConfig::Http(HttpDirectoryConfig {
                    reference_api_url,
                    auth_api_url,
                    service_credentials,
                })
            }
            "memory" => DirectoryProviderConfig::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "DIRECTORY_PROVIDER must be either 'http' or 'memory', got '{other}'"
                )));
            }
        };

        Ok(Self {
            frontend_url,
            gateway_host,
            gateway_port,
            http_timeout_secs,
            directory_provider,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.gateway_host).map_err(|error| {
            AppError::Internal(format!(
                "invalid GATEWAY_HOST '{}': {error}",
                self.gateway_host
            ))
        })?;
        Ok(SocketAddr::from((host, self.gateway_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_url_env(name: &str) -> Result<Url, AppError> {
    let value = required_env(name)?;
    Url::parse(&value).map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
}
