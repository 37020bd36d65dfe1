use std::path::PathBuf;

use crate::authz::AuthzMode;
use crate::errors::AppError;
use crate::jwt::JwtConfig;

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Runtime configuration gathered from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub authz_mode: AuthzMode,
    pub port: u16,
    pub tls: Option<TlsPaths>,
}

impl AppConfig {
    pub fn new(jwt: JwtConfig) -> Self {
        Self {
            jwt,
            authz_mode: AuthzMode::Off,
            port: 8000,
            tls: None,
        }
    }

    pub fn with_authz_mode(mut self, mode: AuthzMode) -> Self {
        self.authz_mode = mode;
        self
    }

    pub fn from_env() -> Result<Self, AppError> {
        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => 8000,
        };

        let tls = match (std::env::var("TLS_CERT_PATH"), std::env::var("TLS_KEY_PATH")) {
            (Ok(cert), Ok(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
                return Err(AppError::configuration(
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together",
                ))
            }
            _ => None,
        };

        Ok(Self {
            jwt: JwtConfig::from_env()?,
            authz_mode: AuthzMode::from_env(),
            port,
            tls,
        })
    }
}
