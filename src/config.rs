use crate::constants::{DEFAULT_DATA_PATH, DEFAULT_HOST, DEFAULT_PORT, MIN_SESSION_SECRET_LENGTH};

/// Server configuration loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub session_secret: String,
}

impl Config {
    /// Load configuration from environment variables, applying defaults
    /// for everything except SESSION_SECRET.
    pub fn from_env() -> Result<Self, String> {
        let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let data_path = std::env::var("DATA_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());

        let session_secret = std::env::var("SESSION_SECRET")
            .map_err(|_| "SESSION_SECRET must be set".to_string())?;

        if session_secret.len() < MIN_SESSION_SECRET_LENGTH {
            return Err(format!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SESSION_SECRET_LENGTH
            ));
        }

        port.parse::<u16>()
            .map_err(|_| format!("PORT must be a valid port number, got '{}'", port))?;

        Ok(Self {
            host,
            port,
            data_path,
            session_secret,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
