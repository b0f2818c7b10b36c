//! Configuration for rootline
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;

/// Rootline - collaborative family-tree server
#[derive(Parser, Debug, Clone)]
#[command(name = "rootline")]
#[command(about = "Server core for a collaborative, moderated family tree")]
pub struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds (24h default)
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "rootline")]
    pub mongodb_db: String,

    /// Frontend origin, reported in CORS responses when set
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Enable development mode (in-memory store, relaxed JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> crate::types::Result<String> {
        match &self.jwt_secret {
            Some(s) => Ok(s.clone()),
            None if self.dev_mode => Ok("dev-only-insecure-secret-0123456789ab".to_string()),
            None => Err(crate::types::RootlineError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration before startup
    pub fn validate(&self) -> crate::types::Result<()> {
        let secret = self.jwt_secret()?;
        if secret.len() < 32 {
            return Err(crate::types::RootlineError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }
        Ok(())
    }

    /// Socket address the server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            port: 8080,
            bind_addr: "0.0.0.0".into(),
            jwt_secret: None,
            jwt_expiry_seconds: 86400,
            mongodb_uri: "mongodb://localhost:27017".into(),
            mongodb_db: "rootline".into(),
            frontend_url: None,
            dev_mode: false,
            log_level: "info".into(),
        }
    }

    #[test]
    fn test_missing_secret_rejected_in_production() {
        let args = base_args();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut args = base_args();
        args.jwt_secret = Some("too-short".into());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_dev_mode_allows_missing_secret() {
        let mut args = base_args();
        args.dev_mode = true;
        assert!(args.validate().is_ok());
    }
}
