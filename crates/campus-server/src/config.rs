//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default so a development server
//! starts with a single variable set.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

/// Account created at startup with the ADMIN role, if configured.
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `CAMPUS_HOST`, default `0.0.0.0`.
    pub host: IpAddr,

    /// Env: `CAMPUS_PORT`, default `3000`.
    pub port: u16,

    /// Env: `CAMPUS_DB_PATH`, default `campus.db`.
    pub db_path: PathBuf,

    /// Env: `CAMPUS_UPLOAD_DIR`, default `./uploads`.
    pub upload_dir: PathBuf,

    /// Env: `CAMPUS_JWT_SECRET`. Required.
    pub jwt_secret: String,

    /// Identifiers accepted for the sentinel login.
    /// Env: `CAMPUS_ADMIN_ALIASES` (comma separated), default `admin,admin@admin.com`.
    pub admin_aliases: Vec<String>,

    /// Env: `CAMPUS_ADMIN_SECRET`. Unset disables the sentinel login.
    pub admin_secret: Option<String>,

    /// Env: `CAMPUS_SEED_ADMIN_EMAIL`, `CAMPUS_SEED_ADMIN_USERNAME` (default
    /// `admin`) and `CAMPUS_SEED_ADMIN_PASSWORD`. Needs both email and password.
    pub seed_admin: Option<SeedAdmin>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            db_path: PathBuf::from("campus.db"),
            upload_dir: PathBuf::from("./uploads"),
            jwt_secret: String::new(),
            admin_aliases: vec!["admin".to_string(), "admin@admin.com".to_string()],
            admin_secret: None,
            seed_admin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("CAMPUS_HOST") {
            match host.trim().parse::<IpAddr>() {
                Ok(parsed) => config.host = parsed,
                Err(_) => tracing::warn!(value = %host, "Invalid CAMPUS_HOST, using default"),
            }
        }

        if let Some(port) = var("CAMPUS_PORT") {
            match port.trim().parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => tracing::warn!(value = %port, "Invalid CAMPUS_PORT, using default"),
            }
        }

        if let Some(path) = var("CAMPUS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(dir) = var("CAMPUS_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }

        if let Some(secret) = var("CAMPUS_JWT_SECRET") {
            config.jwt_secret = secret;
        }

        if let Some(aliases) = var("CAMPUS_ADMIN_ALIASES") {
            let parsed: Vec<String> = aliases
                .split(',')
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect();
            if parsed.is_empty() {
                tracing::warn!(value = %aliases, "Invalid CAMPUS_ADMIN_ALIASES, using default");
            } else {
                config.admin_aliases = parsed;
            }
        }

        config.admin_secret = var("CAMPUS_ADMIN_SECRET");

        if let (Some(email), Some(password)) = (
            var("CAMPUS_SEED_ADMIN_EMAIL"),
            var("CAMPUS_SEED_ADMIN_PASSWORD"),
        ) {
            config.seed_admin = Some(SeedAdmin {
                email,
                username: var("CAMPUS_SEED_ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
                password,
            });
        }

        config
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Unset or placeholder secrets are refused.
    pub fn jwt_secret_is_usable(&self) -> bool {
        !self.jwt_secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.addr(), SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert_eq!(config.db_path, PathBuf::from("campus.db"));
        assert_eq!(config.admin_aliases, vec!["admin", "admin@admin.com"]);
        assert!(config.admin_secret.is_none());
        assert!(config.seed_admin.is_none());
        assert!(!config.jwt_secret_is_usable());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[("CAMPUS_PORT", "eighty"), ("CAMPUS_HOST", "localhost:1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, IpAddr::from([0, 0, 0, 0]));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CAMPUS_HOST", "127.0.0.1"),
            ("CAMPUS_PORT", "8088"),
            ("CAMPUS_JWT_SECRET", "s3cr3t-value"),
            ("CAMPUS_ADMIN_ALIASES", " Root , , director@school.ua "),
            ("CAMPUS_ADMIN_SECRET", "admin1236"),
        ]);
        assert_eq!(config.addr(), SocketAddr::from(([127, 0, 0, 1], 8088)));
        assert_eq!(config.admin_aliases, vec!["root", "director@school.ua"]);
        assert_eq!(config.admin_secret.as_deref(), Some("admin1236"));
        assert!(config.jwt_secret_is_usable());
    }

    #[test]
    fn test_placeholder_secret_refused() {
        let config = config(&[("CAMPUS_JWT_SECRET", "dev-secret-change-me")]);
        assert!(!config.jwt_secret_is_usable());
    }

    #[test]
    fn test_seed_admin_needs_email_and_password() {
        assert!(config(&[("CAMPUS_SEED_ADMIN_EMAIL", "head@school.ua")]).seed_admin.is_none());

        let seeded = config(&[
            ("CAMPUS_SEED_ADMIN_EMAIL", "head@school.ua"),
            ("CAMPUS_SEED_ADMIN_PASSWORD", "long-password"),
        ])
        .seed_admin
        .unwrap();
        assert_eq!(seeded.username, "admin");
    }
}
