use std::path::PathBuf;

use anyhow::{Context, bail};

use carmarket_types::validation::{validate_password, validate_username};

const DEFAULT_DB_PATH: &str = "carmarket.db";
const DEV_SECRET: &str = "dev-secret-change-me";

/// Secrets that ship in examples and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-here",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub session_secret: String,
    pub production: bool,
    pub host: String,
    pub port: u16,
    pub trust_proxy: bool,
    pub cors_origin: Option<String>,
    /// `(username, password)` of the account to ensure at startup.
    pub admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = var("APP_ENV")
            .or_else(|| var("NODE_ENV"))
            .is_some_and(|env| env.eq_ignore_ascii_case("production"));

        let session_secret = match var("SESSION_SECRET") {
            Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
            _ if production => bail!("SESSION_SECRET is unset or still a placeholder"),
            Some(secret) => secret,
            None => DEV_SECRET.to_string(),
        };

        let database_path = var("DATABASE_URL")
            .map(|url| url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();

        let port = match var("CARMARKET_PORT") {
            Some(port) => port.parse().with_context(|| format!("invalid CARMARKET_PORT {port:?}"))?,
            None => 5000,
        };

        let admin = match (var("ADMIN_USERNAME"), get("ADMIN_PASSWORD").filter(|p| !p.is_empty())) {
            (Some(username), Some(password)) => {
                if validate_username(&username).is_err() {
                    bail!("ADMIN_USERNAME {username:?} is not a valid username");
                }
                if validate_password(&password).is_err() {
                    bail!("ADMIN_PASSWORD does not meet the password rules");
                }
                Some((username, password))
            }
            _ => None,
        };

        Ok(Self {
            database_path,
            session_secret,
            production,
            host: var("CARMARKET_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            trust_proxy: var("TRUST_PROXY").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            cors_origin: var("CORS_ORIGIN"),
            admin,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.session_secret == DEV_SECRET
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_for_development() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.database_path, PathBuf::from("carmarket.db"));
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(!cfg.production);
        assert!(!cfg.trust_proxy);
        assert!(cfg.uses_dev_secret());
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn production_requires_a_real_secret() {
        assert!(config(&[("APP_ENV", "production")]).is_err());
        assert!(config(&[("NODE_ENV", "production"), ("SESSION_SECRET", "dev-secret-change-me")]).is_err());

        let cfg = config(&[("NODE_ENV", "production"), ("SESSION_SECRET", "0f9a7c1e5b")]).unwrap();
        assert!(cfg.production);
        assert_eq!(cfg.session_secret, "0f9a7c1e5b");
    }

    #[test]
    fn database_url_accepts_sqlite_scheme() {
        let cfg = config(&[("DATABASE_URL", "sqlite:///var/lib/carmarket/app.db")]).unwrap();
        assert_eq!(cfg.database_path, PathBuf::from("/var/lib/carmarket/app.db"));
    }

    #[test]
    fn admin_needs_both_values_and_valid_rules() {
        assert!(config(&[("ADMIN_USERNAME", "root")]).unwrap().admin.is_none());
        assert!(config(&[("ADMIN_USERNAME", "root"), ("ADMIN_PASSWORD", "weak")]).is_err());

        let cfg = config(&[("ADMIN_USERNAME", "root"), ("ADMIN_PASSWORD", "Adm1n!pass")]).unwrap();
        assert_eq!(cfg.admin, Some(("root".to_string(), "Adm1n!pass".to_string())));
    }

    #[test]
    fn flags_and_port() {
        let cfg = config(&[("TRUST_PROXY", "true"), ("CARMARKET_PORT", "8080")]).unwrap();
        assert!(cfg.trust_proxy);
        assert_eq!(cfg.port, 8080);
        assert!(config(&[("CARMARKET_PORT", "http")]).is_err());
    }
}
