use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store; state is lost on restart.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 { 5 }
fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_seconds: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_reset_ttl")]
    pub reset_token_ttl_seconds: u64,
}

fn default_jwt_expiration() -> u64 { 7 * 24 * 60 * 60 }
fn default_bcrypt_cost() -> u32 { 10 }
fn default_reset_ttl() -> u64 { 60 * 60 }

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_prefix")]
    pub booking_number_prefix: String,
    #[serde(default = "default_attempts")]
    pub booking_number_attempts: u32,
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_prefix() -> String { "RSQ".into() }
fn default_attempts() -> u32 { 5 }
fn default_currency() -> String { "USD".into() }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            booking_number_prefix: default_prefix(),
            booking_number_attempts: default_attempts(),
            default_currency: default_currency(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // TOURBOOK__DATABASE__URL=... sets database.url
            .add_source(config::Environment::with_prefix("TOURBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let raw = config::Config::builder()
            .set_override("server.port", 8080)
            .unwrap()
            .set_override("database.url", "postgres://localhost/test")
            .unwrap()
            .set_override("auth.jwt_secret", "secret")
            .unwrap()
            .build()
            .unwrap();
        let cfg: Config = raw.try_deserialize().unwrap();

        assert_eq!(cfg.database.backend, StoreBackend::Postgres);
        assert_eq!(cfg.database.max_connections, 5);
        assert!(cfg.database.run_migrations);
        assert_eq!(cfg.auth.jwt_expiration_seconds, 604_800);
        assert_eq!(cfg.auth.bcrypt_cost, 10);
        assert_eq!(cfg.business_rules.booking_number_prefix, "RSQ");
        assert_eq!(cfg.business_rules.default_currency, "USD");
    }

    #[test]
    fn test_memory_backend_parses() {
        let raw = config::Config::builder()
            .set_override("server.port", 3000)
            .unwrap()
            .set_override("database.url", "")
            .unwrap()
            .set_override("database.backend", "memory")
            .unwrap()
            .set_override("auth.jwt_secret", "secret")
            .unwrap()
            .build()
            .unwrap();
        let cfg: Config = raw.try_deserialize().unwrap();
        assert_eq!(cfg.database.backend, StoreBackend::Memory);
    }
}
