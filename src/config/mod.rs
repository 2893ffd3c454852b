use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub calendar: CalendarConfig,
    pub invitations: InvitationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Apply the bundled schema when the server starts
    pub auto_migrate: bool,
    /// Serve from the in-memory store when DATABASE_URL is absent
    pub allow_memory_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Upper bound on postponement chain traversal
    pub max_chain_depth: usize,
    pub max_postponement_reason_len: usize,
    pub max_title_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationConfig {
    pub case_invitation_ttl_days: i64,
    pub system_invitation_ttl_days: i64,
}

const DEV_JWT_SECRET: &str = "casebook-development-secret";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_AUTO_MIGRATE") {
            self.database.auto_migrate = v.parse().unwrap_or(self.database.auto_migrate);
        }
        if let Ok(v) = env::var("DATABASE_ALLOW_MEMORY_FALLBACK") {
            self.database.allow_memory_fallback = v.parse().unwrap_or(self.database.allow_memory_fallback);
        }

        // API overrides (PORT kept for container platforms)
        if let Some(port) = env::var("CASEBOOK_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // Calendar overrides
        if let Ok(v) = env::var("CALENDAR_MAX_CHAIN_DEPTH") {
            self.calendar.max_chain_depth = v.parse().unwrap_or(self.calendar.max_chain_depth);
        }
        if let Ok(v) = env::var("CALENDAR_MAX_POSTPONEMENT_REASON_LEN") {
            self.calendar.max_postponement_reason_len =
                v.parse().unwrap_or(self.calendar.max_postponement_reason_len);
        }

        // Invitation overrides
        if let Ok(v) = env::var("INVITATIONS_CASE_TTL_DAYS") {
            self.invitations.case_invitation_ttl_days =
                v.parse().unwrap_or(self.invitations.case_invitation_ttl_days);
        }
        if let Ok(v) = env::var("INVITATIONS_SYSTEM_TTL_DAYS") {
            self.invitations.system_invitation_ttl_days =
                v.parse().unwrap_or(self.invitations.system_invitation_ttl_days);
        }

        self
    }

    fn shared_calendar() -> CalendarConfig {
        CalendarConfig {
            max_chain_depth: 64,
            max_postponement_reason_len: 1000,
            max_title_len: 300,
        }
    }

    fn shared_invitations() -> InvitationConfig {
        InvitationConfig {
            case_invitation_ttl_days: 14,
            system_invitation_ttl_days: 7,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                auto_migrate: true,
                allow_memory_fallback: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
            calendar: Self::shared_calendar(),
            invitations: Self::shared_invitations(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                auto_migrate: true,
                allow_memory_fallback: false,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
            calendar: Self::shared_calendar(),
            invitations: Self::shared_invitations(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                auto_migrate: false,
                allow_memory_fallback: false,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
            calendar: Self::shared_calendar(),
            invitations: Self::shared_invitations(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.database.allow_memory_fallback);
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.calendar.max_chain_depth, 64);
        assert_eq!(config.invitations.case_invitation_ttl_days, 14);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.database.allow_memory_fallback);
        assert!(!config.database.auto_migrate);
        // production must be given a secret through JWT_SECRET
        assert!(config.security.jwt_secret.is_empty());
        assert_eq!(config.invitations.system_invitation_ttl_days, 7);
    }

    #[test]
    fn jwt_secret_is_not_serialized() {
        let value = serde_json::to_value(AppConfig::development()).unwrap();
        assert!(value["security"].get("jwt_secret").is_none());
    }
}
