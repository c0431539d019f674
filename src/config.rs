use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Secret used when `JWT_SECRET` is unset outside production
const DEV_JWT_SECRET: &str = "deelbreaker-dev-secret";

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Group-buy pricing rules
#[derive(Debug, Clone)]
pub struct GroupBuyConfig {
    /// Additional discount taken off the current price when the target is reached
    pub break_discount: Decimal,
    /// Whole-unit retries of a join after a transient store failure
    pub join_max_retries: u32,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub group_buy: GroupBuyConfig,
    pub log_level: String,
    pub http_port: u16,
    pub ws_port: Option<u16>,
    pub jwt_secret: String,
    pub environment: String,
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let acquire_timeout_secs = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_secs = env::var("DATABASE_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(600); // 10 minutes

        let max_lifetime_secs = env::var("DATABASE_MAX_LIFETIME_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1800); // 30 minutes

        let test_before_acquire = env::var("DATABASE_TEST_BEFORE_ACQUIRE")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/deelbreaker".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl GroupBuyConfig {
    /// Create group-buy rules from environment variables
    pub fn from_env() -> Result<Self, String> {
        let break_discount = match env::var("GROUP_BUY_BREAK_DISCOUNT") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .map_err(|e| format!("Invalid GROUP_BUY_BREAK_DISCOUNT: {}", e))?,
            Err(_) => Self::default().break_discount,
        };

        let join_max_retries = env::var("JOIN_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3);

        let config = Self {
            break_discount,
            join_max_retries,
        };
        config.validate()?;
        Ok(config)
    }

    /// The discount must leave a positive price behind
    pub fn validate(&self) -> Result<(), String> {
        if self.break_discount <= Decimal::ZERO || self.break_discount >= Decimal::ONE {
            return Err(format!(
                "GROUP_BUY_BREAK_DISCOUNT must be between 0 and 1 (exclusive), got {}",
                self.break_discount
            ));
        }
        Ok(())
    }
}

impl Default for GroupBuyConfig {
    fn default() -> Self {
        Self {
            break_discount: Decimal::new(20, 2), // 0.20
            join_max_retries: 3,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let group_buy = GroupBuyConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let http_port = env::var("HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3000);

        let ws_port = env::var("WS_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }
        let environment = environment.to_lowercase();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "production" => {
                return Err("JWT_SECRET environment variable is required in production".to_string());
            }
            _ => DEV_JWT_SECRET.to_string(),
        };

        if ws_port == Some(http_port) {
            return Err("WS_PORT must differ from HTTP_PORT".to_string());
        }

        Ok(Self {
            database,
            group_buy,
            log_level: log_level.to_lowercase(),
            http_port,
            ws_port,
            jwt_secret,
            environment,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            group_buy: GroupBuyConfig::default(),
            log_level: "info".to_string(),
            http_port: 3000,
            ws_port: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            environment: "development".to_string(),
        }
    }
}
