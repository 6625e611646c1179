use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{IdentityError, Result};

pub const DEFAULT_ACCESS_TTL: &str = "15m";
pub const DEFAULT_REFRESH_TTL: &str = "7d";
pub const DEFAULT_ROLE_SELECTION_TTL: &str = "5m";
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Upper bound for any token lifetime, in days
pub const MAX_TOKEN_TTL_DAYS: i64 = 365;

/// Signing secrets and lifetimes for the three token classes
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub role_selection_ttl: Duration,
}

impl TokenConfig {
    /// Build a config with default lifetimes
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Result<Self> {
        let config = Self {
            access_secret: SecretString::new(access_secret.into()),
            refresh_secret: SecretString::new(refresh_secret.into()),
            access_ttl: parse_duration(DEFAULT_ACCESS_TTL)?,
            refresh_ttl: parse_duration(DEFAULT_REFRESH_TTL)?,
            role_selection_ttl: parse_duration(DEFAULT_ROLE_SELECTION_TTL)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// The two secrets must both be set and must differ, otherwise one token class could forge the other
    pub fn validate(&self) -> Result<()> {
        let access = self.access_secret.expose_secret();
        let refresh = self.refresh_secret.expose_secret();

        if access.is_empty() || refresh.is_empty() {
            return Err(IdentityError::Config("token secrets must not be empty".to_string()));
        }
        if access == refresh {
            return Err(IdentityError::Config(
                "access and refresh secrets must be different".to_string(),
            ));
        }
        if self.access_ttl <= Duration::zero()
            || self.refresh_ttl <= Duration::zero()
            || self.role_selection_ttl <= Duration::zero()
        {
            return Err(IdentityError::Config("token lifetimes must be positive".to_string()));
        }
        let max = Duration::days(MAX_TOKEN_TTL_DAYS);
        if self.access_ttl > max || self.refresh_ttl > max || self.role_selection_ttl > max {
            return Err(IdentityError::Config(format!(
                "token lifetimes must not exceed {MAX_TOKEN_TTL_DAYS}d"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub tokens: TokenConfig,
    pub bcrypt_cost: u32,
}

impl IdentityConfig {
    pub fn new(tokens: TokenConfig) -> Self {
        Self {
            tokens,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| IdentityError::Config(format!("{key} is not set")))
        };
        let duration = |key: &str, default: &str| {
            let raw = lookup(key).unwrap_or_else(|| default.to_string());
            parse_duration(&raw).map_err(|_| IdentityError::Config(format!("{key} has invalid duration '{raw}'")))
        };

        let tokens = TokenConfig {
            access_secret: SecretString::new(required("JWT_ACCESS_SECRET")?),
            refresh_secret: SecretString::new(required("JWT_REFRESH_SECRET")?),
            access_ttl: duration("JWT_ACCESS_EXPIRES_IN", DEFAULT_ACCESS_TTL)?,
            refresh_ttl: duration("JWT_REFRESH_EXPIRES_IN", DEFAULT_REFRESH_TTL)?,
            role_selection_ttl: duration("ROLE_SELECTION_EXPIRES_IN", DEFAULT_ROLE_SELECTION_TTL)?,
        };
        tokens.validate()?;

        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|cost| (4..=31).contains(cost))
                .ok_or_else(|| IdentityError::Config(format!("BCRYPT_COST must be between 4 and 31, got '{raw}'")))?,
            None => DEFAULT_BCRYPT_COST,
        };

        Ok(Self { tokens, bcrypt_cost })
    }
}

/// Parse `<int>[s|m|h|d]`, e.g. `15m` or `7d`
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let invalid = || IdentityError::Config(format!("invalid duration '{raw}'"));
    let raw = raw.trim();

    let unit = raw.chars().last().ok_or_else(invalid)?;
    let digits = raw.get(..raw.len() - unit.len_utf8()).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let value: i64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };

    let seconds = value.checked_mul(multiplier).ok_or_else(invalid)?;
    Duration::try_seconds(seconds).ok_or_else(invalid)
}
