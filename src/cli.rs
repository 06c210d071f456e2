//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::rate_limit::{DEFAULT_LOGIN_PER_MINUTE, DEFAULT_SIGNUP_PER_MINUTE, RateLimitConfig};
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "slotbook",
    about = "Appointment scheduling API with access and refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SLOTBOOK_PORT", default_value = "3333")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "SLOTBOOK_DATABASE", default_value = "slotbook.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// bcrypt cost for password hashes
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST, value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Login attempts allowed per minute per IP
    #[arg(long, default_value_t = DEFAULT_LOGIN_PER_MINUTE)]
    pub login_rate: u32,

    /// Signups allowed per minute per IP
    #[arg(long, default_value_t = DEFAULT_SIGNUP_PER_MINUTE)]
    pub signup_rate: u32,

    /// Key rate limits on X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: called during startup before the runtime spawns any task
        // that could read the environment.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(&secret).then_some(secret)
}

fn validate_jwt_secret(secret: &str) -> bool {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return false;
    }
    true
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: Some(jwt_secret.into_bytes()),
        bcrypt_cost: args.bcrypt_cost,
        rate_limit: RateLimitConfig::new(args.login_rate, args.signup_rate, args.trust_forwarded),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["slotbook"]);
        assert_eq!(args.port, 3333);
        assert_eq!(args.login_rate, DEFAULT_LOGIN_PER_MINUTE);
        assert_eq!(args.signup_rate, DEFAULT_SIGNUP_PER_MINUTE);
        assert_eq!(args.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(!args.trust_forwarded);
    }

    #[test]
    fn test_bcrypt_cost_range() {
        assert!(Args::try_parse_from(["slotbook", "--bcrypt-cost", "3"]).is_err());
        let args = Args::try_parse_from(["slotbook", "--bcrypt-cost", "4"]).unwrap();
        assert_eq!(args.bcrypt_cost, 4);
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(!validate_jwt_secret("too-short"));
        assert!(validate_jwt_secret(&"x".repeat(MIN_JWT_SECRET_LENGTH)));
    }
}
