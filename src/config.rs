// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub otp_expiry_seconds: i64,
    pub otp_code_length: usize,
    pub sweep_interval_seconds: u64,
    pub pending_expiration_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "stepupdb".to_string()),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .expect("PORT must be a number"),
            otp_expiry_seconds: env_or("OTP_EXPIRY_SECONDS", 120),
            otp_code_length: env_or("OTP_CODE_LENGTH", 6),
            sweep_interval_seconds: env_or("SWEEP_INTERVAL_SECONDS", 60),
            pending_expiration_minutes: env_or("PENDING_EXPIRATION_MINUTES", 5),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_missing_or_garbage() {
        assert_eq!(env_or("DEFINITELY_NOT_SET_12345", 120i64), 120);
        std::env::set_var("STEPUP_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("STEPUP_TEST_GARBAGE", 60u64), 60);
        std::env::remove_var("STEPUP_TEST_GARBAGE");
    }
}
