//! Environment-based process configuration.

use anyhow::{Context, Result};
use tally_model::DEFAULT_ROUND_DURATION_HOURS;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub amqp_url: String,
    /// Voting window applied at round creation. The window itself is fixed
    /// per round; only its length is configurable here.
    pub round_duration_hours: i64,
}

impl Config {
    /// Loads configuration from the environment, reading a `.env` file
    /// first when one exists.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a TCP port number")?;

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let amqp_url = std::env::var("AMQP_URL").context("AMQP_URL must be set")?;

        let round_duration_hours = match std::env::var("ROUND_DURATION_HOURS") {
            Ok(value) => {
                let hours = value
                    .parse::<i64>()
                    .context("ROUND_DURATION_HOURS must be a number of hours")?;
                anyhow::ensure!(hours > 0, "ROUND_DURATION_HOURS must be positive");
                hours
            }
            Err(_) => DEFAULT_ROUND_DURATION_HOURS,
        };

        Ok(Self {
            port,
            database_url,
            amqp_url,
            round_duration_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they
    // cannot race each other.
    #[test]
    fn loads_from_env_with_defaults() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/tally");
        std::env::set_var("AMQP_URL", "amqp://localhost:5672");
        std::env::remove_var("PORT");
        std::env::remove_var("ROUND_DURATION_HOURS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.round_duration_hours, DEFAULT_ROUND_DURATION_HOURS);

        std::env::set_var("ROUND_DURATION_HOURS", "48");
        let config = Config::from_env().unwrap();
        assert_eq!(config.round_duration_hours, 48);

        std::env::set_var("ROUND_DURATION_HOURS", "0");
        assert!(Config::from_env().is_err());
        std::env::remove_var("ROUND_DURATION_HOURS");
    }
}
