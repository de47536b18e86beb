//! Credential sources for the database connection
//!
//! Credentials are resolved once at the process boundary and handed to the
//! sink; the pipeline never sees them. The secret is a [`SecretString`], so
//! `Debug` output and logs show `[REDACTED]`.

use imdb_common::{IngestError, Result};
use inquire::{Password, PasswordDisplayMode, Text};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: SecretString,
}

/// Supplies connection credentials for the sink
pub trait CredentialSource {
    fn credentials(&self) -> Result<Credentials>;
}

/// Reads `IMDB_DB_USER` and `IMDB_DB_PASSWORD`
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    pub host: String,
    pub port: u16,
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let user = std::env::var("IMDB_DB_USER")
            .map_err(|_| IngestError::config("IMDB_DB_USER not set (use --prompt to enter it)"))?;
        let secret = std::env::var("IMDB_DB_PASSWORD").map_err(|_| {
            IngestError::config("IMDB_DB_PASSWORD not set (use --prompt to enter it)")
        })?;

        Ok(Credentials {
            host: self.host.clone(),
            port: self.port,
            user,
            secret: SecretString::from(secret),
        })
    }
}

/// Asks for the user name and a masked password on the terminal
#[derive(Debug, Clone)]
pub struct PromptCredentials {
    pub host: String,
    pub port: u16,
}

impl CredentialSource for PromptCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let prompt_error =
            |e: inquire::InquireError| IngestError::config(format!("Credential prompt failed: {}", e));

        let user = Text::new("Username:").prompt().map_err(prompt_error)?;
        let secret = Password::new("Enter password:")
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Masked)
            .prompt()
            .map_err(prompt_error)?;

        Ok(Credentials {
            host: self.host.clone(),
            port: self.port,
            user,
            secret: SecretString::from(secret),
        })
    }
}
