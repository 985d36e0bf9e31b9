//! Shared helpers for CLI commands.

use organizer_core::{Config, Database, GoogleCalendarProvider};

pub fn open_database() -> Result<Database, Box<dyn std::error::Error>> {
    Ok(Database::open()?)
}

/// Build the provider client from config. The token comes from
/// `ORGANIZER_API_TOKEN` or `provider.access_token`; there is no refresh
/// flow here.
pub fn build_provider(config: &Config) -> Result<GoogleCalendarProvider, Box<dyn std::error::Error>> {
    let token = config.provider_token().ok_or(
        "no provider access token configured; set ORGANIZER_API_TOKEN or provider.access_token in config.toml",
    )?;
    Ok(match &config.provider.base_url {
        Some(base_url) => GoogleCalendarProvider::with_base_url(token, base_url),
        None => GoogleCalendarProvider::new(token),
    })
}
