use std::future::Future;
use std::time::Duration;

use crate::shared::error::{InfraError, TicketError};

/// Runs one collaborator call under `limit`. A missed deadline becomes a
/// recoverable `InfraError::Timeout` naming what was being done.
pub async fn bounded<T, E, F>(limit: Duration, what: &str, fut: F) -> Result<T, TicketError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<TicketError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(InfraError::Timeout(what.to_string()).into()),
    }
}

/// Normalises a channel name the way the platform would: lowercase, spaces
/// to dashes, at most 100 characters.
pub fn sanitize_channel_name(raw: &str) -> String {
    let mut name: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if name.chars().count() > 100 {
        name = name.chars().take(100).collect();
    }

    name
}
