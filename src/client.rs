//! Process-wide shared client.
//!
//! The first call constructs the client from configuration; later calls
//! return that instance and ignore their argument.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::backend::PostgrestClient;
use crate::config::ClientConfig;
use crate::error::RowlensResult;

static SHARED: RwLock<Option<Arc<PostgrestClient>>> = RwLock::new(None);

/// Get the shared PostgREST client, constructing it on first use.
///
/// Fails with a configuration error when credentials are missing. A failed
/// construction is not cached.
pub fn shared_client(config: &ClientConfig) -> RowlensResult<Arc<PostgrestClient>> {
    if let Some(client) = SHARED.read().as_ref() {
        return Ok(Arc::clone(client));
    }

    let mut slot = SHARED.write();
    if let Some(client) = slot.as_ref() {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(PostgrestClient::new(config)?);
    debug!("initialized shared client");
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

/// Drop the shared client so the next [`shared_client`] call rebuilds it.
pub fn reset_shared_client() {
    SHARED.write().take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RowlensError;

    fn config(url: &str) -> ClientConfig {
        ClientConfig::builder().url(url).anon_key("anon").build()
    }

    // Single test so parallel test threads never race on the global.
    #[test]
    fn test_shared_client_lifecycle() {
        reset_shared_client();

        let err = shared_client(&ClientConfig::default()).unwrap_err();
        assert!(matches!(err, RowlensError::Config(_)));

        let first = shared_client(&config("https://one.example.co")).unwrap();
        let second = shared_client(&config("https://two.example.co")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.rest_url(), "https://one.example.co/rest/v1");

        reset_shared_client();
        let third = shared_client(&config("https://two.example.co")).unwrap();
        assert_eq!(third.rest_url(), "https://two.example.co/rest/v1");

        reset_shared_client();
    }
}
