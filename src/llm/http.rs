use arc_swap::ArcSwap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Build the HTTP client shared by all provider adapters.
pub fn build_provider_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// HTTP client handle owned by one adapter instance.
///
/// Constructed on first use and replaced wholesale by [`reset`], so stale
/// connection pools (e.g. after a credential rotation) are discarded without
/// any ambient global state.
#[derive(Debug)]
pub struct ResettableClient {
    inner: ArcSwap<Client>,
}

impl ResettableClient {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(build_provider_client()),
        }
    }

    pub fn get(&self) -> Arc<Client> {
        self.inner.load_full()
    }

    /// Swap in a freshly built client.
    pub fn reset(&self) {
        self.inner.store(Arc::new(build_provider_client()));
    }
}

impl Default for ResettableClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_replaces_the_handle() {
        let handle = ResettableClient::new();
        let before = handle.get();
        handle.reset();
        let after = handle.get();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn get_returns_same_handle_until_reset() {
        let handle = ResettableClient::new();
        assert!(Arc::ptr_eq(&handle.get(), &handle.get()));
    }
}
