//! HTTP Client Factory
//!
//! Builds reqwest clients with proxy and timeout settings. Shared by the LLM
//! provider, the Datadog collector and the chat-history backend client.

use std::time::Duration;

use ops_reasoner_core::error::{CoreError, CoreResult};
use ops_reasoner_core::proxy::ProxyConfig;

/// Build a `reqwest::Client` with the resolved proxy configuration.
///
/// - `Some(proxy)` -> configure proxy on the client
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(
    proxy: Option<&ProxyConfig>,
    timeout: Duration,
) -> CoreResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    match proxy {
        Some(cfg) => {
            let url = cfg.url();
            let mut p = reqwest::Proxy::all(&url)
                .map_err(|e| CoreError::config(format!("invalid proxy url {}: {}", url, e)))?;
            if let (Some(u), Some(pw)) = (&cfg.username, &cfg.password) {
                p = p.basic_auth(u, pw);
            }
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder
        .build()
        .map_err(|e| CoreError::internal(format!("failed to build http client: {}", e)))
}
