//! Client-side authentication plugin contract.

use async_trait::async_trait;
use serde_json::Value;

/// A client-installed authentication plugin, supplying credentials attached
/// to every outgoing request.
#[async_trait]
pub trait ClientAuthPlugin: Send + Sync {
    /// Produce the opaque credentials value attached to `RequestEnvelope::credentials`.
    async fn provide_credentials(&self) -> Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticToken(&'static str);

    #[async_trait]
    impl ClientAuthPlugin for StaticToken {
        async fn provide_credentials(&self) -> Value {
            serde_json::json!({"token": self.0})
        }
    }

    #[tokio::test]
    async fn provides_the_configured_token() {
        let plugin = StaticToken("abc123");
        let credentials = plugin.provide_credentials().await;
        assert_eq!(credentials["token"], "abc123");
    }
}
