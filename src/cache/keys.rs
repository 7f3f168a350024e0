//! Cache key builders
//!
//! Keys are versioned so a format change never reads stale entries.

use std::fmt;

const VERSION: &str = "v1";

pub mod rate_limit {
    use super::*;

    /// Counter for one client within one rate-limit scope
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct WindowKey {
        scope: String,
        client: String,
    }

    impl WindowKey {
        pub fn new(scope: &str, client: &str) -> Self {
            Self {
                scope: scope.to_string(),
                client: client.to_string(),
            }
        }
    }

    impl fmt::Display for WindowKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:ratelimit:{}:{}", VERSION, self.scope, self.client)
        }
    }
}

pub mod payment {
    use super::*;

    /// Last gateway status answer for an order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct GatewayStatusKey {
        order_number: String,
    }

    impl GatewayStatusKey {
        pub fn new(order_number: &str) -> Self {
            Self {
                order_number: order_number.to_string(),
            }
        }

        pub fn prefix() -> String {
            format!("{}:payment:gateway_status:", VERSION)
        }
    }

    impl fmt::Display for GatewayStatusKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}{}", Self::prefix(), self.order_number)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(
            rate_limit::WindowKey::new("callback", "10.0.0.1").to_string(),
            "v1:ratelimit:callback:10.0.0.1"
        );
        assert_eq!(
            payment::GatewayStatusKey::new("ORD-5").to_string(),
            "v1:payment:gateway_status:ORD-5"
        );
        assert!(payment::GatewayStatusKey::new("ORD-5")
            .to_string()
            .starts_with(&payment::GatewayStatusKey::prefix()));
    }
}
