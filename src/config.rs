//! Configuration for a turnstile server

use serde::Deserialize;
use serde::Serialize;
use std::net::SocketAddr;

/// Configuration for a turnstile server.
///
/// This type implements [`serde::Deserialize`] and [`serde::Serialize`] so it
/// can be composed with the consumer's configuration, whatever format that's
/// in.  For example, a consumer could define a `MyAppConfig` for an app that
/// embeds a turnstile server:
///
/// ```
/// use serde::Deserialize;
/// use turnstile::ConfigTurnstile;
///
/// #[derive(Deserialize)]
/// struct MyAppConfig {
///     api_server: ConfigTurnstile,
///     /* ... (other app-specific config) */
/// }
///
/// fn main() -> Result<(), String> {
///     let my_config: MyAppConfig = toml::from_str(
///         r##"
///             [api_server]
///             bind_address = "127.0.0.1:12345"
///             request_body_max_bytes = 1024
///         "##,
///     )
///     .map_err(|error| format!("parsing config: {}", error))?;
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigTurnstile {
    /// IP address and TCP port to which to bind for accepting connections
    pub bind_address: SocketAddr,
    /// maximum allowed size of a request body, defaults to 1024
    pub request_body_max_bytes: usize,
}

impl Default for ConfigTurnstile {
    fn default() -> Self {
        ConfigTurnstile {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            request_body_max_bytes: 1024,
        }
    }
}

#[cfg(test)]
mod test {
    use super::ConfigTurnstile;

    #[test]
    fn test_config_defaults() {
        let config = ConfigTurnstile::default();
        assert_eq!(config.request_body_max_bytes, 1024);
        assert_eq!(config.bind_address.port(), 0);
    }

    #[test]
    fn test_config_from_toml() {
        let config: ConfigTurnstile = toml::from_str(
            r#"
            bind_address = "10.1.2.3:4567"
            request_body_max_bytes = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "10.1.2.3:4567".parse().unwrap());
        assert_eq!(config.request_body_max_bytes, 1048576);
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let config: ConfigTurnstile =
            toml::from_str(r#"bind_address = "0.0.0.0:8080""#).unwrap();
        assert_eq!(config.request_body_max_bytes, 1024);
    }
}
