//! Persisted option bundles
//!
//! Field names follow the JSON the stored bundles already use, so existing
//! stored data keeps deserializing. Unknown SDK options survive a
//! read/write cycle through the `extra` maps.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{HarnessError, HarnessResult};
use crate::sdk::RegisterOptions;

/// Default SIP host for the simple-user device
pub const DEFAULT_SIP_HOST: &str = "sip.telnyx.com";

/// Default SIP WebSocket port
pub const DEFAULT_SIP_PORT: &str = "7443";

/// Where the SDK writes its debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugOutput {
    #[default]
    Socket,
    File,
}

/// Options for the full SDK client
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    pub login: String,
    pub password: String,
    #[serde(rename = "login_token")]
    pub login_token: String,
    pub debug: bool,
    pub debug_output: DebugOutput,
    pub prefetch_ice_candidates: bool,
    pub force_relay_candidate: bool,
    pub trickle_ice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_connection_alive_on_socket_close: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtc_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtc_port: Option<u16>,
    /// Signalling host override, not persisted with the profile
    #[serde(skip)]
    pub host: Option<String>,
    /// SDK options this crate does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientOptions {
    /// Credential based options
    pub fn with_credentials(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Token based options
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            login_token: token.into(),
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_connection_alive_on_socket_close = Some(keep_alive);
        self
    }

    /// Login and password, or a login token
    pub fn has_valid_credentials(&self) -> bool {
        let credentials = !self.login.is_empty() && !self.password.is_empty();
        let token = !self.login_token.is_empty();
        credentials || token
    }

    pub fn keeps_calls_alive(&self) -> bool {
        self.keep_connection_alive_on_socket_close.unwrap_or(false)
    }
}

/// Options for the SIP simple-user device
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimpleUserClientOptions {
    pub host: String,
    pub port: String,
    pub ws_servers: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub registrar_server: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SimpleUserClientOptions {
    /// Defaults pointing at `host`
    pub fn for_host(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_SIP_PORT.to_string(),
            ws_servers: format!("wss://{host}:{DEFAULT_SIP_PORT}"),
            username: String::new(),
            password: String::new(),
            display_name: "Phone User".to_string(),
            registrar_server: format!("sip:{host}:{DEFAULT_SIP_PORT}"),
            extra: Map::new(),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn has_valid_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Check the server addresses are usable
    pub fn validate(&self) -> HarnessResult<()> {
        if self.host.trim().is_empty() {
            return Err(HarnessError::config("SIP host is required"));
        }
        for server in parse_server_list(&self.ws_servers) {
            let url = Url::parse(&server)
                .map_err(|e| HarnessError::config(format!("invalid WebSocket server '{server}': {e}")))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(HarnessError::config(format!(
                    "WebSocket server '{server}' must use ws:// or wss://"
                )));
            }
        }
        if !self.registrar_server.is_empty() && !self.registrar_server.starts_with("sip:") {
            return Err(HarnessError::config(format!(
                "registrar '{}' must be a sip: URI",
                self.registrar_server
            )));
        }
        Ok(())
    }
}

impl Default for SimpleUserClientOptions {
    fn default() -> Self {
        Self::for_host(DEFAULT_SIP_HOST)
    }
}

impl fmt::Debug for SimpleUserClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleUserClientOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ws_servers", &self.ws_servers)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("registrar_server", &self.registrar_server)
            .finish()
    }
}

/// Dialer settings of the SIP device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimpleUserCallOptions {
    pub destination_number: String,
    /// Raw `Name: value` lines sent with REGISTER
    pub extra_headers: Vec<String>,
    /// Register as soon as the WebSocket connects
    pub auto_register: bool,
}

impl SimpleUserCallOptions {
    /// Register options built from the extra headers
    pub fn register_options(&self) -> RegisterOptions {
        RegisterOptions {
            extra_headers: self
                .extra_headers
                .iter()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect(),
        }
    }

    /// Replace the headers from newline separated text
    pub fn set_extra_headers_from_text(&mut self, text: &str) {
        self.extra_headers = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
    }
}

/// Deployment environment of the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

/// How the SDK client authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    #[default]
    Credentials,
    Token,
    Anonymous,
}

/// Split a list of servers separated by commas and/or whitespace
pub fn parse_server_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credentials_or_token_are_required() {
        assert!(!ClientOptions::default().has_valid_credentials());
        assert!(!ClientOptions::with_credentials("alice", "").has_valid_credentials());
        assert!(ClientOptions::with_credentials("alice", "secret").has_valid_credentials());
        assert!(ClientOptions::with_token("jwt").has_valid_credentials());
    }

    #[test]
    fn client_options_use_stored_field_names() {
        let options = ClientOptions::with_token("jwt").with_keep_alive(true);
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["login_token"], json!("jwt"));
        assert_eq!(value["debugOutput"], json!("socket"));
        assert_eq!(value["keepConnectionAliveOnSocketClose"], json!(true));
        assert!(value.get("host").is_none());
    }

    #[test]
    fn unknown_sdk_options_are_preserved() {
        let options: ClientOptions =
            serde_json::from_value(json!({"login": "bob", "ringtoneFile": "ring.mp3"})).unwrap();
        assert_eq!(options.login, "bob");
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["ringtoneFile"], json!("ring.mp3"));
    }

    #[test]
    fn simple_user_defaults_point_at_the_sip_host() {
        let options = SimpleUserClientOptions::default();
        assert_eq!(options.ws_servers, "wss://sip.telnyx.com:7443");
        assert_eq!(options.registrar_server, "sip:sip.telnyx.com:7443");
        assert_eq!(options.display_name, "Phone User");
        assert!(options.validate().is_ok());
        assert!(!options.has_valid_credentials());
    }

    #[test]
    fn invalid_servers_fail_validation() {
        let mut options = SimpleUserClientOptions::default();
        options.ws_servers = "https://sip.example.com".to_string();
        assert!(options.validate().is_err());

        let mut options = SimpleUserClientOptions::default();
        options.registrar_server = "sip.example.com".to_string();
        assert!(options.validate().is_err());
    }

    #[test]
    fn server_lists_split_on_commas_and_whitespace() {
        assert_eq!(
            parse_server_list("stun:a.example.com, stun:b.example.com\nstun:c.example.com,,"),
            vec!["stun:a.example.com", "stun:b.example.com", "stun:c.example.com"]
        );
        assert!(parse_server_list(" , ").is_empty());
    }

    #[test]
    fn extra_headers_come_from_text_lines() {
        let mut options = SimpleUserCallOptions::default();
        options.set_extra_headers_from_text("X-One: 1\n\n  X-Two: 2  ");
        assert_eq!(options.register_options().extra_headers, vec!["X-One: 1", "X-Two: 2"]);
    }
}
