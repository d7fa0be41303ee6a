//! Configuration loading/saving shared by the channel, session and server
//! layers, plus the wire/service limits a listener applies to every
//! connection it accepts.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use uasc_types::{ApplicationDescription, DecodingOptions, LocalizedText, UAString};

/// Error returned from saving or loading a [`Config`] object.
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration failed `validate()`, with a list of human-readable
    /// complaints.
    Invalid(Vec<String>),
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(errors) => write!(f, "invalid configuration: {}", errors.join(", ")),
            ConfigError::Io(e) => write!(f, "io error: {e}"),
            ConfigError::Yaml(e) => write!(f, "yaml error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and save a configuration object as YAML, with validation run before
/// every save so a broken config is never persisted.
pub trait Config: Serialize {
    fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Err(errors) = self.validate() {
            return Err(ConfigError::Invalid(errors));
        }
        let yaml = serde_yaml::to_string(self)?;
        let mut file = File::create(path)?;
        file.write_all(yaml.as_bytes())?;
        Ok(())
    }

    fn load<A>(path: &Path) -> Result<A, ConfigError>
    where
        for<'de> A: Config + Deserialize<'de>,
    {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn validate(&self) -> Result<(), Vec<String>>;

    fn application_name(&self) -> UAString;
    fn application_uri(&self) -> UAString;
    fn product_uri(&self) -> UAString;

    fn discovery_urls(&self) -> Option<Vec<UAString>> {
        None
    }

    fn application_description(&self) -> ApplicationDescription {
        ApplicationDescription {
            application_uri: self.application_uri(),
            application_name: LocalizedText::new("", self.application_name().as_ref()),
            application_type: 0,
            product_uri: self.product_uri(),
            gateway_server_uri: UAString::null(),
            discovery_profile_uri: UAString::null(),
            discovery_urls: self.discovery_urls(),
        }
    }
}

/// Decoding and handshake limits a listener applies uniformly to every
/// channel it accepts. Scoped down from the server's full limits table to
/// what the chunk layer and the HEL/ACK handshake actually enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLimits {
    #[serde(default = "defaults::max_array_length")]
    pub max_array_length: usize,
    #[serde(default = "defaults::max_string_length")]
    pub max_string_length: usize,
    #[serde(default = "defaults::max_byte_string_length")]
    pub max_byte_string_length: usize,
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "defaults::max_chunk_count")]
    pub max_chunk_count: usize,
    #[serde(default = "defaults::send_buffer_size")]
    pub send_buffer_size: usize,
    #[serde(default = "defaults::receive_buffer_size")]
    pub receive_buffer_size: usize,
    /// Time a client has to send HELLO before the listener drops the
    /// connection.
    #[serde(default = "defaults::hello_timeout_ms")]
    pub hello_timeout_ms: u64,
    /// Sessions beyond this count are rejected with `BadTooManySessions`.
    #[serde(default = "defaults::max_sessions")]
    pub max_sessions: usize,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            max_array_length: defaults::max_array_length(),
            max_string_length: defaults::max_string_length(),
            max_byte_string_length: defaults::max_byte_string_length(),
            max_message_size: defaults::max_message_size(),
            max_chunk_count: defaults::max_chunk_count(),
            send_buffer_size: defaults::send_buffer_size(),
            receive_buffer_size: defaults::receive_buffer_size(),
            hello_timeout_ms: defaults::hello_timeout_ms(),
            max_sessions: defaults::max_sessions(),
        }
    }
}

impl ChannelLimits {
    pub fn to_decoding_options(&self, decoding_depth_gauge: std::sync::Arc<uasc_types::DepthGauge>) -> DecodingOptions {
        DecodingOptions {
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            max_string_length: self.max_string_length,
            max_byte_string_length: self.max_byte_string_length,
            max_array_length: self.max_array_length,
            decoding_depth_gauge,
        }
    }
}

mod defaults {
    pub fn max_array_length() -> usize {
        1_000_000
    }
    pub fn max_string_length() -> usize {
        128 * 1024
    }
    pub fn max_byte_string_length() -> usize {
        128 * 1024 * 1024
    }
    pub fn max_message_size() -> usize {
        64 * 1024 * 1024
    }
    pub fn max_chunk_count() -> usize {
        5_000
    }
    pub fn send_buffer_size() -> usize {
        64 * 1024
    }
    pub fn receive_buffer_size() -> usize {
        64 * 1024
    }
    pub fn hello_timeout_ms() -> u64 {
        5_000
    }
    pub fn max_sessions() -> usize {
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_round_trip_through_yaml() {
        let limits = ChannelLimits::default();
        let yaml = serde_yaml::to_string(&limits).unwrap();
        let decoded: ChannelLimits = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(limits, decoded);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let decoded: ChannelLimits = serde_yaml::from_str("max_sessions: 7\n").unwrap();
        assert_eq!(decoded.max_sessions, 7);
        assert_eq!(decoded.max_message_size, defaults::max_message_size());
    }
}
