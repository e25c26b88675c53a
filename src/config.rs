//! Configuration for decoding and tree presentation
//!
//! Every field has a serde default so a partial TOML file (or none at all)
//! yields a working configuration.
//!
//! # Example TOML
//! ```toml
//! channel_capacity = 64
//!
//! [decoder]
//! two_timestamps = true
//! charset = "iso-8859-1"
//!
//! [tree]
//! max_chain_depth = 2
//! ```

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Character set of `lstring` fields in the event buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Charset {
    /// UTF-8, invalid sequences replaced with U+FFFD
    #[default]
    #[serde(rename = "utf-8")]
    #[value(name = "utf-8")]
    Utf8,
    /// ISO-8859-1, one byte per char
    #[serde(rename = "iso-8859-1")]
    #[value(name = "iso-8859-1")]
    Latin1,
}

impl Charset {
    /// Decode raw string bytes
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Encode a string for the wire (chars outside Latin-1 become `?`)
    pub fn encode(self, s: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => s.as_bytes().to_vec(),
            Charset::Latin1 => s
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Session-wide wire settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Timestamps carry a CPU-time stamp after the wall-clock stamp
    pub two_timestamps: bool,

    /// Charset of thread and class names
    pub charset: Charset,
}

/// Presentation tree settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// How many levels of transitive peer detail a detail node may expand
    pub max_chain_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_chain_depth: 3 }
    }
}

fn default_channel_capacity() -> usize {
    32
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockgraphConfig {
    pub decoder: DecoderConfig,

    pub tree: TreeConfig,

    /// Buffers queued ahead of the decoder thread before `submit` blocks
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for LockgraphConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            tree: TreeConfig::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl LockgraphConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            TraceError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(TraceError::Config(
                "channel_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
