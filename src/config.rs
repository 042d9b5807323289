//! Runtime configuration
//!
//! Every value has a default; a TOML file only needs to name what it changes:
//!
//! ```toml
//! max_datagram_size = 1300
//!
//! [encoder]
//! wake_interval_ms = 5
//!
//! [playback]
//! channels = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration of the streaming core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Size of the buffer handed to `encoder_pop`
    pub max_datagram_size: usize,
    pub encoder: WorkerConfig,
    pub decoder: WorkerConfig,
    pub playback: PlaybackConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_DATAGRAM_SIZE,
            encoder: WorkerConfig::default(),
            decoder: WorkerConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.encoder.validate("encoder")?;
        self.decoder.validate("decoder")?;
        self.playback.validate()?;
        if self.max_datagram_size == 0 {
            return Err(Error::Config("max_datagram_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Settings of one periodic worker thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound between two passes when nothing signals the worker
    pub wake_interval_ms: u64,
    /// Overrides the worker's built-in thread name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            wake_interval_ms: DEFAULT_WAKE_INTERVAL_MS,
            thread_name: None,
        }
    }
}

impl WorkerConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }

    pub fn thread_name_or(&self, fallback: &str) -> String {
        self.thread_name
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }

    fn validate(&self, which: &str) -> Result<()> {
        if self.wake_interval_ms == 0 {
            return Err(Error::Config(format!(
                "{which}.wake_interval_ms must be non-zero"
            )));
        }
        Ok(())
    }
}

/// Format of decoded playback audio and sizing of its shared cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Audio requested by one render callback, in milliseconds
    pub callback_ms: u32,
    /// How many callbacks worth of audio the cache holds
    pub cache_multiplier: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            callback_ms: DEFAULT_CALLBACK_MS,
            cache_multiplier: DEFAULT_CACHE_MULTIPLIER,
        }
    }
}

impl PlaybackConfig {
    /// Interleaved samples one render callback asks for
    pub fn samples_per_callback(&self) -> usize {
        self.sample_rate as usize * self.callback_ms as usize / 1000 * self.channels as usize
    }

    /// Ring buffer capacity in samples
    pub fn cache_capacity(&self) -> usize {
        self.samples_per_callback() * self.cache_multiplier as usize
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(Error::Config(
                "playback sample_rate and channels must be non-zero".into(),
            ));
        }
        if self.callback_ms == 0 || self.cache_multiplier == 0 {
            return Err(Error::Config(
                "playback callback_ms and cache_multiplier must be non-zero".into(),
            ));
        }
        if self.samples_per_callback() == 0 {
            return Err(Error::Config(format!(
                "playback callback of {}ms at {}Hz holds no samples",
                self.callback_ms, self.sample_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.encoder.wake_interval(), Duration::from_millis(10));
        assert_eq!(config.decoder.thread_name_or("dispatch"), "dispatch");
        assert_eq!(config.playback.samples_per_callback(), 960);
        assert_eq!(config.playback.cache_capacity(), 1920);
        assert_eq!(config.max_datagram_size, 1300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_callback_size_at_44_1khz() {
        let playback = PlaybackConfig {
            sample_rate: 44100,
            channels: 2,
            callback_ms: 20,
            cache_multiplier: 2,
        };
        assert_eq!(playback.samples_per_callback(), 1764);
        assert_eq!(playback.cache_capacity(), 3528);

        let mono = PlaybackConfig {
            channels: 1,
            ..playback
        };
        assert_eq!(mono.samples_per_callback(), 882);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CoreConfig::from_toml_str(
            r#"
            [encoder]
            wake_interval_ms = 5
            thread_name = "mic-push"

            [playback]
            channels = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.encoder.wake_interval_ms, 5);
        assert_eq!(config.encoder.thread_name_or("push"), "mic-push");
        assert_eq!(config.decoder.wake_interval_ms, 10);
        assert_eq!(config.playback.cache_capacity(), 3840);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = CoreConfig::from_toml_str("[decoder]\nwake_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("decoder.wake_interval_ms"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CoreConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(CoreConfig::from_toml_str(&text).unwrap(), config);
    }
}
