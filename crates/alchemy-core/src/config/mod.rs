//! Server configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/alchemy/server.yaml
//!
//! ```ignore
//! use alchemy_core::config::{load_config, default_config_path, ServerConfig};
//!
//! let config: ServerConfig = load_config(&default_config_path("server.yaml"));
//! ```

mod io;
mod paths;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::ProcessSettings;
use crate::types::{StreamId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, default_ladspa_path, CONFIG_FILE};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Processing sample rate in Hz
    pub sample_rate: u32,
    /// Frames per processing buffer
    pub buffer_size: usize,
    /// Width of the effect chain (1 = mono, 2 = stereo)
    pub input_channels: usize,
    /// Byte terminating each message on stream transports
    pub delimiter: char,
    /// How long `START` waits for audio before failing
    pub start_timeout_ms: u64,
    /// `SCHED_FIFO` priority of the processing thread; `null` disables
    pub realtime_priority: Option<i32>,
    /// Capture stream selected at startup
    pub input: Option<StreamSelection>,
    /// Playback stream selected at startup
    pub output: Option<StreamSelection>,
    /// Effect catalog replacing the built-in one
    pub effects_catalog: Option<PathBuf>,
    /// Directories searched for LADSPA plugin files
    pub ladspa_path: Vec<PathBuf>,
    pub drivers: DriverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            input_channels: 1,
            delimiter: '\n',
            start_timeout_ms: 2000,
            realtime_priority: Some(70),
            input: None,
            output: None,
            effects_catalog: None,
            ladspa_path: default_ladspa_path(),
            drivers: DriverConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Delimiter as a byte; non-ASCII delimiters fall back to `\n`
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            log::warn!(
                "[CONFIG] Delimiter {:?} is not ASCII, using newline",
                self.delimiter
            );
            b'\n'
        }
    }

    /// Settings for the processing thread
    pub fn process_settings(&self) -> ProcessSettings {
        ProcessSettings {
            frames: self.buffer_size,
            sample_rate: self.sample_rate,
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            realtime_priority: self.realtime_priority,
        }
    }
}

/// A stream addressed by device name and stream id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSelection {
    pub device: String,
    pub stream: StreamId,
}

/// Which driver backends to enable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Hardware devices through cpal
    pub cpal: bool,
    /// The built-in virtual device (test signals, null output)
    #[serde(rename = "virtual")]
    pub virtual_device: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cpal: true,
            virtual_device: true,
        }
    }
}
