//! LADSPA plugin hosting
//!
//! [`load_effect`] opens a plugin library (cached process-wide by label),
//! finds the descriptor with the requested label and wraps a fresh instance
//! in a [`LadspaEffect`].

mod effect;
mod error;
pub mod ffi;
mod loader;

pub use effect::LadspaEffect;
pub use error::{PluginError, PluginResult};
pub use loader::{cached_library, load_effect, PluginLibrary};
