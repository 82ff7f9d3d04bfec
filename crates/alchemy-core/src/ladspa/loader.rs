//! Plugin library loading and the process-wide library cache
//!
//! Libraries are opened once and cached by plugin label. A later load of the
//! same label reuses the cached library without touching the file system.
//! A library is cached only once the requested label was found in it.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_ulong;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use libloading::Library;

use super::effect::LadspaEffect;
use super::error::{PluginError, PluginResult};
use super::ffi::{LadspaDescriptor, LadspaDescriptorFn};

/// Cache of opened plugin libraries keyed by plugin label
static LIBRARY_CACHE: RwLock<Option<HashMap<String, Arc<PluginLibrary>>>> = RwLock::new(None);

/// An opened LADSPA library and its entry point
pub struct PluginLibrary {
    path: PathBuf,
    entry: LadspaDescriptorFn,
    // Must outlive `entry` and every descriptor it returned
    _library: Library,
}

// Descriptors are immutable static data of the library.
unsafe impl Send for PluginLibrary {}
unsafe impl Sync for PluginLibrary {}

impl PluginLibrary {
    /// Open `path` and resolve `ladspa_descriptor`
    pub fn open(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Err(PluginError::MissingBinary(path.to_path_buf()));
        }

        // SAFETY: loading runs the library's initializers; LADSPA libraries
        // are expected to be well-behaved shared objects
        let library = unsafe { Library::new(path) }?;
        let entry = unsafe {
            let symbol = library
                .get::<LadspaDescriptorFn>(b"ladspa_descriptor\0")
                .map_err(|_| PluginError::MissingEntry(path.to_path_buf()))?;
            *symbol
        };

        log::info!("[LADSPA] Opened {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            entry,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find the descriptor labelled `label`
    pub fn descriptor(&self, label: &str) -> Option<*const LadspaDescriptor> {
        find_descriptor(self.entry, label)
    }
}

/// Walk the entry point's descriptors until `label` matches or it returns null
pub(crate) fn find_descriptor(entry: LadspaDescriptorFn, label: &str) -> Option<*const LadspaDescriptor> {
    let mut index: c_ulong = 0;
    loop {
        // SAFETY: the entry point returns null or a valid descriptor
        let descriptor = unsafe { entry(index) };
        let desc = unsafe { descriptor.as_ref() }?;
        if !desc.label.is_null() {
            let candidate = unsafe { CStr::from_ptr(desc.label) };
            if candidate.to_bytes() == label.as_bytes() {
                return Some(descriptor);
            }
        }
        index += 1;
    }
}

/// Get a cached library by plugin label
pub fn cached_library(label: &str) -> Option<Arc<PluginLibrary>> {
    let cache = LIBRARY_CACHE.read().ok()?;
    let library = cache.as_ref()?.get(label)?;
    log::debug!("[LADSPA] Cache hit for {}", label);
    Some(library.clone())
}

fn register_library(label: &str, library: Arc<PluginLibrary>) {
    if let Ok(mut cache) = LIBRARY_CACHE.write() {
        cache
            .get_or_insert_with(HashMap::new)
            .insert(label.to_string(), library);
    }
}

/// Find `label` in the cached library, or open one with `open` and cache
/// it once the label resolved
fn resolve(
    label: &str,
    open: impl FnOnce() -> PluginResult<PluginLibrary>,
) -> PluginResult<(Arc<PluginLibrary>, *const LadspaDescriptor)> {
    let (library, cached) = match cached_library(label) {
        Some(library) => (library, true),
        None => (Arc::new(open()?), false),
    };

    let descriptor = library
        .descriptor(label)
        .ok_or_else(|| PluginError::LabelNotFound {
            path: library.path().to_path_buf(),
            label: label.to_string(),
        })?;

    if !cached {
        register_library(label, library.clone());
    }
    Ok((library, descriptor))
}

/// Load the plugin `label` from `path` and instantiate it
///
/// If a library was already cached for `label` it is reused and `path` is
/// not consulted.
pub fn load_effect(path: &Path, label: &str, sample_rate: u32) -> PluginResult<LadspaEffect> {
    let (library, descriptor) = resolve(label, || PluginLibrary::open(path))?;

    // SAFETY: the descriptor belongs to `library`, which the effect keeps alive
    unsafe { LadspaEffect::instantiate(descriptor, Some(library), sample_rate) }
}
