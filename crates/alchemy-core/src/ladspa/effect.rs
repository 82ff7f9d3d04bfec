//! Hosted LADSPA plugin instance
//!
//! Audio ports become [`Port`]s and control ports become [`Param`]s. Each
//! control port is connected once, at instantiation, to its own `f32` cell;
//! input cells are refreshed from the parameter values before every `run`
//! and output cells are read back afterwards.

use std::ffi::CStr;
use std::os::raw::{c_char, c_ulong};
use std::sync::Arc;

use super::error::{PluginError, PluginResult};
use super::ffi::{
    ControlRange, LadspaDescriptor, LadspaHandle, PORT_AUDIO, PORT_CONTROL, PORT_INPUT, PORT_OUTPUT,
};
use super::loader::PluginLibrary;
use crate::effect::{delegate_to_base, Effect, EffectBase, EffectInfo, Param, ParamId, Port, ProcessContext};
use crate::types::{Sample, MAX_BUFFER_SIZE};

/// A control port bound to a parameter
#[derive(Debug, Clone, Copy)]
struct ControlBinding {
    param: ParamId,
    output: bool,
}

/// An instantiated LADSPA plugin
pub struct LadspaEffect {
    base: EffectBase,
    descriptor: *const LadspaDescriptor,
    handle: LadspaHandle,
    audio_inputs: Vec<c_ulong>,
    audio_outputs: Vec<c_ulong>,
    controls: Vec<ControlBinding>,
    /// One cell per entry of `controls`; never reallocated after connect
    cells: Box<[f32]>,
    silence: Vec<Sample>,
    scratch: Vec<Sample>,
    active: bool,
    _library: Option<Arc<PluginLibrary>>,
}

// The plugin handle is only ever touched through `&mut self`.
unsafe impl Send for LadspaEffect {}

/// Read a C string field, treating null as empty
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

impl LadspaEffect {
    /// Instantiate the plugin described by `descriptor`
    ///
    /// # Safety
    /// `descriptor` must point to a valid descriptor that outlives the
    /// returned effect. `library`, when given, keeps its code loaded.
    pub unsafe fn instantiate(
        descriptor: *const LadspaDescriptor,
        library: Option<Arc<PluginLibrary>>,
        sample_rate: u32,
    ) -> PluginResult<Self> {
        let desc = descriptor
            .as_ref()
            .ok_or_else(|| PluginError::InvalidDescriptor("null descriptor".into()))?;
        let label = c_str(desc.label);

        let (Some(instantiate), Some(connect_port), Some(_run)) =
            (desc.instantiate, desc.connect_port, desc.run)
        else {
            return Err(PluginError::InvalidDescriptor(format!(
                "{} lacks instantiate, connect_port or run",
                label
            )));
        };
        if desc.port_count > 0
            && (desc.port_descriptors.is_null() || desc.port_range_hints.is_null())
        {
            return Err(PluginError::InvalidDescriptor(format!("{} has no port table", label)));
        }

        let name = match c_str(desc.name) {
            n if n.is_empty() => label.clone(),
            n => n,
        };
        let mut info = EffectInfo::new(name, "plugin", sample_rate);
        let mut audio_inputs = Vec::new();
        let mut audio_outputs = Vec::new();
        let mut controls = Vec::new();
        let mut control_ports = Vec::new();

        for index in 0..desc.port_count {
            let flags = *desc.port_descriptors.add(index as usize);
            let port_name = if desc.port_names.is_null() {
                format!("Port {}", index)
            } else {
                c_str(*desc.port_names.add(index as usize))
            };
            let input = flags & PORT_INPUT != 0;
            if flags & PORT_OUTPUT == 0 && !input {
                return Err(PluginError::InvalidDescriptor(format!(
                    "{}: port {} has no direction",
                    label, index
                )));
            }

            if flags & PORT_AUDIO != 0 {
                if input {
                    info = info.with_port(Port::input(port_name));
                    audio_inputs.push(index);
                } else {
                    info = info.with_port(Port::output(port_name));
                    audio_outputs.push(index);
                }
            } else if flags & PORT_CONTROL != 0 {
                let range = ControlRange::from_hint(&*desc.port_range_hints.add(index as usize), sample_rate);
                let mut param = Param::new(port_name, range.default)
                    .with_range(range.min, range.max)
                    .with_kind(range.kind);
                if range.logarithmic {
                    param = param.logarithmic();
                }
                controls.push(ControlBinding {
                    param: info.params.len() as ParamId,
                    output: !input,
                });
                control_ports.push(index);
                info = info.with_param(param);
            }
        }

        let handle = instantiate(descriptor, sample_rate as c_ulong);
        if handle.is_null() {
            return Err(PluginError::InstantiateFailed(label));
        }

        let base = EffectBase::new(info);
        let mut cells: Box<[f32]> = controls
            .iter()
            .map(|c| base.value(c.param))
            .collect();
        for (cell, port) in cells.iter_mut().zip(&control_ports) {
            connect_port(handle, *port, cell as *mut f32);
        }

        log::debug!(
            "[LADSPA] Instantiated {} ({} in, {} out, {} controls)",
            label,
            audio_inputs.len(),
            audio_outputs.len(),
            controls.len()
        );

        Ok(Self {
            base,
            descriptor,
            handle,
            audio_inputs,
            audio_outputs,
            controls,
            cells,
            silence: vec![0.0; MAX_BUFFER_SIZE],
            scratch: vec![0.0; MAX_BUFFER_SIZE],
            active: false,
            _library: library,
        })
    }

    fn desc(&self) -> &LadspaDescriptor {
        // SAFETY: checked non-null at instantiation and kept alive by `_library`
        unsafe { &*self.descriptor }
    }
}

delegate_to_base!(LadspaEffect);

impl Effect for LadspaEffect {
    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let frames = ctx.frames.min(MAX_BUFFER_SIZE);
        let desc = self.desc();
        let (Some(connect_port), Some(run)) = (desc.connect_port, desc.run) else {
            return;
        };

        for (cell, binding) in self.cells.iter_mut().zip(&self.controls) {
            if !binding.output {
                *cell = self.base.value(binding.param);
            }
        }

        // SAFETY: every buffer holds at least `frames` samples and outlives `run`
        unsafe {
            for (i, port) in self.audio_inputs.iter().enumerate() {
                let data = match ctx.inputs.get(i) {
                    Some(buffer) => buffer.as_ptr() as *mut f32,
                    None => self.silence.as_mut_ptr(),
                };
                connect_port(self.handle, *port, data);
            }
            for (i, port) in self.audio_outputs.iter().enumerate() {
                let data = match ctx.outputs.get_mut(i) {
                    Some(buffer) => buffer.as_mut_ptr(),
                    None => self.scratch.as_mut_ptr(),
                };
                connect_port(self.handle, *port, data);
            }
            run(self.handle, frames as c_ulong);
        }

        for (cell, binding) in self.cells.iter().zip(&self.controls) {
            if binding.output {
                self.base.store_raw(binding.param, *cell as f64);
            }
        }
    }

    fn activate(&mut self) {
        if self.active {
            return;
        }
        if let Some(activate) = self.desc().activate {
            // SAFETY: handle is live until drop
            unsafe { activate(self.handle) };
        }
        self.active = true;
    }

    fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        if let Some(deactivate) = self.desc().deactivate {
            // SAFETY: handle is live until drop
            unsafe { deactivate(self.handle) };
        }
        self.active = false;
    }
}

impl Drop for LadspaEffect {
    fn drop(&mut self) {
        self.deactivate();
        if let Some(cleanup) = self.desc().cleanup {
            // SAFETY: the handle is not used after this point
            unsafe { cleanup(self.handle) };
        }
    }
}
