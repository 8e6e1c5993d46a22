//! Noise-suppression engines behind a narrow create/process/destroy seam.
//!
//! - [`NativeRnnoise`]: `librnnoise.so` located at runtime on a search path
//! - [`BuiltinRnnoise`]: the pure-Rust port of RNNoise
//!
//! Engine buffers are in the PCM16 numeric range, one channel per state.
//! Destroying a state is dropping it.

use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use libloading::Library;

/// RNNoise processes 10ms frames at 48kHz.
pub const RNNOISE_FRAME_SIZE: usize = 480;

/// A noise-suppression engine able to create per-channel states.
pub trait SuppressionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Samples per channel the engine consumes on each call.
    fn frame_len(&self) -> usize;

    fn create_state(&self) -> Result<Box<dyn ChannelState>>;
}

/// Per-channel engine state. Carries noise estimates across calls.
pub trait ChannelState: Send {
    /// `input` and `output` are both `frame_len()` long. Returns the
    /// engine's voice-activity confidence.
    fn process(&mut self, output: &mut [f32], input: &[f32]) -> Result<f32>;
}

// ======================== Native librnnoise ========================

/// Opaque type for DenoiseState
#[repr(C)]
pub struct DenoiseState {
    _private: [u8; 0],
}

type CreateFn = unsafe extern "C" fn(model: *mut c_void) -> *mut DenoiseState;
type DestroyFn = unsafe extern "C" fn(st: *mut DenoiseState);
type ProcessFrameFn =
    unsafe extern "C" fn(st: *mut DenoiseState, out: *mut f32, input: *const f32) -> f32;

struct RnnoiseApi {
    create: CreateFn,
    destroy: DestroyFn,
    process_frame: ProcessFrameFn,
    // Keeps the function pointers above valid.
    _lib: Library,
}

/// RNNoise loaded from a shared library found at runtime.
pub struct NativeRnnoise {
    api: Arc<RnnoiseApi>,
    path: String,
}

impl NativeRnnoise {
    /// Load the first existing library among `search_paths`.
    pub fn locate(search_paths: &[String]) -> Result<Self> {
        let path = search_paths
            .iter()
            .find(|p| Path::new(p).exists())
            .with_context(|| format!("librnnoise not found in {:?}", search_paths))?;
        Self::load(path)
    }

    pub fn load(path: &str) -> Result<Self> {
        let api = unsafe {
            let lib = Library::new(path)
                .with_context(|| format!("Failed to load RNNoise library '{}'", path))?;
            let create = *lib
                .get::<CreateFn>(b"rnnoise_create\0")
                .context("Missing symbol rnnoise_create")?;
            let destroy = *lib
                .get::<DestroyFn>(b"rnnoise_destroy\0")
                .context("Missing symbol rnnoise_destroy")?;
            let process_frame = *lib
                .get::<ProcessFrameFn>(b"rnnoise_process_frame\0")
                .context("Missing symbol rnnoise_process_frame")?;
            RnnoiseApi {
                create,
                destroy,
                process_frame,
                _lib: lib,
            }
        };
        log::info!("Loaded RNNoise from {}", path);
        Ok(Self {
            api: Arc::new(api),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SuppressionEngine for NativeRnnoise {
    fn name(&self) -> &str {
        "rnnoise"
    }

    fn frame_len(&self) -> usize {
        RNNOISE_FRAME_SIZE
    }

    fn create_state(&self) -> Result<Box<dyn ChannelState>> {
        // NULL model selects the built-in weights
        let state = unsafe { (self.api.create)(std::ptr::null_mut()) };
        if state.is_null() {
            anyhow::bail!("rnnoise_create returned NULL");
        }
        Ok(Box::new(NativeState {
            api: self.api.clone(),
            state,
        }))
    }
}

struct NativeState {
    api: Arc<RnnoiseApi>,
    state: *mut DenoiseState,
}

// DenoiseState is only used from the audio thread that owns it
unsafe impl Send for NativeState {}

impl ChannelState for NativeState {
    fn process(&mut self, output: &mut [f32], input: &[f32]) -> Result<f32> {
        if input.len() != RNNOISE_FRAME_SIZE || output.len() != RNNOISE_FRAME_SIZE {
            anyhow::bail!(
                "RNNoise needs {} samples, got in={} out={}",
                RNNOISE_FRAME_SIZE,
                input.len(),
                output.len()
            );
        }
        let vad = unsafe { (self.api.process_frame)(self.state, output.as_mut_ptr(), input.as_ptr()) };
        Ok(vad)
    }
}

impl Drop for NativeState {
    fn drop(&mut self) {
        unsafe {
            (self.api.destroy)(self.state);
        }
    }
}

// ======================== Built-in (pure Rust) ========================

/// RNNoise compiled into the binary; never missing.
pub struct BuiltinRnnoise;

impl SuppressionEngine for BuiltinRnnoise {
    fn name(&self) -> &str {
        "builtin"
    }

    fn frame_len(&self) -> usize {
        nnnoiseless::DenoiseState::FRAME_SIZE
    }

    fn create_state(&self) -> Result<Box<dyn ChannelState>> {
        Ok(Box::new(BuiltinState {
            state: nnnoiseless::DenoiseState::new(),
        }))
    }
}

struct BuiltinState {
    state: Box<nnnoiseless::DenoiseState<'static>>,
}

impl ChannelState for BuiltinState {
    fn process(&mut self, output: &mut [f32], input: &[f32]) -> Result<f32> {
        let frame = nnnoiseless::DenoiseState::FRAME_SIZE;
        if input.len() != frame || output.len() != frame {
            anyhow::bail!("builtin RNNoise needs {} samples", frame);
        }
        Ok(self.state.process_frame(output, input))
    }
}

// ======================== Engine selection ========================

/// Resolve the configured engine. `None` means pass-through: a missing
/// engine is logged, never fatal.
pub fn load_engine(kind: &str, search_paths: &[String]) -> Option<Arc<dyn SuppressionEngine>> {
    match kind.to_ascii_lowercase().as_str() {
        "rnnoise" | "native" => match NativeRnnoise::locate(search_paths) {
            Ok(engine) => {
                log::info!("Using native RNNoise engine ({})", engine.path());
                Some(Arc::new(engine))
            }
            Err(e) => {
                log::warn!("{:#}. Running in pass-through mode", e);
                log::info!("To build RNNoise: git clone https://github.com/xiph/rnnoise.git && ./autogen.sh && ./configure && make");
                None
            }
        },
        "builtin" => {
            log::info!("Using built-in RNNoise engine");
            Some(Arc::new(BuiltinRnnoise))
        }
        "none" | "off" => {
            log::info!("Noise suppression engine disabled by configuration");
            None
        }
        other => {
            log::warn!("Unknown suppression engine '{}', running in pass-through mode", other);
            None
        }
    }
}
