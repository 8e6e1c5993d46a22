//! audio - Real-time capture, noise suppression and playback
//!
//! Uses ALSA for duplex audio I/O and RNNoise (native library or the
//! built-in port) for per-channel noise suppression.

mod alsa_device;
mod backend;
pub mod frame;
mod pipeline;
mod queue;
mod suppressor;
mod transform;

pub use alsa_device::AlsaBackend;
pub use backend::StreamParams;
#[cfg(test)]
pub use backend::{AudioBackend, DuplexStream};
pub use pipeline::{AudioPipeline, report_stats};
pub use queue::{DeliveryReceiver, delivery_queue};
pub use suppressor::load_engine;
