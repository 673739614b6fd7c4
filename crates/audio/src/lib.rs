//! Host audio output interface.
//!
//! The device model emits guest-format PCM through the [`AudioBackend`]
//! trait. The trait is intentionally small to make it easy to bridge the
//! device to different hosts:
//! - an in-memory capture buffer (unit tests)
//! - a real mixing/output backend owned by the embedder
//!
//! Backends pull: when a voice has free buffer space the embedder notifies
//! the device, which in turn runs its DMA engine and pushes bytes back via
//! [`AudioBackend::write_out`].

mod backend;
mod format;

pub use backend::{AudioBackend, AudioError, CaptureBackend, NullBackend, OutputVolume, VoiceId};
pub use format::{AudioSettings, SampleFormat};

/// Upper bound for negotiated sample rates; opens above this are rejected so
/// backends can size internal buffers from it.
pub const MAX_HOST_SAMPLE_RATE_HZ: u32 = 384_000;
