use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::format::AudioSettings;
use crate::MAX_HOST_SAMPLE_RATE_HZ;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio backend has no free voices")]
    NoFreeVoices,
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedRate(u32),
}

/// Backend-assigned handle for an open output voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceId(pub u32);

/// Per-voice stereo gain, 0..=255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputVolume {
    pub mute: bool,
    pub left: u8,
    pub right: u8,
}

impl Default for OutputVolume {
    fn default() -> Self {
        Self {
            mute: false,
            left: 255,
            right: 255,
        }
    }
}

/// Host audio output.
///
/// All methods are infallible except [`AudioBackend::open_out`]: a failed
/// open is reported to the caller, which is expected to carry on without an
/// active voice (the device retries on the next reconfiguring command).
pub trait AudioBackend {
    /// Open an output voice with the given format, or reconfigure `voice`
    /// in place if one is passed.
    fn open_out(
        &mut self,
        voice: Option<VoiceId>,
        name: &str,
        settings: AudioSettings,
    ) -> Result<VoiceId, AudioError>;

    fn close_out(&mut self, voice: VoiceId);

    /// Push guest-format PCM bytes; returns how many were accepted.
    fn write_out(&mut self, voice: VoiceId, bytes: &[u8]) -> usize;

    fn set_active_out(&mut self, voice: VoiceId, active: bool);

    fn set_volume_out(&mut self, voice: VoiceId, volume: OutputVolume);
}

/// Backend that accepts and discards everything. Useful for headless runs.
#[derive(Debug, Default)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn open_out(
        &mut self,
        voice: Option<VoiceId>,
        _name: &str,
        settings: AudioSettings,
    ) -> Result<VoiceId, AudioError> {
        if settings.freq == 0 || settings.freq > MAX_HOST_SAMPLE_RATE_HZ {
            return Err(AudioError::UnsupportedRate(settings.freq));
        }
        Ok(voice.unwrap_or(VoiceId(0)))
    }

    fn close_out(&mut self, _voice: VoiceId) {}

    fn write_out(&mut self, _voice: VoiceId, bytes: &[u8]) -> usize {
        bytes.len()
    }

    fn set_active_out(&mut self, _voice: VoiceId, _active: bool) {}

    fn set_volume_out(&mut self, _voice: VoiceId, _volume: OutputVolume) {}
}

#[derive(Debug)]
struct CaptureVoice {
    name: String,
    settings: AudioSettings,
    active: bool,
    volume: OutputVolume,
    data: Vec<u8>,
    opens: u32,
    closed: bool,
}

#[derive(Debug, Default)]
struct CaptureInner {
    voices: Vec<CaptureVoice>,
    accept_limit: Option<usize>,
    fail_opens: bool,
}

/// Recording backend for tests.
///
/// Cloning yields another handle to the same capture state, so a test can
/// hand one clone to the device and keep the other for assertions.
#[derive(Debug, Clone, Default)]
pub struct CaptureBackend {
    inner: Rc<RefCell<CaptureInner>>,
}

impl CaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many bytes each `write_out` call accepts. `None` accepts all.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        self.inner.borrow_mut().accept_limit = limit;
    }

    /// Makes subsequent `open_out` calls fail until cleared again.
    pub fn set_fail_opens(&self, fail: bool) {
        self.inner.borrow_mut().fail_opens = fail;
    }

    pub fn data(&self, voice: VoiceId) -> Vec<u8> {
        self.inner.borrow().voices[voice.0 as usize].data.clone()
    }

    pub fn name(&self, voice: VoiceId) -> String {
        self.inner.borrow().voices[voice.0 as usize].name.clone()
    }

    pub fn settings(&self, voice: VoiceId) -> AudioSettings {
        self.inner.borrow().voices[voice.0 as usize].settings
    }

    pub fn is_active(&self, voice: VoiceId) -> bool {
        self.inner.borrow().voices[voice.0 as usize].active
    }

    pub fn volume(&self, voice: VoiceId) -> OutputVolume {
        self.inner.borrow().voices[voice.0 as usize].volume
    }

    /// How many times the voice was opened or reconfigured.
    pub fn open_count(&self, voice: VoiceId) -> u32 {
        self.inner.borrow().voices[voice.0 as usize].opens
    }

    pub fn is_closed(&self, voice: VoiceId) -> bool {
        self.inner.borrow().voices[voice.0 as usize].closed
    }

    pub fn voice_count(&self) -> usize {
        self.inner.borrow().voices.len()
    }
}

impl AudioBackend for CaptureBackend {
    fn open_out(
        &mut self,
        voice: Option<VoiceId>,
        name: &str,
        settings: AudioSettings,
    ) -> Result<VoiceId, AudioError> {
        if settings.freq == 0 || settings.freq > MAX_HOST_SAMPLE_RATE_HZ {
            return Err(AudioError::UnsupportedRate(settings.freq));
        }
        let mut inner = self.inner.borrow_mut();
        if inner.fail_opens {
            return Err(AudioError::NoFreeVoices);
        }
        match voice {
            Some(id) => {
                let v = &mut inner.voices[id.0 as usize];
                v.settings = settings;
                v.opens += 1;
                v.closed = false;
                Ok(id)
            }
            None => {
                inner.voices.push(CaptureVoice {
                    name: name.to_owned(),
                    settings,
                    active: false,
                    volume: OutputVolume::default(),
                    data: Vec::new(),
                    opens: 1,
                    closed: false,
                });
                Ok(VoiceId(inner.voices.len() as u32 - 1))
            }
        }
    }

    fn close_out(&mut self, voice: VoiceId) {
        let mut inner = self.inner.borrow_mut();
        let v = &mut inner.voices[voice.0 as usize];
        v.closed = true;
        v.active = false;
    }

    fn write_out(&mut self, voice: VoiceId, bytes: &[u8]) -> usize {
        let mut inner = self.inner.borrow_mut();
        let n = inner.accept_limit.map_or(bytes.len(), |l| l.min(bytes.len()));
        let v = &mut inner.voices[voice.0 as usize];
        v.data.extend_from_slice(&bytes[..n]);
        n
    }

    fn set_active_out(&mut self, voice: VoiceId, active: bool) {
        self.inner.borrow_mut().voices[voice.0 as usize].active = active;
    }

    fn set_volume_out(&mut self, voice: VoiceId, volume: OutputVolume) {
        self.inner.borrow_mut().voices[voice.0 as usize].volume = volume;
    }
}
