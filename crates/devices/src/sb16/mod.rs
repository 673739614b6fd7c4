//! Sound Blaster 16 model: DSP command interpreter, DMA streaming engine,
//! ADPCM codec and the CT1745 mixer register bank.
//!
//! The card is a plain state machine. The embedder routes port accesses in
//! through [`Sb16::io_write`] / [`Sb16::io_read`], pumps DMA transfers via
//! [`Sb16::dma_read`] / [`Sb16::dma_write`] whenever [`Sb16::dreq_level`] is
//! up, feeds host buffer space through [`Sb16::audio_callback`] and calls
//! [`Sb16::poll`] to service the pending-IRQ timer.

use blaster_audio::{AudioBackend, AudioSettings, SampleFormat, VoiceId};
use log::{debug, warn};

use crate::clock::Clock;
use crate::fm::FmChip;
use crate::irq::IrqSink;

mod adpcm;
mod dma;
mod dsp;
mod mixer;
mod state;

pub use state::Sb16State;

use adpcm::AdpcmDecoder;
use dsp::ByteStack;

pub(super) const SAMPLE_RATE_MIN: i32 = 5000;
pub(super) const SAMPLE_RATE_MAX: i32 = 49716;
pub(super) const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Card wiring, fixed at construction (the guest can later move the IRQ and
/// DMA channels through mixer registers 0x80/0x81).
#[derive(Debug, Clone, Copy)]
pub struct Sb16Config {
    pub version: u16,
    pub irq: u8,
    pub dma8: u8,
    pub dma16: u8,
}

impl Default for Sb16Config {
    fn default() -> Self {
        Self {
            version: 0x0405,
            irq: 5,
            dma8: 1,
            dma16: 5,
        }
    }
}

pub struct Sb16<B: AudioBackend, C: Clock> {
    backend: B,
    clock: C,

    ver: u16,
    irq: u8,
    dma: u8,
    hdma: u8,

    // DSP command state
    cmd: Option<u8>,
    needed_bytes: usize,
    in_data: ByteStack<10>,
    out_data: ByteStack<50>,
    test_reg: u8,
    last_read_byte: u8,
    reset_seq: u8,
    can_write: bool,
    highspeed: bool,

    // negotiated transfer format
    fmt: SampleFormat,
    fmt_bits: u8,
    fmt_signed: bool,
    fmt_stereo: bool,
    freq: i32,
    time_const: Option<u8>,
    block_size: i32,
    fifo: bool,
    dma_auto: bool,
    use_hdma: bool,
    align: i32,
    bytes_per_second: i32,

    // streaming state
    speaker: bool,
    left_till_irq: i32,
    dma_running: bool,
    audio_free: i32,
    voice: Option<VoiceId>,
    dreq: [bool; 8],

    adpcm: AdpcmDecoder,

    // CSP (ASP) shadow registers
    csp_param: u8,
    csp_value: u8,
    csp_mode: u8,
    csp_regs: [u8; 256],
    csp_reg83: [u8; 4],
    csp_reg83r: u32,
    csp_reg83w: u32,

    e2_val_add: u8,
    e2_val_xor: u8,

    mixer_index: u8,
    mixer_regs: [u8; 256],

    fm: Option<Box<dyn FmChip>>,

    silence_deadline_ns: Option<u64>,
}

impl<B: AudioBackend, C: Clock> Sb16<B, C> {
    pub fn new(cfg: Sb16Config, backend: B, clock: C) -> Self {
        let mut s = Self {
            backend,
            clock,
            ver: cfg.version,
            irq: cfg.irq,
            dma: cfg.dma8,
            hdma: cfg.dma16,
            cmd: None,
            needed_bytes: 0,
            in_data: ByteStack::new(),
            out_data: ByteStack::new(),
            test_reg: 0,
            last_read_byte: 0,
            reset_seq: 0,
            can_write: true,
            highspeed: false,
            fmt: SampleFormat::U8,
            fmt_bits: 0,
            fmt_signed: false,
            fmt_stereo: false,
            freq: 0,
            time_const: Some(0),
            block_size: 0,
            fifo: false,
            dma_auto: false,
            use_hdma: false,
            align: 0,
            bytes_per_second: 0,
            speaker: false,
            left_till_irq: 0,
            dma_running: false,
            audio_free: 0,
            voice: None,
            dreq: [false; 8],
            adpcm: AdpcmDecoder::default(),
            csp_param: 0,
            csp_value: 0,
            csp_mode: 0,
            csp_regs: [0; 256],
            csp_reg83: [0; 4],
            csp_reg83r: 0,
            csp_reg83w: 0,
            e2_val_add: 0,
            e2_val_xor: 0,
            mixer_index: 0,
            mixer_regs: [0; 256],
            fm: None,
            silence_deadline_ns: None,
        };
        s.csp_regs[5] = 1;
        s.csp_regs[9] = 0xf8;
        s.mixer_regs[0x80] = mixer::magic_of_irq(s.irq);
        s.mixer_regs[0x81] = (1 << s.dma) | (1 << s.hdma);
        s.mixer_regs[0x82] = 0;
        s.reset_mixer();
        s
    }

    /// Handle a write to one of the card's I/O ports, `offset` relative to
    /// the card base (0x220 on real hardware).
    pub fn io_write(&mut self, offset: u8, val: u8, sink: &mut impl IrqSink) {
        match offset {
            0x04 => self.mixer_index = val,
            0x05 => self.mixer_write(val),
            0x06 => self.reset_port_write(val, sink),
            0x0c => self.dsp_command_write(val, sink),
            _ => debug!("sb16: dropped write of {val:#04x} to offset {offset:#04x}"),
        }
    }

    /// Handle a read from one of the card's I/O ports.
    pub fn io_read(&mut self, offset: u8, sink: &mut impl IrqSink) -> u8 {
        match offset {
            0x05 => self.mixer_regs[self.mixer_index as usize],
            0x06 => 0xff,
            0x0a => match self.out_data.pop() {
                Some(v) => {
                    self.last_read_byte = v;
                    v
                }
                None => {
                    if let Some(cmd) = self.cmd {
                        warn!("sb16: empty response buffer for command {cmd:#04x}");
                    }
                    self.last_read_byte
                }
            },
            0x0c => {
                if self.can_write {
                    0
                } else {
                    0x80
                }
            }
            0x0d => 0,
            0x0e => {
                let ret = if self.out_data.is_empty() || self.highspeed {
                    0
                } else {
                    0x80
                };
                if self.mixer_regs[0x82] & 1 != 0 {
                    self.mixer_regs[0x82] &= !1;
                    sink.lower_irq(self.irq);
                }
                ret
            }
            0x0f => {
                if self.mixer_regs[0x82] & 2 != 0 {
                    self.mixer_regs[0x82] &= !2;
                    sink.lower_irq(self.irq);
                }
                0xff
            }
            _ => {
                warn!("sb16: read from unmapped offset {offset:#04x}");
                0xff
            }
        }
    }

    // Port 0x06 is a tiny state machine: 0x01 (or 0x03) then 0x00 resets,
    // 0xc6 disarms, 0xb8 resets unconditionally and 0x39 replies 0x38
    // before resetting.
    fn reset_port_write(&mut self, val: u8, sink: &mut impl IrqSink) {
        match val {
            0x00 => {
                if self.reset_seq == 1 {
                    self.reset(sink);
                }
                self.reset_seq = 0;
            }
            0x01 | 0x03 => self.reset_seq = 1,
            0xc6 => self.reset_seq = 0,
            0xb8 => self.reset(sink),
            0x39 => {
                self.respond(0x38);
                self.reset(sink);
                self.reset_seq = 0x39;
            }
            _ => self.reset_seq = val,
        }
    }

    fn reset(&mut self, sink: &mut impl IrqSink) {
        sink.lower_irq(self.irq);
        if self.dma_auto {
            sink.pulse_irq(self.irq);
        }

        self.mixer_regs[0x82] = 0;
        self.dma_auto = false;
        self.in_data.clear();
        self.out_data.clear();
        self.left_till_irq = 0;
        self.needed_bytes = 0;
        self.block_size = -1;
        self.highspeed = false;
        self.reset_seq = 0;
        self.cmd = None;
        self.silence_deadline_ns = None;

        self.e2_val_add = 0xaa;
        self.e2_val_xor = 0x96;
        self.respond(0xaa);
        self.set_speaker(false);
        self.control(false);
        self.legacy_reset();
    }

    // Back to the power-on output format: unsigned 8-bit mono at 11025 Hz.
    fn legacy_reset(&mut self) {
        self.freq = 11025;
        self.fmt_signed = false;
        self.fmt_bits = 8;
        self.fmt_stereo = false;
        self.fmt = SampleFormat::U8;
        self.audio_free = 0;
        self.open_voice(11025, 1, SampleFormat::U8);
    }

    pub(super) fn open_voice(&mut self, freq: u32, channels: u8, fmt: SampleFormat) {
        let settings = AudioSettings {
            freq,
            channels,
            fmt,
        };
        match self.backend.open_out(self.voice, "sb16", settings) {
            Ok(v) => {
                self.voice = Some(v);
                self.update_voice_volume();
            }
            Err(err) => {
                warn!("sb16: failed to open output voice: {err}");
                self.voice = None;
            }
        }
    }

    pub(super) fn set_speaker(&mut self, on: bool) {
        self.speaker = on;
    }

    /// Start or stop the active DMA session: hold or release the request
    /// line and (de)activate the host voice.
    pub(super) fn control(&mut self, hold: bool) {
        let nchan = self.active_channel() as usize & 7;
        self.dma_running = hold;
        if hold {
            if let Some(v) = self.voice {
                self.backend.set_active_out(v, true);
            }
        } else {
            self.dreq[nchan] = false;
            if let Some(v) = self.voice {
                self.backend.set_active_out(v, false);
            }
        }
    }

    pub(super) fn active_channel(&self) -> u8 {
        if self.use_hdma {
            self.hdma
        } else {
            self.dma
        }
    }

    /// Host buffer space notification: record the byte budget and assert the
    /// DMA request so the controller pulls the next chunk.
    pub fn audio_callback(&mut self, free_bytes: usize) {
        self.audio_free = free_bytes.min(i32::MAX as usize) as i32;
        if self.dma_running {
            self.dreq[self.active_channel() as usize & 7] = true;
        }
    }

    /// Level of the DMA request line for `chan`.
    pub fn dreq_level(&self, chan: u8) -> bool {
        self.dreq[chan as usize & 7]
    }

    /// Fire the armed pending-IRQ timer if its deadline has passed.
    pub fn poll(&mut self, sink: &mut impl IrqSink) {
        if let Some(deadline) = self.silence_deadline_ns {
            if self.clock.now_ns() >= deadline {
                self.silence_deadline_ns = None;
                self.can_write = true;
                sink.raise_irq(self.irq);
            }
        }
    }

    pub fn irq_line(&self) -> u8 {
        self.irq
    }

    pub fn dma8_channel(&self) -> u8 {
        self.dma
    }

    pub fn dma16_channel(&self) -> u8 {
        self.hdma
    }

    pub fn attach_fm(&mut self, chip: Box<dyn FmChip>) {
        self.fm = Some(chip);
        self.update_fm_volume();
    }

    pub fn detach_fm(&mut self) -> Option<Box<dyn FmChip>> {
        self.fm.take()
    }

    // Adlib-compatible decode: at the card's own FM range the low nibble
    // selects the register bank, elsewhere only the low two bits do.
    fn fm_index(port: u16) -> u8 {
        let mut a = (port & 3) as u8;
        if port & 0xf00 != 0x300 {
            match port & 0xf {
                8 => a = 0,
                9 => a = 1,
                _ => {}
            }
        }
        a
    }

    pub fn fm_write(&mut self, port: u16, val: u8) {
        let index = Self::fm_index(port);
        if let Some(fm) = self.fm.as_mut() {
            fm.write(index, val);
        }
    }

    pub fn fm_read(&mut self, port: u16) -> u8 {
        let index = Self::fm_index(port);
        match self.fm.as_mut() {
            Some(fm) => fm.read(index),
            None => 0xff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fm::{FmEvent, FmRecorder};
    use crate::irq::IrqRecorder;
    use blaster_audio::CaptureBackend;

    fn card() -> (Sb16<CaptureBackend, ManualClock>, CaptureBackend, ManualClock) {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        let sb = Sb16::new(Sb16Config::default(), backend.clone(), clock.clone());
        (sb, backend, clock)
    }

    pub(crate) fn reset_card(
        sb: &mut Sb16<CaptureBackend, ManualClock>,
        sink: &mut IrqRecorder,
    ) {
        sb.io_write(0x06, 1, sink);
        sb.io_write(0x06, 0, sink);
    }

    #[test]
    fn two_step_reset_replies_ready_and_reopens_the_voice() {
        let (mut sb, backend, _clock) = card();
        let mut sink = IrqRecorder::new();

        reset_card(&mut sb, &mut sink);

        // data-available flag up, then the ready byte
        assert_eq!(sb.io_read(0x0e, &mut sink) & 0x80, 0x80);
        assert_eq!(sb.io_read(0x0a, &mut sink), 0xaa);

        let settings = backend.settings(VoiceId(0));
        assert_eq!(settings.freq, 11025);
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.fmt, SampleFormat::U8);
    }

    #[test]
    fn disarmed_reset_sequence_does_nothing() {
        let (mut sb, _backend, _clock) = card();
        let mut sink = IrqRecorder::new();

        sb.io_write(0x06, 1, &mut sink);
        sb.io_write(0x06, 0xc6, &mut sink);
        sb.io_write(0x06, 0, &mut sink);

        assert_eq!(sb.io_read(0x0e, &mut sink), 0);
    }

    #[test]
    fn magic_reset_value_replies_before_the_ready_byte() {
        let (mut sb, _backend, _clock) = card();
        let mut sink = IrqRecorder::new();

        sb.io_write(0x06, 0x39, &mut sink);

        // 0x38 went in first but the reset cleared it; only 0xaa survives.
        assert_eq!(sb.io_read(0x0a, &mut sink), 0xaa);
        assert!(sb.out_data.is_empty());
    }

    #[test]
    fn speaker_status_tracks_speaker_commands() {
        let (mut sb, _backend, _clock) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);
        sb.io_read(0x0a, &mut sink);

        sb.io_write(0x0c, 0xd1, &mut sink);
        sb.io_write(0x0c, 0xd8, &mut sink);
        assert_eq!(sb.io_read(0x0a, &mut sink), 0xff);

        sb.io_write(0x0c, 0xd3, &mut sink);
        sb.io_write(0x0c, 0xd8, &mut sink);
        assert_eq!(sb.io_read(0x0a, &mut sink), 0x00);
    }

    #[test]
    fn pending_irq_timer_fires_on_poll() {
        let (mut sb, _backend, clock) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);

        // 256 samples at 11025 Hz is ~23 ms, well past the immediate window.
        sb.io_write(0x0c, 0x80, &mut sink);
        sb.io_write(0x0c, 0xff, &mut sink);
        sb.io_write(0x0c, 0x00, &mut sink);

        sb.poll(&mut sink);
        assert!(!sink.is_asserted(5));

        clock.advance_ns(256 * NANOS_PER_SEC / 11025 + 1);
        sb.poll(&mut sink);
        assert!(sink.is_asserted(5));
    }

    #[test]
    fn reset_cancels_the_pending_irq_timer() {
        let (mut sb, _backend, clock) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);

        sb.io_write(0x0c, 0x80, &mut sink);
        sb.io_write(0x0c, 0xff, &mut sink);
        sb.io_write(0x0c, 0x00, &mut sink);

        reset_card(&mut sb, &mut sink);
        clock.advance_ns(NANOS_PER_SEC);
        sb.poll(&mut sink);
        assert!(!sink.is_asserted(5));
    }

    #[test]
    fn short_silence_raises_the_irq_immediately() {
        let (mut sb, _backend, _clock) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);

        // one sample at 11025 Hz is under the 1/1024 s threshold
        sb.io_write(0x0c, 0x80, &mut sink);
        sb.io_write(0x0c, 0x00, &mut sink);
        sb.io_write(0x0c, 0x00, &mut sink);

        assert!(sink.is_asserted(5));
    }

    #[test]
    fn fm_port_aliasing_outside_the_native_range() {
        let (mut sb, _backend, _clock) = card();
        let fm = FmRecorder::new();
        sb.attach_fm(Box::new(fm.clone()));

        // Adlib range: low two bits select the bank.
        sb.fm_write(0x388, 0x01);
        sb.fm_write(0x389, 0x02);
        // Card range: offsets 8/9 alias to banks 0/1.
        sb.fm_write(0x228, 0x03);
        sb.fm_write(0x229, 0x04);

        let writes: Vec<FmEvent> = fm
            .events()
            .into_iter()
            .filter(|e| matches!(e, FmEvent::Write { .. }))
            .collect();
        assert_eq!(
            writes,
            vec![
                FmEvent::Write { index: 0, val: 0x01 },
                FmEvent::Write { index: 1, val: 0x02 },
                FmEvent::Write { index: 0, val: 0x03 },
                FmEvent::Write { index: 1, val: 0x04 },
            ]
        );
    }
}
