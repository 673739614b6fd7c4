//! Snapshot state capture and restore.
//!
//! [`Sb16State`] is a plain value: serialization is the embedder's concern.
//! Restore rebuilds the transient side (host voice, request lines) from the
//! captured configuration.

use blaster_audio::{AudioBackend, SampleFormat};

use crate::clock::Clock;

use super::Sb16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sb16State {
    pub ver: u16,
    pub irq: u8,
    pub dma: u8,
    pub hdma: u8,

    pub cmd: Option<u8>,
    pub needed_bytes: usize,
    pub in_data: Vec<u8>,
    pub out_data: Vec<u8>,
    pub test_reg: u8,
    pub last_read_byte: u8,
    pub reset_seq: u8,
    pub can_write: bool,
    pub highspeed: bool,

    pub fmt_bits: u8,
    pub fmt_signed: bool,
    pub fmt_stereo: bool,
    pub freq: i32,
    pub time_const: Option<u8>,
    pub block_size: i32,
    pub fifo: bool,
    pub dma_auto: bool,
    pub use_hdma: bool,
    pub align: i32,
    pub bytes_per_second: i32,

    pub speaker: bool,
    pub left_till_irq: i32,
    pub dma_running: bool,

    pub adpcm_predictor: i32,
    pub adpcm_step_index: i32,

    pub csp_param: u8,
    pub csp_value: u8,
    pub csp_mode: u8,
    pub csp_regs: Vec<u8>,
    pub csp_reg83: [u8; 4],
    pub csp_reg83r: u32,
    pub csp_reg83w: u32,

    pub e2_val_add: u8,
    pub e2_val_xor: u8,

    pub mixer_index: u8,
    pub mixer_regs: Vec<u8>,
}

impl<B: AudioBackend, C: Clock> Sb16<B, C> {
    pub fn save_state(&self) -> Sb16State {
        Sb16State {
            ver: self.ver,
            irq: self.irq,
            dma: self.dma,
            hdma: self.hdma,
            cmd: self.cmd,
            needed_bytes: self.needed_bytes,
            in_data: self.in_data.as_slice().to_vec(),
            out_data: self.out_data.as_slice().to_vec(),
            test_reg: self.test_reg,
            last_read_byte: self.last_read_byte,
            reset_seq: self.reset_seq,
            can_write: self.can_write,
            highspeed: self.highspeed,
            fmt_bits: self.fmt_bits,
            fmt_signed: self.fmt_signed,
            fmt_stereo: self.fmt_stereo,
            freq: self.freq,
            time_const: self.time_const,
            block_size: self.block_size,
            fifo: self.fifo,
            dma_auto: self.dma_auto,
            use_hdma: self.use_hdma,
            align: self.align,
            bytes_per_second: self.bytes_per_second,
            speaker: self.speaker,
            left_till_irq: self.left_till_irq,
            dma_running: self.dma_running,
            adpcm_predictor: self.adpcm.predictor,
            adpcm_step_index: self.adpcm.step_index,
            csp_param: self.csp_param,
            csp_value: self.csp_value,
            csp_mode: self.csp_mode,
            csp_regs: self.csp_regs.to_vec(),
            csp_reg83: self.csp_reg83,
            csp_reg83r: self.csp_reg83r,
            csp_reg83w: self.csp_reg83w,
            e2_val_add: self.e2_val_add,
            e2_val_xor: self.e2_val_xor,
            mixer_index: self.mixer_index,
            mixer_regs: self.mixer_regs.to_vec(),
        }
    }

    pub fn restore_state(&mut self, state: &Sb16State) {
        self.ver = state.ver;
        self.irq = state.irq;
        self.dma = state.dma & 7;
        self.hdma = state.hdma & 7;
        self.cmd = state.cmd;
        self.needed_bytes = state.needed_bytes;
        self.in_data.restore(&state.in_data);
        self.out_data.restore(&state.out_data);
        self.test_reg = state.test_reg;
        self.last_read_byte = state.last_read_byte;
        self.reset_seq = state.reset_seq;
        self.can_write = state.can_write;
        self.highspeed = state.highspeed;
        self.fmt_bits = state.fmt_bits;
        self.fmt_signed = state.fmt_signed;
        self.fmt_stereo = state.fmt_stereo;
        self.fmt = SampleFormat::from_bits_signed(state.fmt_bits, state.fmt_signed);
        self.freq = state.freq;
        self.time_const = state.time_const;
        self.block_size = state.block_size;
        self.fifo = state.fifo;
        self.dma_auto = state.dma_auto;
        self.use_hdma = state.use_hdma;
        self.align = state.align;
        self.bytes_per_second = state.bytes_per_second;
        self.speaker = state.speaker;
        self.left_till_irq = state.left_till_irq;
        self.dma_running = state.dma_running;
        self.adpcm.predictor = state.adpcm_predictor;
        self.adpcm.step_index = state.adpcm_step_index;
        self.csp_param = state.csp_param;
        self.csp_value = state.csp_value;
        self.csp_mode = state.csp_mode;
        for (dst, src) in self.csp_regs.iter_mut().zip(state.csp_regs.iter()) {
            *dst = *src;
        }
        self.csp_reg83 = state.csp_reg83;
        self.csp_reg83r = state.csp_reg83r;
        self.csp_reg83w = state.csp_reg83w;
        self.e2_val_add = state.e2_val_add;
        self.e2_val_xor = state.e2_val_xor;
        self.mixer_index = state.mixer_index;
        for (dst, src) in self.mixer_regs.iter_mut().zip(state.mixer_regs.iter()) {
            *dst = *src;
        }

        // Rebuild the transient side. The old voice's format may not match
        // the restored one, so it is dropped rather than reconfigured.
        if let Some(v) = self.voice.take() {
            self.backend.close_out(v);
        }
        self.audio_free = 0;
        self.dreq = [false; 8];
        self.silence_deadline_ns = None;

        if self.dma_running {
            if self.freq > 0 {
                let channels = 1 << u8::from(self.fmt_stereo);
                self.open_voice(self.freq as u32, channels, self.fmt);
            }
            self.control(true);
            let speaker = self.speaker;
            self.set_speaker(speaker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::reset_card;
    use super::super::{Sb16, Sb16Config};
    use crate::clock::ManualClock;
    use crate::irq::IrqRecorder;
    use blaster_audio::{CaptureBackend, SampleFormat, VoiceId};

    fn card() -> (Sb16<CaptureBackend, ManualClock>, CaptureBackend) {
        let backend = CaptureBackend::new();
        let sb = Sb16::new(Sb16Config::default(), backend.clone(), ManualClock::new());
        (sb, backend)
    }

    #[test]
    fn round_trip_preserves_negotiation_and_registers() {
        let (mut sb, _backend) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);

        // leave a half-entered command and a custom rate behind
        sb.io_write(0x0c, 0x41, &mut sink);
        sb.io_write(0x0c, 0xac, &mut sink);
        let state = sb.save_state();
        assert_eq!(state.cmd, Some(0x41));
        assert_eq!(state.needed_bytes, 2);
        assert_eq!(state.in_data, vec![0xac]);

        let (mut other, _other_backend) = card();
        other.restore_state(&state);
        let mut sink2 = IrqRecorder::new();
        other.io_write(0x0c, 0x44, &mut sink2);
        assert_eq!(other.freq, 0xac44);
        assert_eq!(other.save_state(), state_with_rate(&state));

        fn state_with_rate(base: &super::Sb16State) -> super::Sb16State {
            let mut s = base.clone();
            s.cmd = None;
            s.needed_bytes = 0;
            s.in_data.clear();
            s.freq = 0xac44;
            s.highspeed = true;
            s
        }
    }

    #[test]
    fn restore_of_a_running_session_reopens_the_voice() {
        let (mut sb, _backend) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);

        // 16-bit signed stereo auto-init session
        for b in [0x41, 0xac, 0x44, 0xb6, 0x30, 0xff, 0x00] {
            sb.io_write(0x0c, b, &mut sink);
        }
        assert!(sb.dma_running);
        let state = sb.save_state();

        let (mut other, other_backend) = card();
        other.restore_state(&state);

        assert!(other.dma_running);
        let voice = other.voice.expect("voice reopened");
        let settings = other_backend.settings(voice);
        assert_eq!(settings.freq, 44100);
        assert_eq!(settings.channels, 2);
        assert_eq!(settings.fmt, SampleFormat::S16);
        assert!(other_backend.is_active(voice));
        assert!(other.speaker);
    }

    #[test]
    fn restore_of_an_idle_card_leaves_the_voice_closed() {
        let (mut sb, _backend) = card();
        let state = sb.save_state();

        let (mut other, other_backend) = card();
        let mut sink = IrqRecorder::new();
        reset_card(&mut other, &mut sink);
        assert_eq!(other_backend.voice_count(), 1);

        other.restore_state(&state);
        assert!(other.voice.is_none());
        assert!(other_backend.is_closed(VoiceId(0)));
    }
}
