//! CT1745 mixer register bank: legacy/extended volume aliasing, the IRQ and
//! DMA steering registers and the gain model applied to the host voice and
//! the FM chip.

use blaster_audio::{AudioBackend, OutputVolume};
use log::{debug, warn};

use crate::clock::Clock;

use super::Sb16;

// Approximate dB steps of the hardware attenuator, indexed by the top five
// bits of a volume register.
const LOG_VOL: [u32; 32] = [
    0, 2, 5, 8, 12, 16, 20, 25, 31, 38, 46, 54, 63, 73, 84, 96, 108, 122, 136, 152, 168, 185,
    203, 222, 242, 255, 255, 255, 255, 255, 255, 255,
];

/// Encoding of an IRQ line in configuration register 0x80.
pub(super) fn magic_of_irq(irq: u8) -> u8 {
    match irq {
        5 => 2,
        7 => 4,
        9 => 1,
        10 => 8,
        _ => {
            warn!("sb16: no mixer encoding for irq {irq}");
            2
        }
    }
}

fn irq_of_magic(magic: u8) -> Option<u8> {
    match magic {
        1 => Some(9),
        2 => Some(5),
        4 => Some(7),
        8 => Some(10),
        _ => {
            warn!("sb16: bad irq magic {magic:#04x}");
            None
        }
    }
}

impl<B: AudioBackend, C: Clock> Sb16<B, C> {
    pub(super) fn reset_mixer(&mut self) {
        // registers 0x7f..=0x82 (configuration and IRQ status) survive
        for reg in self.mixer_regs[..0x7f].iter_mut() {
            *reg = 0xff;
        }
        for reg in self.mixer_regs[0x83..].iter_mut() {
            *reg = 0xff;
        }

        self.mixer_regs[0x02] = 4; // master volume (SB2 compatible)
        self.mixer_regs[0x06] = 4; // MIDI volume
        self.mixer_regs[0x08] = 0; // CD volume
        self.mixer_regs[0x0a] = 0; // voice volume
        self.mixer_regs[0x0c] = 0; // input filter / source
        self.mixer_regs[0x0e] = 0; // output filter, bit 1 = stereo switch

        // SB Pro compatible left/right pairs
        self.mixer_regs[0x04] = (4 << 5) | (4 << 1);
        self.mixer_regs[0x22] = (4 << 5) | (4 << 1);
        self.mixer_regs[0x26] = (4 << 5) | (4 << 1);

        for reg in self.mixer_regs[0x30..0x48].iter_mut() {
            *reg = 0x20;
        }

        self.update_fm_volume();
    }

    pub(super) fn mixer_write(&mut self, val: u8) {
        let nreg = self.mixer_index;
        debug!("sb16: mixer[{nreg:#04x}] <- {val:#04x}");

        match nreg {
            0x00 => self.reset_mixer(),

            // The SB Pro registers and the 16-bit ones at 0x30+ shadow
            // each other; writing either side rewrites the other.
            0x04 => {
                self.mixer_regs[0x04] = val;
                self.mixer_regs[0x32] = val & 0xf0;
                self.mixer_regs[0x33] = (val & 0x0f) << 4;
            }
            0x22 => {
                self.mixer_regs[0x22] = val;
                self.mixer_regs[0x30] = val & 0xf0;
                self.mixer_regs[0x31] = (val & 0x0f) << 4;
            }
            0x26 => {
                self.mixer_regs[0x26] = val;
                self.mixer_regs[0x34] = val & 0xf0;
                self.mixer_regs[0x35] = (val & 0x0f) << 4;
            }
            0x30..=0x35 => {
                self.mixer_regs[nreg as usize] = val;
                self.mixer_regs[0x22] =
                    (self.mixer_regs[0x30] & 0xf0) | (self.mixer_regs[0x31] >> 4);
                self.mixer_regs[0x04] =
                    (self.mixer_regs[0x32] & 0xf0) | (self.mixer_regs[0x33] >> 4);
                self.mixer_regs[0x26] =
                    (self.mixer_regs[0x34] & 0xf0) | (self.mixer_regs[0x35] >> 4);
            }

            // IRQ steering; the register itself keeps its reset value, the
            // line moves.
            0x80 => {
                if let Some(irq) = irq_of_magic(val) {
                    debug!("sb16: moving to irq {irq}");
                    self.irq = irq;
                }
            }

            // DMA steering: lowest set bit of each nibble.
            0x81 => {
                let dma = (val & 0x0f).trailing_zeros() as u8 & 7;
                let hdma = (val & 0xf0).trailing_zeros() as u8 & 7;
                if dma != self.dma || hdma != self.hdma {
                    debug!(
                        "sb16: moving dma {} -> {dma}, high dma {} -> {hdma}",
                        self.dma, self.hdma
                    );
                    // a held request line follows the session to its new
                    // channel
                    let old = self.active_channel() as usize & 7;
                    let level = self.dreq[old];
                    self.dreq[old] = false;
                    self.dma = dma;
                    self.hdma = hdma;
                    if level {
                        self.dreq[self.active_channel() as usize & 7] = true;
                    }
                }
            }

            0x82 => {
                warn!("sb16: ignoring write to the IRQ status register ({val:#04x})");
                return;
            }

            _ => {
                if nreg >= 0x80 {
                    debug!("sb16: write to unhandled mixer register {nreg:#04x}");
                }
                self.mixer_regs[nreg as usize] = val;
            }
        }

        self.update_fm_volume();
        self.update_voice_volume();
    }

    fn volume_index(&self, reg: usize) -> usize {
        (self.mixer_regs[reg] >> 3) as usize & 0x1f
    }

    pub(super) fn update_voice_volume(&mut self) {
        let Some(voice) = self.voice else { return };

        let master_l = LOG_VOL[self.volume_index(0x30)];
        let master_r = LOG_VOL[self.volume_index(0x31)];
        let voice_l = LOG_VOL[self.volume_index(0x32)];
        let voice_r = LOG_VOL[self.volume_index(0x33)];

        let volume = OutputVolume {
            mute: false,
            left: (master_l * voice_l * 192 / 65025) as u8,
            right: (master_r * voice_r * 192 / 65025) as u8,
        };
        self.backend.set_volume_out(voice, volume);
    }

    pub(super) fn update_fm_volume(&mut self) {
        let master_l = LOG_VOL[self.volume_index(0x30)];
        let master_r = LOG_VOL[self.volume_index(0x31)];
        let fm_l = LOG_VOL[self.volume_index(0x34)];
        let fm_r = LOG_VOL[self.volume_index(0x35)];

        let left = (master_l * fm_l * 0x8000 / 65025) as i32;
        let right = (master_r * fm_r * 0x8000 / 65025) as i32;
        if let Some(fm) = self.fm.as_mut() {
            fm.set_volume(left, right);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::reset_card;
    use super::super::{Sb16, Sb16Config};
    use super::*;
    use crate::clock::ManualClock;
    use crate::fm::FmRecorder;
    use crate::irq::IrqRecorder;
    use blaster_audio::{CaptureBackend, VoiceId};

    fn card() -> (
        Sb16<CaptureBackend, ManualClock>,
        CaptureBackend,
        IrqRecorder,
    ) {
        let backend = CaptureBackend::new();
        let mut sb = Sb16::new(Sb16Config::default(), backend.clone(), ManualClock::new());
        let mut sink = IrqRecorder::new();
        reset_card(&mut sb, &mut sink);
        sb.io_read(0x0a, &mut sink);
        sink.take_events();
        (sb, backend, sink)
    }

    fn write_reg(
        sb: &mut Sb16<CaptureBackend, ManualClock>,
        sink: &mut IrqRecorder,
        reg: u8,
        val: u8,
    ) {
        sb.io_write(0x04, reg, sink);
        sb.io_write(0x05, val, sink);
    }

    fn read_reg(
        sb: &mut Sb16<CaptureBackend, ManualClock>,
        sink: &mut IrqRecorder,
        reg: u8,
    ) -> u8 {
        sb.io_write(0x04, reg, sink);
        sb.io_read(0x05, sink)
    }

    #[test]
    fn reset_applies_the_documented_defaults() {
        let (mut sb, _backend, mut sink) = card();
        write_reg(&mut sb, &mut sink, 0x00, 0x00);

        assert_eq!(read_reg(&mut sb, &mut sink, 0x04), 0x88);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x22), 0x88);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x26), 0x88);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x0e), 0x00);
        for reg in 0x30..0x48 {
            assert_eq!(read_reg(&mut sb, &mut sink, reg), 0x20, "reg {reg:#04x}");
        }
        // wiring registers survive the mixer reset
        assert_eq!(read_reg(&mut sb, &mut sink, 0x80), 2);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x81), (1 << 1) | (1 << 5));
        // unassigned space reads back all ones
        assert_eq!(read_reg(&mut sb, &mut sink, 0x48), 0xff);
    }

    #[test]
    fn legacy_and_extended_volume_registers_alias() {
        let (mut sb, _backend, mut sink) = card();

        write_reg(&mut sb, &mut sink, 0x22, 0xab);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x30), 0xa0);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x31), 0xb0);

        write_reg(&mut sb, &mut sink, 0x30, 0xf0);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x22), 0xfb);

        write_reg(&mut sb, &mut sink, 0x33, 0x70);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x04), 0x27);
    }

    #[test]
    fn voice_gain_follows_master_and_voice_registers() {
        let (mut sb, backend, mut sink) = card();

        for reg in 0x30..=0x33 {
            write_reg(&mut sb, &mut sink, reg, 0xff);
        }
        let volume = backend.volume(VoiceId(0));
        assert_eq!((volume.left, volume.right), (192, 192));

        write_reg(&mut sb, &mut sink, 0x30, 0x00);
        assert_eq!(backend.volume(VoiceId(0)).left, 0);
        assert_eq!(backend.volume(VoiceId(0)).right, 192);
    }

    #[test]
    fn fm_gain_is_pushed_to_the_attached_chip() {
        let (mut sb, _backend, mut sink) = card();
        let fm = FmRecorder::new();
        sb.attach_fm(Box::new(fm.clone()));

        for reg in [0x30, 0x31, 0x34, 0x35] {
            write_reg(&mut sb, &mut sink, reg, 0xff);
        }
        assert_eq!(fm.last_volume(), Some((0x8000, 0x8000)));
    }

    #[test]
    fn irq_steering_moves_the_line_but_not_the_register() {
        let (mut sb, _backend, mut sink) = card();

        write_reg(&mut sb, &mut sink, 0x80, 8);
        assert_eq!(sb.irq_line(), 10);
        // the register itself still reads the power-on magic
        assert_eq!(read_reg(&mut sb, &mut sink, 0x80), 2);

        sb.io_write(0x0c, 0xf2, &mut sink);
        assert!(sink.is_asserted(10));
        assert!(!sink.is_asserted(5));

        // unknown magic leaves the line where it was
        write_reg(&mut sb, &mut sink, 0x80, 3);
        assert_eq!(sb.irq_line(), 10);
    }

    #[test]
    fn dma_steering_decodes_one_channel_per_nibble() {
        let (mut sb, _backend, mut sink) = card();
        write_reg(&mut sb, &mut sink, 0x81, 0x48);
        assert_eq!(sb.dma8_channel(), 3);
        assert_eq!(sb.dma16_channel(), 6);
    }

    #[test]
    fn dma_re_steer_moves_a_held_request_line() {
        let (mut sb, _backend, mut sink) = card();

        // auto-init 8-bit session with a held request on channel 1
        sb.io_write(0x0c, 0x48, &mut sink);
        sb.io_write(0x0c, 0x0f, &mut sink);
        sb.io_write(0x0c, 0x00, &mut sink);
        sb.io_write(0x0c, 0x1c, &mut sink);
        sb.audio_callback(64);
        assert!(sb.dreq_level(1));

        write_reg(&mut sb, &mut sink, 0x81, 0x28);
        assert_eq!(sb.dma8_channel(), 3);
        assert!(!sb.dreq_level(1));
        assert!(sb.dreq_level(3));
    }

    #[test]
    fn irq_status_register_is_read_only() {
        let (mut sb, _backend, mut sink) = card();
        write_reg(&mut sb, &mut sink, 0x82, 0xff);
        assert_eq!(read_reg(&mut sb, &mut sink, 0x82), 0x00);
    }
}
