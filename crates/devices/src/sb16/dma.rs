//! DMA streaming engine: transfer-start command decoding and the per-chunk
//! playback/record callbacks the DMA controller drives.

use bitflags::bitflags;
use blaster_audio::{AudioBackend, SampleFormat};
use log::{debug, warn};

use crate::clock::Clock;
use crate::dma::DmaPort;
use crate::irq::IrqSink;

use super::{Sb16, SAMPLE_RATE_MAX, SAMPLE_RATE_MIN};

bitflags! {
    /// Mode bits of the legacy 8-bit transfer-start commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Dma8Mode: u8 {
        const AUTO = 1;
        const HIGH = 2;
    }
}

pub(super) fn restrict_sampling_rate(freq: i32) -> i32 {
    if freq < SAMPLE_RATE_MIN {
        warn!("sb16: sampling rate {freq} too low, clamping to {SAMPLE_RATE_MIN}");
        SAMPLE_RATE_MIN
    } else if freq > SAMPLE_RATE_MAX {
        warn!("sb16: sampling rate {freq} too high, clamping to {SAMPLE_RATE_MAX}");
        SAMPLE_RATE_MAX
    } else {
        freq
    }
}

impl<B: AudioBackend, C: Clock> Sb16<B, C> {
    /// Legacy 8-bit transfer start. `dma_len` of `None` keeps the block
    /// size programmed earlier through command 0x48.
    pub(super) fn dma_cmd8(&mut self, mode: Dma8Mode, dma_len: Option<i32>) {
        self.fmt = SampleFormat::U8;
        self.use_hdma = false;
        self.fmt_bits = 8;
        self.fmt_signed = false;
        self.fmt_stereo = self.mixer_regs[0x0e] & 2 != 0;

        match self.time_const {
            None => {
                if self.freq <= 0 {
                    self.freq = 11025;
                }
            }
            Some(tc) => {
                let tmp = 256 - i32::from(tc);
                self.freq = (1_000_000 + tmp / 2) / tmp;
            }
        }
        self.freq = restrict_sampling_rate(self.freq);

        match dma_len {
            Some(len) => self.block_size = len << i32::from(self.fmt_stereo),
            // Command 0x48 programs the size in bytes less one; some
            // titles send an odd count and expect the stereo bit to be
            // masked out of it, others rely on even counts surviving.
            None => self.block_size &= !i32::from(self.fmt_stereo),
        }

        self.freq >>= i32::from(self.fmt_stereo);
        self.left_till_irq = self.block_size;
        self.bytes_per_second = self.freq << i32::from(self.fmt_stereo);
        self.dma_auto = mode.contains(Dma8Mode::AUTO);
        self.align = (1 << i32::from(self.fmt_stereo)) - 1;
        if self.block_size & self.align != 0 {
            warn!(
                "sb16: misaligned block size {} (alignment {})",
                self.block_size,
                self.align + 1
            );
        }

        self.continue_dma8();
        self.set_speaker(true);
    }

    /// Resume (or start) the 8-bit session with the current format.
    pub(super) fn continue_dma8(&mut self) {
        if self.freq > 0 {
            self.audio_free = 0;
            let channels = 1 << u8::from(self.fmt_stereo);
            self.open_voice(self.freq as u32, channels, self.fmt);
        }
        self.control(true);
    }

    /// Extended transfer start (commands 0xb0..0xcf, playback direction).
    pub(super) fn dma_cmd(&mut self, cmd: u8, mode: u8, dma_len: i32) {
        self.use_hdma = cmd < 0xc0;
        self.fifo = cmd & 2 != 0;
        self.dma_auto = cmd & 4 != 0;
        self.fmt_signed = mode & 0x10 != 0;
        self.fmt_stereo = mode & 0x20 != 0;
        self.fmt_bits = if cmd >> 4 == 11 { 16 } else { 8 };

        if let Some(tc) = self.time_const {
            let tmp = 256 - i32::from(tc);
            self.freq = (1_000_000 + tmp / 2) / tmp;
            self.time_const = None;
        }

        self.block_size = (dma_len + 1) << i32::from(self.fmt_bits == 16);
        if !self.dma_auto {
            // Single-cycle transfers count the stereo doubling here;
            // auto-init ones must not (DOOM versus Miles setsound.exe).
            self.block_size <<= i32::from(self.fmt_stereo);
        }

        self.fmt = SampleFormat::from_bits_signed(self.fmt_bits, self.fmt_signed);
        self.left_till_irq = self.block_size;
        self.bytes_per_second =
            (self.freq << i32::from(self.fmt_stereo)) << i32::from(self.fmt_bits == 16);
        self.highspeed = false;
        self.align = (1 << (i32::from(self.fmt_stereo) + i32::from(self.fmt_bits == 16))) - 1;
        if self.block_size & self.align != 0 {
            warn!(
                "sb16: misaligned block size {} (alignment {})",
                self.block_size,
                self.align + 1
            );
        }

        if self.freq > 0 {
            self.audio_free = 0;
            let channels = 1 << u8::from(self.fmt_stereo);
            self.open_voice(self.freq as u32, channels, self.fmt);
        }
        self.control(true);
        self.set_speaker(true);
    }

    /// Playback transfer: pull up to one chunk of guest data from `chan`
    /// and hand it to the host voice. `pos` and `len` describe the
    /// channel's ring; returns the advanced position.
    pub fn dma_read(
        &mut self,
        chan: u8,
        port: &mut impl DmaPort,
        pos: usize,
        len: usize,
        sink: &mut impl IrqSink,
    ) -> usize {
        let mut pos = pos;
        if self.block_size <= 0 {
            debug!("sb16: dma pull with no block size configured");
            return pos;
        }
        if len == 0 || pos >= len {
            return pos;
        }
        if self.left_till_irq < 0 {
            self.left_till_irq = self.block_size;
        }

        // No host voice, nowhere for the data to go: the transfer stays put
        // until a later command reopens one.
        if self.voice.is_none() {
            self.dreq[chan as usize & 7] = false;
            return pos;
        }

        let free = self.audio_free & !self.align;
        if free <= 0 {
            self.dreq[chan as usize & 7] = false;
            return pos;
        }

        if self.cmd == Some(0x75) {
            // The reference byte leads the stream: reseed the decoder, then
            // treat the rest of the block as plain 4-bit data.
            let mut seed = [0u8; 1];
            if port.read_memory(chan, &mut seed, pos) == 1 {
                self.adpcm.reset(((i32::from(seed[0]) - 128) << 8) as i16);
            }
            pos = (pos + 1) % len;
            self.left_till_irq -= 1;
            self.cmd = Some(0x74);
        }

        let to_copy = free
            .min(self.left_till_irq)
            .min((len - pos) as i32)
            .max(0) as usize;

        let written = if self.cmd == Some(0x74) {
            self.decode_chunk(chan, port, pos, to_copy.min(1024))
        } else {
            self.stream_chunk(chan, port, pos, len, to_copy)
        };

        pos = (pos + written) % len;
        self.left_till_irq -= written as i32;
        self.audio_free -= written as i32;

        if self.left_till_irq <= 0 {
            self.mixer_regs[0x82] |= if chan & 4 != 0 { 2 } else { 1 };
            sink.raise_irq(self.irq);

            if self.block_size > 0 {
                self.left_till_irq = self.block_size + self.left_till_irq % self.block_size;
            } else {
                self.block_size = 1024;
                self.left_till_irq = 1024;
            }

            if !self.dma_auto {
                self.control(false);
                self.set_speaker(false);
            }
        }

        pos
    }

    // Raw PCM path, bounced through a fixed buffer. Bytes the voice does
    // not accept are re-read on the next pull.
    fn stream_chunk(
        &mut self,
        chan: u8,
        port: &mut impl DmaPort,
        pos: usize,
        len: usize,
        want: usize,
    ) -> usize {
        let mut buf = [0u8; 4096];
        let mut remaining = want;
        let mut pos = pos;
        let mut net = 0;

        while remaining > 0 {
            let to_copy = remaining.min(len - pos).min(buf.len());
            let copied = port.read_memory(chan, &mut buf[..to_copy], pos);
            let accepted = match self.voice {
                Some(v) => self.backend.write_out(v, &buf[..copied]),
                None => 0,
            };
            if accepted == 0 {
                break;
            }
            remaining -= accepted;
            pos = (pos + accepted) % len;
            net += accepted;
        }

        net
    }

    // Compressed path: each input byte becomes two signed 16-bit samples.
    // Returns input bytes consumed, which is what the block counter tracks.
    fn decode_chunk(
        &mut self,
        chan: u8,
        port: &mut impl DmaPort,
        pos: usize,
        want: usize,
    ) -> usize {
        let mut packed = [0u8; 1024];
        let copied = port.read_memory(chan, &mut packed[..want], pos);

        let mut pcm = [0u8; 4096];
        for (i, &byte) in packed[..copied].iter().enumerate() {
            let [first, second] = self.adpcm.decode_byte(byte);
            pcm[i * 4..i * 4 + 2].copy_from_slice(&first.to_le_bytes());
            pcm[i * 4 + 2..i * 4 + 4].copy_from_slice(&second.to_le_bytes());
        }

        match self.voice {
            Some(v) => self.backend.write_out(v, &pcm[..copied * 4]) / 4,
            None => 0,
        }
    }

    /// Record transfer: the capture path is not wired to a host source, so
    /// the block is filled with format-appropriate silence.
    pub fn dma_write(
        &mut self,
        chan: u8,
        port: &mut impl DmaPort,
        pos: usize,
        len: usize,
        sink: &mut impl IrqSink,
    ) -> usize {
        let mut pos = pos;
        if len == 0 || pos >= len {
            return pos;
        }

        let to_copy = self
            .left_till_irq
            .min((len - pos) as i32)
            .max(0)
            .min(4096) as usize;
        let silence = if self.fmt_bits == 8 && !self.fmt_signed {
            0x80
        } else {
            0x00
        };
        let buf = [silence; 4096];
        let copied = port.write_memory(chan, &buf[..to_copy], pos);

        pos = (pos + copied) % len;
        self.left_till_irq -= copied as i32;

        if self.left_till_irq <= 0 {
            self.mixer_regs[0x82] |= if chan & 4 != 0 { 2 } else { 1 };
            sink.raise_irq(self.irq);
            self.left_till_irq = self.block_size;
        }

        pos
    }
}
