//! DSP command interpreter: the two LIFO transfer buffers, the opcode
//! dispatch table and the operand-completion handlers.

use blaster_audio::AudioBackend;
use log::{debug, warn};

use crate::clock::Clock;
use crate::irq::IrqSink;

use super::dma::{restrict_sampling_rate, Dma8Mode};
use super::{Sb16, NANOS_PER_SEC};

const COPYRIGHT: &[u8] = b"COPYRIGHT (C) CREATIVE TECHNOLOGY LTD, 1992.\0";

/// Fixed-capacity last-in first-out byte buffer.
///
/// Both DSP transfer buffers work this way: operands complete in reverse
/// arrival order and multi-byte responses are enqueued in reverse so they
/// pop out in the intended reading order.
#[derive(Debug, Clone)]
pub(super) struct ByteStack<const N: usize> {
    data: [u8; N],
    len: usize,
}

impl<const N: usize> ByteStack<N> {
    pub(super) fn new() -> Self {
        Self {
            data: [0; N],
            len: 0,
        }
    }

    /// Push `val`, or report `false` when the buffer is full.
    pub(super) fn push(&mut self, val: u8) -> bool {
        if self.len == N {
            return false;
        }
        self.data[self.len] = val;
        self.len += 1;
        true
    }

    pub(super) fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.data[self.len])
    }

    pub(super) fn clear(&mut self) {
        self.len = 0;
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(super) fn is_full(&self) -> bool {
        self.len == N
    }

    pub(super) fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub(super) fn restore(&mut self, bytes: &[u8]) {
        self.clear();
        for &b in bytes.iter().take(N) {
            self.push(b);
        }
    }
}

impl<B: AudioBackend, C: Clock> Sb16<B, C> {
    /// Queue a response byte. A full buffer drops the byte.
    pub(super) fn respond(&mut self, val: u8) {
        if !self.out_data.push(val) {
            warn!("sb16: response buffer full, dropping {val:#04x}");
        }
    }

    /// Pop the most recent operand; an empty buffer reads as zero.
    pub(super) fn take_operand(&mut self) -> u8 {
        match self.in_data.pop() {
            Some(v) => v,
            None => {
                warn!("sb16: operand buffer underflow");
                0
            }
        }
    }

    /// Operand pair sent low byte first on the wire.
    fn take_lohi(&mut self) -> u16 {
        let hi = self.take_operand();
        let lo = self.take_operand();
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Operand pair sent high byte first on the wire.
    fn take_hilo(&mut self) -> u16 {
        let lo = self.take_operand();
        let hi = self.take_operand();
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Byte written to the command/data port (offset 0x0c): either a fresh
    /// opcode or the next operand of the pending one.
    pub(super) fn dsp_command_write(&mut self, val: u8, sink: &mut impl IrqSink) {
        if self.needed_bytes == 0 {
            self.command(val, sink);
        } else if self.in_data.is_full() {
            warn!("sb16: operand buffer overrun, dropping {val:#04x}");
        } else {
            self.in_data.push(val);
            if self.in_data.len() == self.needed_bytes {
                self.needed_bytes = 0;
                self.complete(sink);
            }
        }
    }

    fn command(&mut self, cmd: u8, sink: &mut impl IrqSink) {
        debug!("sb16: command {cmd:#04x}");

        if cmd > 0xaf && cmd < 0xd0 {
            if cmd & 8 != 0 {
                debug!("sb16: capture-direction command {cmd:#04x}");
            }
            match cmd >> 4 {
                11 | 12 => {}
                _ => warn!("sb16: command {cmd:#04x} has unexpected mode bits"),
            }
            self.needed_bytes = 3;
        } else {
            self.needed_bytes = 0;

            match cmd {
                0x03 => self.respond(0x10),
                0x04 => self.needed_bytes = 1,
                0x05 => self.needed_bytes = 2,
                0x08 => warn!("sb16: CSP command 0x08 not implemented"),
                0x09 => self.respond(0xf8),
                0x0e => self.needed_bytes = 2,
                0x0f => self.needed_bytes = 1,
                0x10 => self.needed_bytes = 1,
                0x14 => {
                    self.needed_bytes = 2;
                    self.block_size = 0;
                }
                // auto-init DMA DAC, 8-bit
                0x1c => self.dma_cmd8(Dma8Mode::AUTO, None),
                // direct ADC
                0x20 => self.respond(0xff),
                0x35 => warn!("sb16: MIDI command 0x35 not implemented"),
                0x40 => {
                    self.freq = -1;
                    self.time_const = None;
                    self.needed_bytes = 1;
                }
                0x41 | 0x42 => {
                    self.freq = -1;
                    self.time_const = None;
                    self.needed_bytes = 2;
                }
                0x45 => self.respond(0xaa),
                // continue auto-init DMA, 16-bit
                0x47 => {}
                0x48 => self.needed_bytes = 2,
                0x74..=0x77 => self.needed_bytes = 2,
                0x7d => warn!("sb16: auto-init 4-bit ADPCM (0x7d) not implemented"),
                0x7f => warn!("sb16: auto-init 2.6-bit ADPCM (0x7f) not implemented"),
                0x80 => self.needed_bytes = 2,
                0x90 | 0x91 => {
                    let mut mode = Dma8Mode::HIGH;
                    if cmd & 1 == 0 {
                        mode |= Dma8Mode::AUTO;
                    }
                    self.dma_cmd8(mode, None);
                }
                // halt DMA, 8-bit
                0xd0 => self.control(false),
                0xd1 => self.set_speaker(true),
                0xd3 => self.set_speaker(false),
                // Sierra's audblst.drv reprograms the rate between halt and
                // continue, hence the full reopen here.
                0xd4 => self.continue_dma8(),
                0xd5 => self.control(false),
                0xd6 => self.control(true),
                0xd8 => {
                    let status = if self.speaker { 0xff } else { 0x00 };
                    self.respond(status);
                }
                // exit auto-init after the current block
                0xd9 | 0xda => self.dma_auto = false,
                0xe0 => {
                    self.needed_bytes = 1;
                    self.out_data.clear();
                }
                0xe1 => {
                    self.respond((self.ver & 0xff) as u8);
                    self.respond((self.ver >> 8) as u8);
                }
                0xe2 => self.needed_bytes = 1,
                0xe3 => {
                    for &b in COPYRIGHT.iter().rev() {
                        self.respond(b);
                    }
                }
                0xe4 => self.needed_bytes = 1,
                0xe7 => warn!("sb16: ESS identification probe (0xe7) ignored"),
                0xe8 => self.respond(self.test_reg),
                0xf2 | 0xf3 => {
                    self.respond(0xaa);
                    self.mixer_regs[0x82] |= if cmd == 0xf2 { 1 } else { 2 };
                    sink.raise_irq(self.irq);
                }
                0xf9 => self.needed_bytes = 1,
                0xfa | 0xfc => self.respond(0x00),
                _ => warn!("sb16: unrecognized command {cmd:#04x}"),
            }
        }

        self.cmd = if self.needed_bytes != 0 { Some(cmd) } else { None };
    }

    fn complete(&mut self, sink: &mut impl IrqSink) {
        let Some(cmd) = self.cmd else {
            warn!("sb16: operand completion without a pending command");
            return;
        };
        debug!(
            "sb16: completing command {cmd:#04x} with {} operand(s)",
            self.in_data.len()
        );

        let mut keep_cmd = false;

        if cmd > 0xaf && cmd < 0xd0 {
            let d2 = self.take_operand();
            let d1 = self.take_operand();
            let d0 = self.take_operand();
            let len = i32::from(d1) | i32::from(d2) << 8;

            if cmd & 8 != 0 {
                // Capture direction: negotiate the format and run the block
                // counter, but no host voice is involved.
                self.use_hdma = cmd < 0xc0;
                self.fmt_bits = if cmd >> 4 == 11 { 16 } else { 8 };
                self.fmt_signed = d0 & 0x10 != 0;
                self.fmt_stereo = d0 & 0x20 != 0;
                self.block_size = (len + 1) << i32::from(self.fmt_bits == 16);
                self.left_till_irq = self.block_size;
                self.control(true);
            } else {
                self.dma_cmd(cmd, d0, len);
            }
        } else {
            match cmd {
                0x04 => {
                    self.csp_mode = self.take_operand();
                    self.csp_reg83r = 0;
                    self.csp_reg83w = 0;
                }
                0x05 => {
                    self.csp_param = self.take_operand();
                    self.csp_value = self.take_operand();
                }
                0x0e => {
                    let val = self.take_operand();
                    let reg = self.take_operand();
                    if reg == 0x83 {
                        // register 0x83 is a four-entry rotating file
                        self.csp_reg83[self.csp_reg83r as usize % 4] = val;
                        self.csp_reg83r += 1;
                    } else {
                        self.csp_regs[reg as usize] = val;
                    }
                }
                0x0f => {
                    let reg = self.take_operand();
                    if reg == 0x83 {
                        let val = self.csp_reg83[self.csp_reg83w as usize % 4];
                        self.respond(val);
                        self.csp_reg83w += 1;
                    } else {
                        self.respond(self.csp_regs[reg as usize]);
                    }
                }
                0x10 => {
                    let sample = self.take_operand();
                    if self.speaker {
                        if let Some(v) = self.voice {
                            self.backend.set_active_out(v, true);
                            self.backend.write_out(v, &[sample]);
                        }
                    }
                }
                0x14 => {
                    let len = i32::from(self.take_lohi()) + 1;
                    self.dma_cmd8(Dma8Mode::empty(), Some(len));
                }
                0x40 => self.time_const = Some(self.take_operand()),
                // Documented as separate output/input rates; the hardware
                // has a single rate under the hood and FT2 relies on that.
                0x41 | 0x42 => {
                    self.freq = restrict_sampling_rate(i32::from(self.take_hilo()));
                    self.highspeed = true;
                }
                0x48 => {
                    self.block_size = i32::from(self.take_lohi()) + 1;
                    self.left_till_irq = self.block_size;
                }
                // 4-bit ADPCM. Every start zeroes the decoder; the reference
                // variant (0x75) reseeds it again from the stream's leading
                // byte. The command stays latched so the transfer engine
                // keeps decoding.
                0x74 | 0x75 => {
                    self.block_size = i32::from(self.take_lohi()) + 1;
                    self.left_till_irq = self.block_size;
                    self.adpcm.reset(0);
                    self.control(true);
                    keep_cmd = true;
                }
                0x76 | 0x77 => {
                    let len = self.take_lohi();
                    warn!("sb16: 2.6-bit ADPCM command {cmd:#04x} (length {len}) not implemented");
                }
                0x80 => {
                    let freq = if self.freq > 0 { self.freq } else { 11025 };
                    let samples = u64::from(self.take_lohi()) + 1;
                    let bytes =
                        samples << u32::from(self.fmt_stereo) << u32::from(self.fmt_bits == 16);
                    let ticks = bytes * NANOS_PER_SEC / freq as u64;
                    if ticks < NANOS_PER_SEC / 1024 {
                        sink.raise_irq(self.irq);
                    } else {
                        self.silence_deadline_ns = Some(self.clock.now_ns() + ticks);
                    }
                }
                0xe0 => {
                    let val = self.take_operand();
                    self.out_data.clear();
                    self.respond(!val);
                }
                0xe2 => {
                    let val = self.take_operand();
                    self.e2_val_add = self.e2_val_add.wrapping_add(val ^ self.e2_val_xor);
                    self.e2_val_xor = self.e2_val_xor.rotate_right(2);
                }
                0xe4 => self.test_reg = self.take_operand(),
                0xf9 => {
                    let sub = self.take_operand();
                    let reply = match sub {
                        0x0e => 0xff,
                        0x0f => 0x07,
                        0x37 => 0x38,
                        _ => 0x00,
                    };
                    self.respond(reply);
                }
                _ => {
                    warn!("sb16: completion for unrecognized command {cmd:#04x}");
                    return;
                }
            }
        }

        if !keep_cmd {
            self.cmd = None;
        }
    }
}
