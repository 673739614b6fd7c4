use memory::MemoryBus;

/// Device-side view of one ISA DMA channel during a transfer.
///
/// The controller calls back into the device with a port implementing this
/// trait; the device copies bytes in or out relative to the channel's base
/// address, wrapping at the programmed transfer length.
pub trait DmaPort {
    /// Programmed transfer length of `chan`, in bytes.
    fn transfer_len(&self, chan: u8) -> usize;

    /// Copy bytes from guest memory into `buf`, starting `pos` bytes into the
    /// channel's region. Returns how many bytes were copied.
    fn read_memory(&mut self, chan: u8, buf: &mut [u8], pos: usize) -> usize;

    /// Copy `buf` into guest memory, starting `pos` bytes into the channel's
    /// region. Returns how many bytes were copied.
    fn write_memory(&mut self, chan: u8, buf: &[u8], pos: usize) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
struct DmaChannel {
    base: u64,
    len: usize,
}

/// Minimal 8237-style controller: eight channels, each a base address and a
/// transfer length programmed by the embedder.
///
/// Channels 0..=3 move bytes, 4..=7 move words; the word doubling is the
/// embedder's concern when programming `len`, this model deals in bytes
/// throughout.
#[derive(Debug, Default)]
pub struct IsaDmaController {
    channels: [DmaChannel; 8],
}

impl IsaDmaController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(&mut self, chan: u8, base: u64, len: usize) {
        let c = &mut self.channels[chan as usize & 7];
        c.base = base;
        c.len = len;
    }

    /// Borrow the controller together with a memory bus as a [`DmaPort`].
    pub fn with_memory<'a, M: MemoryBus>(&'a mut self, memory: &'a mut M) -> DmaMemory<'a, M> {
        DmaMemory {
            controller: self,
            memory,
        }
    }
}

/// A controller lent out over a memory bus for the duration of a transfer.
pub struct DmaMemory<'a, M: MemoryBus> {
    controller: &'a mut IsaDmaController,
    memory: &'a mut M,
}

impl<M: MemoryBus> DmaPort for DmaMemory<'_, M> {
    fn transfer_len(&self, chan: u8) -> usize {
        self.controller.channels[chan as usize & 7].len
    }

    fn read_memory(&mut self, chan: u8, buf: &mut [u8], pos: usize) -> usize {
        let c = self.controller.channels[chan as usize & 7];
        if c.len == 0 {
            return 0;
        }
        let mut pos = pos % c.len;
        let count = buf.len().min(c.len);
        for b in buf[..count].iter_mut() {
            *b = self.memory.read_u8(c.base + pos as u64);
            pos = (pos + 1) % c.len;
        }
        count
    }

    fn write_memory(&mut self, chan: u8, buf: &[u8], pos: usize) -> usize {
        let c = self.controller.channels[chan as usize & 7];
        if c.len == 0 {
            return 0;
        }
        let mut pos = pos % c.len;
        let count = buf.len().min(c.len);
        for &b in &buf[..count] {
            self.memory.write_u8(c.base + pos as u64, b);
            pos = (pos + 1) % c.len;
        }
        count
    }
}
