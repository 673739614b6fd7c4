use crate::bus::MemoryBus;

/// Dense (contiguous) guest RAM.
///
/// Accesses outside the backing store behave like an open ISA bus: reads
/// float high (all ones) and writes are dropped.
#[derive(Debug, Clone)]
pub struct Bus {
    data: Box<[u8]>,
}

impl Bus {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns the in-range prefix of an access, if any.
    fn in_range(&self, paddr: u64, len: usize) -> Option<(usize, usize)> {
        let start = usize::try_from(paddr).ok()?;
        if start >= self.data.len() {
            return None;
        }
        let end = start.checked_add(len)?.min(self.data.len());
        Some((start, end))
    }
}

impl MemoryBus for Bus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        buf.fill(0xFF);
        if let Some((start, end)) = self.in_range(paddr, buf.len()) {
            buf[..end - start].copy_from_slice(&self.data[start..end]);
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        if let Some((start, end)) = self.in_range(paddr, buf.len()) {
            self.data[start..end].copy_from_slice(&buf[..end - start]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_within_range() {
        let mut bus = Bus::new(0x1000);
        bus.write_u32(0x10, 0xDEAD_BEEF);
        assert_eq!(bus.read_u32(0x10), 0xDEAD_BEEF);
        assert_eq!(bus.read_u8(0x10), 0xEF);
        assert_eq!(bus.read_u16(0x12), 0xDEAD);
    }

    #[test]
    fn out_of_range_reads_float_high_and_writes_are_dropped() {
        let mut bus = Bus::new(0x100);
        assert_eq!(bus.read_u32(0x100), 0xFFFF_FFFF);
        bus.write_u8(0x100, 0x55);
        assert_eq!(bus.read_u8(0x100), 0xFF);

        // Straddling accesses touch only the in-range prefix.
        bus.write_u16(0xFF, 0x1234);
        assert_eq!(bus.read_u8(0xFF), 0x34);
        assert_eq!(bus.read_u16(0xFF), 0xFF34);
    }
}
