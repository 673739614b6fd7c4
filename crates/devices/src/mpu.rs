use log::debug;

/// MPU-401 UART stub.
///
/// Just enough for probing drivers to move on: the status port always reads
/// "no data, not ready" and the data port reads back all ones. Writes are
/// accepted and dropped.
#[derive(Debug, Default)]
pub struct Mpu401;

impl Mpu401 {
    pub fn new() -> Self {
        Self
    }

    pub fn io_read(&mut self, offset: u8) -> u8 {
        if offset & 1 != 0 {
            0x3F
        } else {
            0xFF
        }
    }

    pub fn io_write(&mut self, offset: u8, val: u8) {
        debug!("mpu401: dropped write of {val:#04x} to offset {offset}");
    }
}
