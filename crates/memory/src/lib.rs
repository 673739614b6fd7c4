//! Guest physical memory access.
//!
//! Devices that master the bus (the ISA DMA controller in this workspace)
//! read and write guest RAM through [`MemoryBus`]. [`Bus`] is a dense,
//! bounds-checked RAM implementation used by the harness and by tests.

mod bus;
mod phys;

pub use bus::MemoryBus;
pub use phys::Bus;
