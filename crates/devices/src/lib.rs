//! Device models and the device-side traits they are wired up with.
//!
//! The embedding runtime owns interrupt delivery, DMA scheduling and virtual
//! time; devices here are plain state machines driven through explicit
//! methods (port accesses, DMA transfer callbacks, timer polls).

pub mod clock;
pub mod dma;
pub mod fm;
pub mod irq;
pub mod mpu;
pub mod sb16;
