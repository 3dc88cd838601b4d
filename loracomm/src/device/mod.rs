//! Everything needed to exchange frames with peers using the physical
//! radio module.

pub mod device;
pub mod frame;
pub mod memory;
pub mod radio;

pub use device::*;
