//! Side effects of the RCP device registers: DMA, collaborator calls and interrupt lines.
//!
//! Each device exposes a `read_*`/`write_*` pair taking the offset of the register inside the
//! 64KiB row of the device. Writes carry the lane mask of the access.

mod ai;
mod dp;
mod mi;
mod pi;
mod sp;
mod vi;
