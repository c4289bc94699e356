//! HTJ2K (Part 15, ISO/IEC 15444-15) code-block coder: MEL run-length
//! significance signalling plus MagSgn sign/magnitude, selected instead of
//! the EBCOT/MQ path (`bit_plane_coder`) when the CAP marker's HTJ2K bit is
//! set. `block_coder::HtBlockCoder` adapts this to the shared `BlockCoder`
//! trait.

pub mod coder;
pub mod encoder;
pub mod mag_sgn;
pub mod mel;
