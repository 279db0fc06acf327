//! Protocol module containing the wire constants and the frame splitter.

pub mod constants;
pub mod frame;

pub use constants::*;
pub use frame::{encode_header, is_line_terminator, split, Frame, FrameError};
