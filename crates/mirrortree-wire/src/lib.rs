//! Changeset wire protocol for mirrortree.
//!
//! One frame is sent per destination connection per cycle. All integers are
//! big-endian:
//!
//! ```text
//! initial: u8 (0 or 1)
//! root name: string
//! created:  empty: u8, then if 0:
//!           dir count: i32, dir path strings,
//!           file count: i32, files
//! deleted:  empty: u8, then if 0: count: i32, path strings
//! modified: empty: u8, then if 0: count: i32, files
//!
//! string: length: u32, UTF-8 bytes
//! file:   size: i64, path: string, size raw bytes
//! ```
//!
//! Paths are `/`-separated and relative to the replicated root. No
//! acknowledgment is read back.

mod decoder;
mod encoder;
mod error;
mod frame;

pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use error::ProtocolError;
pub use frame::{DEFAULT_MAX_STRING_LEN, Frame};
