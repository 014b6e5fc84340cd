//! Code emission.
//!
//! This module turns encoder output into a placed program:
//! 1. **Stream:** Writes sequences line by line, stitching lines with branches.
//! 2. **Tally:** Counts the instructions one invocation is expected to execute.

/// Line-stitched code stream.
pub mod stream;

/// Expected dynamic instruction counts.
pub mod tally;

pub use stream::{CodeStream, Layout, LoopLabel};
pub use tally::Tally;
