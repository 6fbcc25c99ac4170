//! Channel layer: reading output and matching it against patterns.
//!
//! [`Transport`] abstracts the endpoint, [`read_nonblocking`] bounds reads
//! in time and [`Expect`] accumulates output until a [`PatternList`]
//! matches, optionally after passing it through an [`OutputFilter`].

mod buffer;
mod expect;
pub(crate) mod filter;
mod patterns;
mod reader;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::OutputBuffer;
pub use expect::{Expect, ExpectConfig, Match};
pub use filter::{Chain, Identity, LastNonBlankLine, OutputFilter, StripAnsi, last_non_blank_line};
pub use patterns::PatternList;
pub use reader::{NonBlockingRead, read_nonblocking};
pub use transport::Transport;
