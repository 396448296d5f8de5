//! A lock-free distributed unique ID generator inspired by [Twitter's Snowflake].
//!
//! Every id is a `u64` with the top bit unused, laid out from most to least
//! significant as 41 bits of milliseconds since [`EPOCH_MILLIS`], 13 bits of
//! worker id and 9 bits of sequence. A single worker issues at most 512 ids
//! per millisecond.
//!
//! The current millisecond and its sequence live in one record behind an
//! atomic pointer. Moving to a new millisecond swaps the whole record with a
//! compare-and-swap, so there is no lock on the hot path.
//!
//! ## Quickstart
//!
//! Add the following to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! snowflake_cas = "0.1"
//! ```
//!
//! Use the library like this:
//!
//! ```
//! use snowflake_cas::{Snowflake, sequence_of, timestamp_of, worker_of};
//!
//! let sf = Snowflake::new(123).unwrap();
//! let next_id = sf.next_id();
//! assert_eq!(worker_of(next_id), 123);
//! println!("{} {} {}", timestamp_of(next_id), worker_of(next_id), sequence_of(next_id));
//! ```
//!
//! ## Concurrent use
//!
//! Snowflake is thread-safe. `clone` it before moving to another thread:
//! ```
//! use snowflake_cas::Snowflake;
//! use std::thread;
//!
//! let sf = Snowflake::new(1).unwrap();
//!
//! let mut children = Vec::new();
//! for _ in 0..10 {
//!     let thread_sf = sf.clone();
//!     children.push(thread::spawn(move || {
//!         println!("{}", thread_sf.next_id());
//!     }));
//! }
//!
//! for child in children {
//!     child.join().unwrap();
//! }
//! ```
//!
//! ## Worker ids
//!
//! Worker ids must be unique among all generators running at the same time.
//! This crate only checks that they fit in [`MAX_WORKER_ID`]; assigning them
//! is up to the caller.
//!
//! [Twitter's Snowflake]: https://blog.twitter.com/2010/announcing-snowflake

mod builder;
mod clock;
mod error;
mod snowflake;

pub use crate::snowflake::*;
pub use builder::*;
pub use clock::*;
pub use error::*;
