#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod error;
pub mod extension;
pub mod header;
pub mod packet;
pub mod redundancy;
pub mod sequence;

pub use error::{Error, Result};
