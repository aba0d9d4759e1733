#![warn(rust_2018_idioms)]
#![allow(dead_code)]

#[cfg(feature = "marshal")]
pub mod marshal;

#[cfg(feature = "marshal")]
pub use crate::marshal::{Marshal, MarshalSize, Unmarshal};

mod error;
pub use error::{Error, Result};

#[cfg(feature = "sync")]
pub mod sync;
