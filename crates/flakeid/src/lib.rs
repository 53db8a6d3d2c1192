#![doc = include_str!("../README.md")]

extern crate alloc;

mod error;
mod generator;
mod id;
mod identity;
mod layout;
#[cfg(feature = "serde")]
mod serialize;
mod time;
#[cfg(feature = "serde")]
pub mod wire;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::identity::*;
pub use crate::layout::*;
#[cfg(feature = "serde")]
pub use crate::serialize::*;
pub use crate::time::*;
