pub mod binary;
pub mod string;
pub mod tag;

pub use aurorakit_core_derive::*;
