mod deserialization;
mod macros;
mod serialization;

pub use deserialization::*;
pub use serialization::*;
