mod serializer;

pub use serializer::*;

use std::io::{Cursor, Write};

use anyhow::Context;

pub trait Serialize: Sized {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()>;
}

impl Serialize for () {
    fn serialize(&self, _: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        Ok(())
    }
}

macro_rules! serialize_primitive_le {
    ($T:ty) => {
        impl Serialize for $T {
            fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
                serializer.write_bytes(&self.to_le_bytes())?;
                Ok(())
            }
        }
    };
}

serialize_primitive_le!(u8);
serialize_primitive_le!(u16);
serialize_primitive_le!(u32);
serialize_primitive_le!(u64);

serialize_primitive_le!(i8);
serialize_primitive_le!(i16);
serialize_primitive_le!(i32);
serialize_primitive_le!(i64);

serialize_primitive_le!(f32);
serialize_primitive_le!(f64);

impl<const N: usize> Serialize for [u8; N] {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        serializer.write_bytes(self)
    }
}

impl<T> Serialize for Vec<T>
where
    T: Serialize,
{
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        (self.len() as u32)
            .serialize(serializer)
            .context("cannot serialize length of array")?;
        for (i, element) in self.iter().enumerate() {
            element
                .serialize(serializer)
                .with_context(|| format!("cannot serialize array element at index {i}"))?;
        }
        Ok(())
    }
}

pub fn serialize(value: &impl Serialize) -> anyhow::Result<Vec<u8>> {
    let mut buffer = vec![];
    value.serialize(&mut Serializer::new(Cursor::new(&mut buffer)))?;
    Ok(buffer)
}
