/// Implements `Deserialize` and `Serialize` for a `bitflags!` type, storing the raw bits.
///
/// Unknown bits are retained rather than rejected; on-disk flag words routinely carry bits
/// this toolkit has no name for yet.
#[macro_export]
macro_rules! serializable_bitflags {
    ($T:ty) => {
        impl $crate::binary::Deserialize for $T {
            fn deserialize(
                deserializer: &mut $crate::binary::Deserializer<impl ::std::io::Read>,
            ) -> ::anyhow::Result<Self> {
                Ok(Self::from_bits_retain(deserializer.deserialize()?))
            }
        }

        impl $crate::binary::Serialize for $T {
            fn serialize(
                &self,
                serializer: &mut $crate::binary::Serializer<impl ::std::io::Write>,
            ) -> ::anyhow::Result<()> {
                $crate::binary::Serialize::serialize(&self.bits(), serializer)
            }
        }
    };
}
