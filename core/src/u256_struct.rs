/// Generates a fixed-width 32 byte value type with equality, ordering,
/// hashing, hex encoding and a uniform random generator.
#[macro_export]
macro_rules! u256_struct {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn zero() -> Self {
                Self([0; 32])
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0; 32]
            }

            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                if bytes.len() != 32 {
                    return None;
                }
                let mut result = Self::zero();
                result.0.copy_from_slice(bytes);
                Some(result)
            }

            pub fn random() -> Self {
                use rand::Rng;
                Self(rand::thread_rng().gen())
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_bytes(self) -> [u8; 32] {
                self.0
            }

            /// The next value in big endian key order, None on overflow
            pub fn inc(&self) -> Option<Self> {
                let mut bytes = self.0;
                for byte in bytes.iter_mut().rev() {
                    let (result, overflow) = byte.overflowing_add(1);
                    *byte = result;
                    if !overflow {
                        return Some(Self(bytes));
                    }
                }
                None
            }

            pub fn encode_hex(&self) -> String {
                use std::fmt::Write;
                let mut result = String::with_capacity(64);
                for byte in self.0 {
                    write!(&mut result, "{:02X}", byte).unwrap();
                }
                result
            }

            pub fn decode_hex(s: impl AsRef<str>) -> anyhow::Result<Self> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s.as_ref(), &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                let mut result = Self::zero();
                result.0[24..].copy_from_slice(&value.to_be_bytes());
                result
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $crate::write_hex_bytes(&self.0, f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $crate::write_hex_bytes(&self.0, f)
            }
        }
    };
}
