// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Explicit little-endian integer wrappers for wire formats: DUT vectors,
//! `gcore` ioctl argument structs and the RAW stimulus container all mix
//! host-order bookkeeping fields with little-endian wire fields, so the
//! wire ones are spelled out as their own type to avoid silent host-order
//! bugs on a big-endian host.

use std::fmt;

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

macro_rules! le_int {
    ($name:ident, $native:ty) => {
        #[derive(
            Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsBytes, FromBytes, FromZeroes,
        )]
        #[repr(transparent)]
        pub struct $name($native);

        impl $name {
            pub fn to_native(self) -> $native {
                <$native>::from_le(self.0)
            }
        }

        impl From<$native> for $name {
            fn from(v: $native) -> Self {
                $name(v.to_le())
            }
        }

        impl From<$name> for $native {
            fn from(v: $name) -> Self {
                v.to_native()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_native())
            }
        }
    };
}

le_int!(Le16, u16);
le_int!(Le32, u32);
le_int!(Le64, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le32_round_trips_native_value() {
        let v: Le32 = 0xdead_beefu32.into();
        assert_eq!(u32::from(v), 0xdead_beef);
        assert_eq!(v.as_bytes(), &0xdead_beefu32.to_le_bytes());
    }
}
