//! `serde(with = ...)` adapter for const-generic arrays.
//!
//! serde only implements its traits for a fixed list of array lengths, which
//! a `[T; D]` field with generic `D` cannot name.

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeTuple, Serializer};

pub fn serialize<S, T, const N: usize>(arr: &[T; N], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    let mut tup = s.serialize_tuple(N)?;
    for x in arr {
        tup.serialize_element(x)?;
    }
    tup.end()
}

pub fn deserialize<'de, De, T, const N: usize>(d: De) -> Result<[T; N], De::Error>
where
    De: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let v: Vec<T> = Vec::deserialize(d)?;
    let len = v.len();
    v.try_into().map_err(|_| {
        let expected = format!("an array of length {N}");
        de::Error::invalid_length(len, &expected.as_str())
    })
}
