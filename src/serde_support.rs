//! Serde helpers for fixed-size hashes.
//!
//! Hashes are written as byte strings by binary formats and as lowercase hex by human readable
//! formats. Each submodule is meant for `#[serde(with = "...")]`.

use std::fmt;

use serde::{
    de::{self, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

#[derive(Clone, Copy)]
struct HashRepr<const HASH_SIZE: usize>([u8; HASH_SIZE]);

impl<const HASH_SIZE: usize> Serialize for HashRepr<HASH_SIZE> {
    fn serialize<S>(&self, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if ser.is_human_readable() {
            ser.serialize_str(&hex::encode(self.0))
        } else {
            ser.serialize_bytes(&self.0)
        }
    }
}

struct HashVisitor<const HASH_SIZE: usize>;

impl<'de, const HASH_SIZE: usize> Visitor<'de> for HashVisitor<HASH_SIZE> {
    type Value = HashRepr<HASH_SIZE>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a {HASH_SIZE}-byte hash")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        <[u8; HASH_SIZE]>::try_from(v)
            .map(HashRepr)
            .map_err(|_| E::invalid_length(v.len(), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let bytes = hex::decode(v).map_err(E::custom)?;
        self.visit_bytes(&bytes)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut bytes = Vec::with_capacity(HASH_SIZE);
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        self.visit_bytes(&bytes)
    }
}

impl<'de, const HASH_SIZE: usize> Deserialize<'de> for HashRepr<HASH_SIZE> {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if de.is_human_readable() {
            de.deserialize_str(HashVisitor)
        } else {
            de.deserialize_bytes(HashVisitor)
        }
    }
}

pub mod hash {
    use super::*;

    pub fn serialize<S, const HASH_SIZE: usize>(
        hash: &[u8; HASH_SIZE],
        ser: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        HashRepr(*hash).serialize(ser)
    }

    pub fn deserialize<'de, D, const HASH_SIZE: usize>(de: D) -> Result<[u8; HASH_SIZE], D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(HashRepr::<HASH_SIZE>::deserialize(de)?.0)
    }
}

pub mod opt_hash {
    use super::*;

    pub fn serialize<S, const HASH_SIZE: usize>(
        hash: &Option<[u8; HASH_SIZE]>,
        ser: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hash.map(HashRepr).serialize(ser)
    }

    pub fn deserialize<'de, D, const HASH_SIZE: usize>(
        de: D,
    ) -> Result<Option<[u8; HASH_SIZE]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<HashRepr<HASH_SIZE>>::deserialize(de)?.map(|hash| hash.0))
    }
}

/// Child slots of an interior node, where `None` is an absent subtree.
pub mod hash_slots {
    use super::*;

    pub fn serialize<S, const HASH_SIZE: usize>(
        slots: &[Option<[u8; HASH_SIZE]>],
        ser: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ser.collect_seq(slots.iter().map(|slot| slot.map(HashRepr)))
    }

    pub fn deserialize<'de, D, const HASH_SIZE: usize>(
        de: D,
    ) -> Result<Vec<Option<[u8; HASH_SIZE]>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let slots = Vec::<Option<HashRepr<HASH_SIZE>>>::deserialize(de)?;
        Ok(slots.into_iter().map(|slot| slot.map(|hash| hash.0)).collect())
    }
}

pub mod hash_vec {
    use super::*;

    pub fn serialize<S, const HASH_SIZE: usize>(
        hashes: &[[u8; HASH_SIZE]],
        ser: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ser.collect_seq(hashes.iter().copied().map(HashRepr))
    }

    pub fn deserialize<'de, D, const HASH_SIZE: usize>(
        de: D,
    ) -> Result<Vec<[u8; HASH_SIZE]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hashes = Vec::<HashRepr<HASH_SIZE>>::deserialize(de)?;
        Ok(hashes.into_iter().map(|hash| hash.0).collect())
    }
}

/// Sibling hashes grouped by tree level.
pub mod hash_levels {
    use super::*;

    pub fn serialize<S, const HASH_SIZE: usize>(
        levels: &[Vec<[u8; HASH_SIZE]>],
        ser: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ser.collect_seq(
            levels
                .iter()
                .map(|level| level.iter().copied().map(HashRepr).collect::<Vec<_>>()),
        )
    }

    pub fn deserialize<'de, D, const HASH_SIZE: usize>(
        de: D,
    ) -> Result<Vec<Vec<[u8; HASH_SIZE]>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let levels = Vec::<Vec<HashRepr<HASH_SIZE>>>::deserialize(de)?;
        Ok(levels
            .into_iter()
            .map(|level| level.into_iter().map(|hash| hash.0).collect())
            .collect())
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::hash")]
        id: [u8; 2],
        #[serde(with = "super::opt_hash")]
        root: Option<[u8; 4]>,
        #[serde(with = "super::hash_slots")]
        slots: Vec<Option<[u8; 4]>>,
    }

    fn holder() -> Holder {
        Holder {
            id: [0xab, 0xcd],
            root: Some([0xde, 0xad, 0xbe, 0xef]),
            slots: vec![None, Some([1, 2, 3, 4])],
        }
    }

    #[test]
    fn test_binary_round_trip() {
        let bytes = bincode::serialize(&holder()).unwrap();
        assert_eq!(bincode::deserialize::<Holder>(&bytes).unwrap(), holder());
    }

    #[test]
    fn test_json_uses_hex() {
        let json = serde_json::to_string(&holder()).unwrap();
        assert_eq!(json, r#"{"id":"abcd","root":"deadbeef","slots":[null,"01020304"]}"#);
        assert_eq!(serde_json::from_str::<Holder>(&json).unwrap(), holder());
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let json = r#"{"id":"abcd","root":"deadbe","slots":[]}"#;
        assert!(serde_json::from_str::<Holder>(json).is_err());
    }
}
