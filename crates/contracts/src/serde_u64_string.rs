//! Serde codec for `u64` fields carried as JSON strings, so seeds survive
//! JavaScript consumers that truncate large integers. Deserialization also
//! accepts a plain number for hand-written configs.

use std::fmt;

use serde::de::{Error, Visitor};
use serde::{Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct U64OrString;

    impl Visitor<'_> for U64OrString {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a u64 or a decimal string")
        }

        fn visit_u64<E: Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_str<E: Error>(self, raw: &str) -> Result<u64, E> {
            raw.parse::<u64>().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(U64OrString)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Wrapper {
        #[serde(with = "super")]
        seed: u64,
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Wrapper { seed: 42 }).expect("serialize");
        assert_eq!(json, r#"{"seed":"42"}"#);
    }

    #[test]
    fn accepts_string_or_number() {
        let from_string: Wrapper = serde_json::from_str(r#"{"seed":"97"}"#).expect("string");
        let from_number: Wrapper = serde_json::from_str(r#"{"seed":97}"#).expect("number");
        assert_eq!(from_string, from_number);
    }
}
