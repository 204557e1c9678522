//! Character-card records and the legacy/current JSON schemas.
//!
//! Two schemas exist in the wild:
//!
//! - **v2**: stored under the `chara` PNG keyword as Base64 of UTF-8 JSON.
//!   The JSON is either a flat legacy record or a `chara_card_v2` envelope.
//! - **v3**: stored under the `ccv3` keyword, Base64 of a `chara_card_v3`
//!   envelope (`{ "spec", "spec_version", "data": { .. } }`), optionally with
//!   sibling `chara-ext-asset_:<path>` chunks.
//!
//! [`normalize`] maps either schema onto one [`CharacterCard`];
//! [`to_schema_json`] goes the other way.

mod schema;

pub use schema::{RawCard, RawFields, V2Raw, V3Raw, normalize, to_schema_json};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// Asset path → raw text payload, in sorted order so output is reproducible.
pub type AssetMap = BTreeMap<String, String>;

/// Which card schema (and PNG keyword) a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardVersion {
    /// `chara` keyword, legacy schema.
    #[default]
    V2,
    /// `ccv3` keyword, current schema.
    V3,
}

impl CardVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }
}

impl fmt::Display for CardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "2" => Ok(Self::V2),
            "v3" | "3" => Ok(Self::V3),
            other => Err(format!("unknown card version '{other}' (expected v2 or v3)")),
        }
    }
}

/// Character data located inside a container, before schema mapping.
///
/// For [`CardVersion::V3`] the payload is already Base64-decoded JSON.
/// For [`CardVersion::V2`] it is the raw `chara` text, which by convention is
/// Base64 of the JSON; see [`decode_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterPayload {
    pub version: CardVersion,
    pub payload: String,
    pub assets: AssetMap,
}

/// Canonical character record. Absent source fields are empty, never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterCard {
    pub name: String,
    pub gender: String,
    pub description: String,
    pub full_description: String,
    pub personality: String,
    pub scenario: String,
    pub example_dialogue: String,
    pub creator_notes: String,
    pub system_prompt: String,
    pub post_history_instructions: String,
    pub alternate_greetings: Vec<String>,
    pub tags: Vec<String>,
    pub creator: String,
    pub character_version: String,
    pub first_mes: String,
}

/// Turn a located payload into card JSON text.
pub fn decode_payload(payload: &CharacterPayload) -> Result<String> {
    match payload.version {
        CardVersion::V3 => Ok(payload.payload.clone()),
        CardVersion::V2 => {
            let bytes = STANDARD.decode(payload.payload.trim())?;
            Ok(String::from_utf8(bytes)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn version_parses_loosely() {
        assert_eq!("v3".parse::<CardVersion>(), Ok(CardVersion::V3));
        assert_eq!(" V2 ".parse::<CardVersion>(), Ok(CardVersion::V2));
        assert_eq!("3".parse::<CardVersion>(), Ok(CardVersion::V3));
        assert!("v4".parse::<CardVersion>().is_err());
        assert_eq!(CardVersion::default(), CardVersion::V2);
        assert_eq!(CardVersion::V3.to_string(), "v3");
    }

    #[test]
    fn version_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CardVersion::V3).unwrap(), "\"v3\"");
        let v: CardVersion = serde_json::from_str("\"v2\"").unwrap();
        assert_eq!(v, CardVersion::V2);
    }

    #[test]
    fn card_serializes_camel_case() {
        let card = CharacterCard {
            first_mes: "Hello".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["firstMes"], "Hello");
        assert_eq!(json["alternateGreetings"], serde_json::json!([]));
        assert_eq!(json["fullDescription"], "");
    }

    #[test]
    fn decode_v2_payload_from_base64() {
        let payload = CharacterPayload {
            version: CardVersion::V2,
            payload: STANDARD.encode(r#"{"name":"Eve"}"#),
            assets: AssetMap::new(),
        };
        assert_eq!(decode_payload(&payload).unwrap(), r#"{"name":"Eve"}"#);
    }

    #[test]
    fn decode_v3_payload_passes_through() {
        let payload = CharacterPayload {
            version: CardVersion::V3,
            payload: r#"{"data":{}}"#.into(),
            assets: AssetMap::new(),
        };
        assert_eq!(decode_payload(&payload).unwrap(), r#"{"data":{}}"#);
    }

    #[test]
    fn decode_v2_rejects_raw_json() {
        let payload = CharacterPayload {
            version: CardVersion::V2,
            payload: r#"{"name":"Eve"}"#.into(),
            assets: AssetMap::new(),
        };
        assert!(matches!(decode_payload(&payload), Err(Error::Base64(_))));
    }
}
