use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{CardVersion, CharacterCard};
use crate::error::Result;

/// Card JSON as found in the wild, discriminated by shape.
///
/// A top-level `data` object marks the current (envelope) layout; anything
/// else is read as a flat legacy record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawCard {
    V3(V3Raw),
    V2(V2Raw),
}

/// Envelope layout: `{ "spec": .., "spec_version": .., "data": { .. } }`.
#[derive(Debug, Deserialize)]
pub struct V3Raw {
    #[serde(default, deserialize_with = "lenient_string")]
    pub spec: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub spec_version: Option<String>,
    pub data: RawFields,
}

/// Flat legacy layout: the fields sit at the top level.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct V2Raw(pub RawFields);

/// Every source field either schema may carry, including legacy aliases.
#[derive(Debug, Default, Deserialize)]
pub struct RawFields {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub char_persona: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub personality: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scenario: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub world_scenario: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mes_example: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub example_dialogue: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator_notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub system_prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub system: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub post_history_instructions: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub alternate_greetings: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub character_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_mes: Option<String>,
}

// Strings pass through, scalars are stringified, null and containers count as absent.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) if !s.is_empty() => Some(vec![s]),
        _ => None,
    })
}

fn first_non_empty(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn text(field: &Option<String>) -> String {
    field.clone().unwrap_or_default()
}

impl RawCard {
    /// The schema this record's shape corresponds to.
    pub fn version(&self) -> CardVersion {
        match self {
            Self::V3(_) => CardVersion::V3,
            Self::V2(_) => CardVersion::V2,
        }
    }

    pub fn into_card(self) -> CharacterCard {
        let fields = match self {
            Self::V3(envelope) => {
                log::debug!(
                    "Card envelope spec={} version={}",
                    envelope.spec.as_deref().unwrap_or("-"),
                    envelope.spec_version.as_deref().unwrap_or("-")
                );
                envelope.data
            }
            Self::V2(V2Raw(fields)) => fields,
        };
        fields.into_card()
    }
}

impl RawFields {
    fn into_card(self) -> CharacterCard {
        let f = &self;
        CharacterCard {
            name: text(&f.name),
            gender: text(&f.gender),
            description: first_non_empty(&[&f.description, &f.char_persona]),
            full_description: first_non_empty(&[
                &f.personality,
                &f.full_description,
                &f.char_persona,
            ]),
            personality: first_non_empty(&[&f.personality, &f.char_persona]),
            scenario: first_non_empty(&[&f.scenario, &f.world_scenario]),
            example_dialogue: first_non_empty(&[&f.mes_example, &f.example_dialogue]),
            creator_notes: text(&f.creator_notes),
            system_prompt: first_non_empty(&[&f.system_prompt, &f.system]),
            post_history_instructions: text(&f.post_history_instructions),
            alternate_greetings: f.alternate_greetings.clone().unwrap_or_default(),
            tags: f.tags.clone().unwrap_or_default(),
            creator: text(&f.creator),
            character_version: text(&f.character_version),
            first_mes: text(&f.first_mes),
        }
    }
}

/// Map card JSON of either schema onto a [`CharacterCard`].
///
/// Invalid JSON, or JSON that does not describe a record, is an
/// [`Error::Json`](crate::Error::Json).
pub fn normalize(raw_json: &str) -> Result<CharacterCard> {
    let raw: RawCard = serde_json::from_str(raw_json)?;
    Ok(raw.into_card())
}

#[derive(Serialize)]
struct Envelope<'a> {
    spec: &'static str,
    spec_version: &'static str,
    data: EnvelopeData<'a>,
}

#[derive(Serialize)]
struct EnvelopeData<'a> {
    name: &'a str,
    description: &'a str,
    personality: &'a str,
    scenario: &'a str,
    first_mes: &'a str,
    mes_example: &'a str,
    creator_notes: &'a str,
    system_prompt: &'a str,
    post_history_instructions: &'a str,
    alternate_greetings: &'a [String],
    tags: &'a [String],
    creator: &'a str,
    character_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_only_greetings: Option<&'a [String]>,
    extensions: serde_json::Map<String, Value>,
}

/// Serialize a card into the `chara_card_v2` or `chara_card_v3` envelope.
///
/// `fullDescription` has no slot in either schema; reading the output back
/// derives it from `personality` again.
pub fn to_schema_json(card: &CharacterCard, version: CardVersion) -> Result<String> {
    let (spec, spec_version, group_only_greetings) = match version {
        CardVersion::V2 => ("chara_card_v2", "2.0", None),
        CardVersion::V3 => ("chara_card_v3", "3.0", Some(&[][..])),
    };

    let envelope = Envelope {
        spec,
        spec_version,
        data: EnvelopeData {
            name: &card.name,
            description: &card.description,
            personality: &card.personality,
            scenario: &card.scenario,
            first_mes: &card.first_mes,
            mes_example: &card.example_dialogue,
            creator_notes: &card.creator_notes,
            system_prompt: &card.system_prompt,
            post_history_instructions: &card.post_history_instructions,
            alternate_greetings: &card.alternate_greetings,
            tags: &card.tags,
            creator: &card.creator,
            character_version: &card.character_version,
            gender: (!card.gender.is_empty()).then_some(card.gender.as_str()),
            group_only_greetings,
            extensions: serde_json::Map::new(),
        },
    };

    Ok(serde_json::to_string(&envelope)?)
}
