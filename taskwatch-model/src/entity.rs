use serde::{Deserialize, Deserializer};

use crate::error::{ModelError, Result};
use crate::ids::EntityId;

/// Parse an entity list the way batch tasks store it: either a JSON array
/// (`["a","b"]`) or a plain comma separated list.
pub fn parse_entity_list(raw: &str) -> Result<Vec<EntityId>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let ids: Vec<String> = serde_json::from_str(trimmed)
            .map_err(|_| ModelError::InvalidEntityList(raw.to_string()))?;
        return Ok(ids
            .into_iter()
            .filter(|id| !id.trim().is_empty())
            .map(EntityId::from)
            .collect());
    }

    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(EntityId::from)
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntityList {
    List(Vec<EntityId>),
    Encoded(String),
}

/// `deserialize_with` helper accepting `null`, an array, or a string that
/// encodes an array.
pub fn deserialize_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<EntityId>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawEntityList> = Option::deserialize(deserializer)?;
    let ids = match raw {
        None => return Ok(None),
        Some(RawEntityList::List(ids)) => ids,
        Some(RawEntityList::Encoded(encoded)) => {
            parse_entity_list(&encoded).map_err(serde::de::Error::custom)?
        }
    };

    if ids.is_empty() { Ok(None) } else { Ok(Some(ids)) }
}
