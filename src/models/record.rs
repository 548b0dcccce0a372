//! Catalog records as they are stored by the ingestion side.
//!
//! Only the fields the asset pipeline needs are modelled; everything else in
//! the stored JSON is ignored during deserialization.

use serde::{Deserialize, Deserializer, Serialize};

/// A game title with its cover art.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    /// Numeric title id. Stored as either a JSON string or number.
    #[serde(deserialize_with = "numeric_id")]
    pub title_id: u64,
    #[serde(default)]
    pub name: String,
    /// Remote cover-art URL.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub display_image: Option<String>,
}

impl Title {
    pub fn new(title_id: u64, name: impl Into<String>, display_image: Option<&str>) -> Self {
        Self {
            title_id,
            name: name.into(),
            display_image: display_image.map(str::to_string),
        }
    }
}

/// An achievement belonging to a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    /// Achievement id, unique within its title.
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(deserialize_with = "numeric_id")]
    pub title_id: u64,
    #[serde(default)]
    pub name: String,
    /// Remote icon URL.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub display_image: Option<String>,
}

impl Achievement {
    pub fn new(
        title_id: u64,
        id: impl Into<String>,
        name: impl Into<String>,
        display_image: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            title_id,
            name: name.into(),
            display_image: display_image.map(str::to_string),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

fn numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid numeric id: {:?}", s))),
    }
}

fn string_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n.to_string()),
        RawId::Text(s) => Ok(s),
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_accepts_string_id() {
        let title: Title = serde_json::from_str(
            r#"{"titleId": "1915865634", "name": "Forza", "displayImage": "http://img/x.png"}"#,
        )
        .unwrap();
        assert_eq!(title.title_id, 1915865634);
        assert_eq!(title.display_image.as_deref(), Some("http://img/x.png"));
    }

    #[test]
    fn test_title_accepts_numeric_id_and_ignores_extra_fields() {
        let title: Title = serde_json::from_str(
            r#"{"titleId": 42, "name": "Halo", "currentGamerscore": 100, "displayImage": ""}"#,
        )
        .unwrap();
        assert_eq!(title.title_id, 42);
        assert_eq!(title.display_image, None);
    }

    #[test]
    fn test_title_rejects_non_numeric_id() {
        let result: Result<Title, _> = serde_json::from_str(r#"{"titleId": "abc"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_achievement_numeric_achievement_id() {
        let achievement: Achievement = serde_json::from_str(
            r#"{"id": 7, "titleId": "42", "name": "First Blood", "displayImage": null}"#,
        )
        .unwrap();
        assert_eq!(achievement.id, "7");
        assert_eq!(achievement.title_id, 42);
        assert!(achievement.display_image.is_none());
    }
}
