use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

pub const GROUP_SLUG_MAX_LEN: usize = 50;
pub const GROUP_TITLE_MAX_LEN: usize = 200;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Group {
    pub id: Id<GroupMarker>,
    pub title: GroupTitle,
    pub slug: GroupSlug,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateGroup {
    pub title: GroupTitle,
    pub slug: GroupSlug,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupSlug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group slug is invalid: {0}")]
pub struct InvalidGroupSlugError(String);

impl GroupSlug {
    pub fn new(slug: String) -> Result<Self, InvalidGroupSlugError> {
        let allowed = slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if (1..=GROUP_SLUG_MAX_LEN).contains(&slug.len()) && allowed {
            Ok(GroupSlug(slug))
        } else {
            Err(InvalidGroupSlugError(slug))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for GroupSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupSlug {
    type Err = InvalidGroupSlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl<'de> Deserialize<'de> for GroupSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        GroupSlug::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"GroupSlug"))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupTitle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group title is invalid: {0}")]
pub struct InvalidGroupTitleError(String);

impl GroupTitle {
    pub fn new(title: String) -> Result<Self, InvalidGroupTitleError> {
        if (1..=GROUP_TITLE_MAX_LEN).contains(&title.chars().count()) {
            Ok(GroupTitle(title))
        } else {
            Err(InvalidGroupTitleError(title))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use crate::model::group::{GROUP_SLUG_MAX_LEN, GroupSlug, GroupTitle};

    #[test]
    fn slugs() {
        for legal in ["group-post", "test_group", "g1"] {
            assert!(GroupSlug::new(legal.to_owned()).is_ok(), "{legal}");
        }

        let too_long = "s".repeat(GROUP_SLUG_MAX_LEN + 1);
        for illegal in ["", "with space", "группа", "a/b", too_long.as_str()] {
            assert!(GroupSlug::new(illegal.to_owned()).is_err(), "{illegal}");
        }
    }

    #[test]
    fn titles() {
        assert!(GroupTitle::new("Группа с постом".to_owned()).is_ok());
        assert!(GroupTitle::new(String::new()).is_err());
    }
}
