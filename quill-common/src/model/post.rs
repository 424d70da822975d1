use crate::model::{
    Id,
    group::{GroupMarker, GroupSlug},
    user::{UserMarker, Username},
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;
use time::OffsetDateTime;

pub const IMAGE_UPLOAD_DIR: &str = "posts";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Id<UserMarker>,
    pub group: Option<Id<GroupMarker>>,
    pub text: Text,
    pub image: Option<ImageRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A post together with what is needed to link to it and its group.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct PostEntry {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: Username,
    pub group_slug: Option<GroupSlug>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
}

/// The author-editable part of a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostContent {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<ImageRef>,
}

/// Which posts a feed is made of.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    FollowedBy(Id<UserMarker>),
}

/// Non-blank post or comment text, stored with surrounding whitespace removed.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Text(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Text must not be blank")]
pub struct InvalidTextError;

impl Text {
    pub fn new(text: &str) -> Result<Self, InvalidTextError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Err(InvalidTextError)
        } else {
            Ok(Text(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Text::new(&inner).map_err(serde::de::Error::custom)
    }
}

/// Storage-relative path of an uploaded image, e.g. `posts/small.gif`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageRef(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The image reference is invalid: {0}")]
pub struct InvalidImageRefError(String);

impl ImageRef {
    pub fn new(path: String) -> Result<Self, InvalidImageRefError> {
        let valid = !path.is_empty()
            && !path.starts_with('/')
            && path
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

        if valid {
            Ok(ImageRef(path))
        } else {
            Err(InvalidImageRefError(path))
        }
    }

    /// Reference for a file in the upload directory of post images.
    pub fn in_upload_dir(file_name: &str) -> Result<Self, InvalidImageRefError> {
        Self::new(format!("{IMAGE_UPLOAD_DIR}/{file_name}"))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::{ImageRef, Text};

    #[test]
    fn text_is_trimmed_and_required() {
        assert_eq!(Text::new("  hello \n").unwrap().get(), "hello");
        assert!(Text::new("").is_err());
        assert!(Text::new(" \t\n").is_err());
    }

    #[test]
    fn image_refs_stay_relative() {
        assert_eq!(
            ImageRef::in_upload_dir("small.gif").unwrap().get(),
            "posts/small.gif"
        );
        for illegal in ["", "/etc/passwd", "posts/../secret", "posts//a.gif"] {
            assert!(ImageRef::new(illegal.to_owned()).is_err(), "{illegal}");
        }
    }
}
