//! Validation of submitted forms.
//!
//! Forms are deserialized leniently (strings or numbers, every field optional)
//! so that a bad value becomes a field-level message instead of a rejected
//! body.
//! `clean` turns a form into typed values or the collected [`FormErrors`].

use crate::model::{
    Id,
    auth::{PASSWORD_MIN_LEN, Password},
    group::{Group, GroupMarker},
    post::Text,
    user::{Email, USERNAME_MAX_LEN, Username},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const EMPTY_FILE: &str = "The submitted file is empty.";
pub const UPLOAD_AND_CLEAR: &str =
    "Please either submit a file or check the clear checkbox, not both.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_LOGIN: &str = "Please enter a correct username and password.";

/// Key for errors that belong to the form as a whole.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const IMAGE_FILE_NAME_MAX_LEN: usize = 100;

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Error)]
#[error("The submitted form has invalid fields")]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    fn into_result<T>(self, value: Option<T>) -> Result<T, FormErrors> {
        match value {
            Some(value) if self.is_empty() => Ok(value),
            _ => Err(self),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ImageKind {
    Gif,
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl ImageKind {
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else if bytes.starts_with(b"BM") {
            Some(Self::Bmp)
        } else {
            None
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
        }
    }
}

/// An uploaded file as submitted: a client-side file name and base64 content.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct ImageUpload {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content: String,
}

/// A validated upload, ready to be written to the media store.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanImage {
    pub file_name: String,
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    fn clean(&self) -> Result<CleanImage, &'static str> {
        let bytes = BASE64_STANDARD
            .decode(self.content.trim())
            .map_err(|_| INVALID_IMAGE)?;
        if bytes.is_empty() {
            return Err(EMPTY_FILE);
        }
        let kind = ImageKind::sniff(&bytes).ok_or(INVALID_IMAGE)?;

        Ok(CleanImage {
            file_name: sanitize_file_name(&self.file_name, kind),
            kind,
            bytes,
        })
    }
}

/// Reduces a client-supplied name to a safe final path component.
#[must_use]
pub fn sanitize_file_name(file_name: &str, kind: ImageKind) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return format!("image.{}", kind.extension());
    }

    match cleaned.char_indices().nth(IMAGE_FILE_NAME_MAX_LEN) {
        Some((cut, _)) => cleaned[..cut].to_owned(),
        None => cleaned.to_owned(),
    }
}

/// What an edit does to the image already attached to a post.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ImageChange {
    Keep,
    Clear,
    Replace(CleanImage),
}

/// A submitted choice among records, checked against the available ones in
/// `clean`.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Choice {
    Id(u64),
    Negative(i64),
    Raw(String),
}

impl Choice {
    /// `None` if nothing was chosen at all.
    fn resolve<Marker>(&self) -> Option<Option<Id<Marker>>> {
        match self {
            Choice::Id(id) => Some(Some((*id).into())),
            Choice::Negative(_) => Some(None),
            Choice::Raw(raw) if raw.trim().is_empty() => None,
            Choice::Raw(raw) => Some(raw.trim().parse::<u64>().ok().map(Into::into)),
        }
    }
}

impl<Marker> From<Id<Marker>> for Choice {
    fn from(id: Id<Marker>) -> Self {
        Choice::Id(id.into())
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: Option<Choice>,
    #[serde(default, skip_serializing)]
    pub image: Option<ImageUpload>,
    #[serde(default)]
    pub clear_image: bool,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanPost {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: ImageChange,
}

impl PostForm {
    /// Validates against the groups a post may be filed under.
    pub fn clean(&self, groups: &[Group]) -> Result<CleanPost, FormErrors> {
        let mut errors = FormErrors::default();

        let text = Text::new(&self.text)
            .map_err(|_| errors.add("text", REQUIRED))
            .ok();

        let group = match self.group.as_ref().and_then(Choice::resolve) {
            None => None,
            Some(chosen) => {
                let group =
                    chosen.filter(|id| groups.iter().any(|candidate| candidate.id == *id));
                if group.is_none() {
                    errors.add("group", INVALID_CHOICE);
                }
                group
            }
        };

        let image = match (&self.image, self.clear_image) {
            (Some(_), true) => {
                errors.add("image", UPLOAD_AND_CLEAR);
                None
            }
            (Some(upload), false) => upload
                .clean()
                .map(ImageChange::Replace)
                .map_err(|message| errors.add("image", message))
                .ok(),
            (None, true) => Some(ImageChange::Clear),
            (None, false) => Some(ImageChange::Keep),
        };

        let clean = text.zip(image).map(|(text, image)| CleanPost { text, group, image });
        errors.into_result(clean)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn clean(&self) -> Result<Text, FormErrors> {
        Text::new(&self.text).map_err(|_| FormErrors::single("text", REQUIRED))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanSignup {
    pub username: Username,
    pub email: Email,
    pub password: Password,
}

impl SignupForm {
    pub fn clean(&self) -> Result<CleanSignup, FormErrors> {
        let mut errors = FormErrors::default();

        let username = if self.username.is_empty() {
            errors.add("username", REQUIRED);
            None
        } else if self.username.chars().count() > USERNAME_MAX_LEN {
            errors.add(
                "username",
                format!("Ensure this value has at most {USERNAME_MAX_LEN} characters."),
            );
            None
        } else {
            Username::new(self.username.clone())
                .map_err(|_| errors.add("username", INVALID_USERNAME))
                .ok()
        };

        let email = if self.email.is_empty() {
            errors.add("email", REQUIRED);
            None
        } else {
            Email::new(self.email.clone())
                .map_err(|_| errors.add("email", INVALID_EMAIL))
                .ok()
        };

        let password = if self.password.is_empty() {
            errors.add("password", REQUIRED);
            None
        } else {
            Password::new(self.password.clone())
                .map_err(|_| {
                    errors.add(
                        "password",
                        format!(
                            "This password is too short. It must contain at least {PASSWORD_MIN_LEN} characters."
                        ),
                    );
                })
                .ok()
        };

        let clean = match (username, email, password) {
            (Some(username), Some(email), Some(password)) => Some(CleanSignup {
                username,
                email,
                password,
            }),
            _ => None,
        };
        errors.into_result(clean)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl LoginForm {
    /// Only checks presence; whether the credentials match is up to the caller.
    pub fn clean(&self) -> Result<(Username, Password), FormErrors> {
        let mut errors = FormErrors::default();
        if self.username.is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let username = Username::new(self.username.clone())
            .map_err(|_| FormErrors::single(NON_FIELD_ERRORS, INVALID_LOGIN))?;
        Ok((username, Password::unchecked(self.password.clone())))
    }
}
