use quill_common::{
    form::{CleanImage, ImageChange},
    model::post::{IMAGE_UPLOAD_DIR, ImageRef, InvalidImageRefError},
};
use rand::{Rng, distr::Alphanumeric};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

const SAVE_ATTEMPTS: usize = 16;
const SUFFIX_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Could not write uploaded file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reference(#[from] InvalidImageRefError),
    #[error("No free file name for {0}")]
    Exhausted(String),
}

/// Uploaded images on the local filesystem, under `<root>/posts/`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_of(&self, image: &ImageRef) -> PathBuf {
        self.root.join(image.get())
    }

    /// Writes the image without overwriting anything; a name that is taken
    /// gets a random suffix.
    pub async fn save(&self, image: &CleanImage) -> Result<ImageRef, MediaError> {
        let directory = self.root.join(IMAGE_UPLOAD_DIR);
        fs::create_dir_all(&directory).await?;

        for attempt in 0..SAVE_ATTEMPTS {
            let file_name = if attempt == 0 {
                image.file_name.clone()
            } else {
                with_random_suffix(&image.file_name)
            };

            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(directory.join(&file_name))
                .await;
            match file {
                Ok(mut file) => {
                    file.write_all(&image.bytes).await?;
                    file.flush().await?;
                    debug!(file_name, bytes = image.bytes.len(), "Stored uploaded image");
                    return Ok(ImageRef::in_upload_dir(&file_name)?);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }
        }

        Err(MediaError::Exhausted(image.file_name.clone()))
    }

    pub async fn remove(&self, image: &ImageRef) -> Result<(), MediaError> {
        fs::remove_file(self.path_of(image)).await?;
        debug!(%image, "Removed uploaded image");
        Ok(())
    }

    /// Applies `change` to the `current` image and hands the result to
    /// `write`. A file saved here is removed again if `write` fails.
    pub async fn apply<T, E, F, Fut>(
        &self,
        change: ImageChange,
        current: Option<ImageRef>,
        write: F,
    ) -> Result<T, E>
    where
        E: From<MediaError>,
        F: FnOnce(Option<ImageRef>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let saved = match change {
            ImageChange::Keep => return write(current).await,
            ImageChange::Clear => return write(None).await,
            ImageChange::Replace(image) => self.save(&image).await?,
        };

        let result = write(Some(saved.clone())).await;
        if result.is_err()
            && let Err(err) = self.remove(&saved).await
        {
            warn!(%err, image = %saved, "Could not remove image of a failed write");
        }
        result
    }
}

fn with_random_suffix(file_name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();

    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}_{suffix}.{extension}"),
        _ => format!("{file_name}_{suffix}"),
    }
}
