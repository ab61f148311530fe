use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRefError {
    #[error("image reference must not be empty")]
    Empty,
    #[error("image reference must be relative to the assets directory")]
    Absolute,
    #[error("image reference must use '/' separators")]
    Backslash,
    #[error("image reference must not contain '..'")]
    ParentTraversal,
    #[error("image reference contains invalid character '{character}'")]
    InvalidCharacter { character: char },
}

/// Checks that a level-provided image path stays inside the asset tree.
pub(crate) fn validate_image_ref(image: &str) -> Result<(), ImageRefError> {
    if image.is_empty() {
        return Err(ImageRefError::Empty);
    }
    if image.starts_with('/') {
        return Err(ImageRefError::Absolute);
    }
    if image.contains('\\') {
        return Err(ImageRefError::Backslash);
    }
    if image.contains("..") {
        return Err(ImageRefError::ParentTraversal);
    }
    for ch in image.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '/' | '-' | '.') {
            continue;
        }
        return Err(ImageRefError::InvalidCharacter { character: ch });
    }
    Ok(())
}
