use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper for prompt IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromptId(pub u32);

/// Identifier of one image in the corpus (usually its file name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A surreal statement shown alongside one pair of images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
}

impl Prompt {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Self {
            id: PromptId(id),
            text: text.into(),
        }
    }
}

/// A prompt bound to exactly two mutually exclusive image choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePairing {
    pub prompt_id: PromptId,
    pub image_a: ImageId,
    pub image_b: ImageId,
}

impl ImagePairing {
    pub fn contains(&self, image: &ImageId) -> bool {
        &self.image_a == image || &self.image_b == image
    }

    /// The other image of the pair, if `image` belongs to it.
    pub fn sibling_of(&self, image: &ImageId) -> Option<&ImageId> {
        if &self.image_a == image {
            Some(&self.image_b)
        } else if &self.image_b == image {
            Some(&self.image_a)
        } else {
            None
        }
    }

    pub fn images(&self) -> [&ImageId; 2] {
        [&self.image_a, &self.image_b]
    }
}

/// An image as the layout engine sees it: identity plus natural proportion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: ImageId,
    /// Width divided by height.
    pub aspect_ratio: f64,
}
