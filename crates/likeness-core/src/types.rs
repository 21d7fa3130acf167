use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("pixel buffer length {actual} does not match {width}x{height}")]
    InvalidLength {
        width: usize,
        height: usize,
        actual: usize,
    },
    #[error("dimensions {width}x{height} overflow the pixel count")]
    Overflow { width: usize, height: usize },
}

/// A person known to the library. Pure value: two people with the same
/// names are the same person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Composite lookup key, `first.last`.
    ///
    /// Not collision-free: `("A", "B.C")` and `("A.B", "C")` both map to
    /// `"A.B.C"` and overwrite one another in a store.
    pub fn key(&self) -> String {
        format!("{}.{}", self.first_name, self.last_name)
    }
}

/// Flattened grayscale intensity buffer in the 16-bit range `[0, 65535]`.
///
/// The buffer length always equals `width * height`; a zero-sized vector
/// is the "empty" vector carried by untrained identities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureVector")]
pub struct FeatureVector {
    width: usize,
    height: usize,
    pixels: Vec<f64>,
}

#[derive(Deserialize)]
struct RawFeatureVector {
    #[serde(default)]
    width: usize,
    #[serde(default)]
    height: usize,
    #[serde(default, deserialize_with = "null_as_empty")]
    pixels: Vec<f64>,
}

impl TryFrom<RawFeatureVector> for FeatureVector {
    type Error = VectorError;

    fn try_from(raw: RawFeatureVector) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height, raw.pixels)
    }
}

impl FeatureVector {
    pub fn new(width: usize, height: usize, pixels: Vec<f64>) -> Result<Self, VectorError> {
        let count = width
            .checked_mul(height)
            .ok_or(VectorError::Overflow { width, height })?;
        if pixels.len() != count {
            return Err(VectorError::InvalidLength {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A `width x height` vector with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<f64> {
        self.pixels
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// True when the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Detection artifacts come back with a zero width or height.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Build a vector of the same shape from a transformed buffer. The
    /// caller guarantees the length is unchanged.
    pub(crate) fn with_pixels(&self, pixels: Vec<f64>) -> Self {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        Self {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// Decode `null` (as older snapshots write nil slices) as an empty vec.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
