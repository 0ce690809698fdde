//! Work categories and file-type classification.

use std::fmt;
use std::path::Path;

use crate::error::PayloadError;

const TEXT_EXTENSIONS: &[&str] = &["txt"];
const MEDIA_EXTENSIONS: &[&str] = &["wav", "mp3", "jpg", "jpeg", "png"];

/// The two kinds of worker a coordinator can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Text,
    Media,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Text, Category::Media];

    /// Wire spelling, as used in payloads and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Text => "Text",
            Category::Media => "Media",
        }
    }

    /// Classify a file by its extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Some(Category::Text)
        } else if MEDIA_EXTENSIONS.contains(&ext.as_str()) {
            Some(Category::Media)
        } else {
            None
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Text => 0,
            Category::Media => 1,
        }
    }
}

impl std::str::FromStr for Category {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("text") {
            Ok(Category::Text)
        } else if s.eq_ignore_ascii_case("media") {
            Ok(Category::Media)
        } else {
            Err(PayloadError::UnknownCategory(s.to_string()))
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
