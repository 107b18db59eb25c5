//! User and planner supplied options for the `sparser` format.
//!
//! Options arrive as a string map whose keys are compared case-insensitively.
//! [`FormatOptions`] resolves the keys this format understands and ignores the
//! rest, so newer hosts can pass options older builds do not know about.

use std::collections::HashMap;

use log::warn;

/// Option key for the output compression codec.
pub const COMPRESSION: &str = "compression";
/// Option key for the pushed-down filter expression, forwarded verbatim to the parser.
pub const FILTERS: &str = "filters";
/// Option key for the pushed-down projection list, forwarded verbatim to the parser.
pub const PROJECTIONS: &str = "projections";
/// Option key for the parser engine's connection port.
pub const PORT: &str = "port";

/// A string map with case-insensitive key lookup.
///
/// The original keys are kept so the map can be handed back to the host
/// unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaseInsensitiveMap {
    original: HashMap<String, String>,
    lowered: HashMap<String, String>,
}

impl CaseInsensitiveMap {
    pub fn new(options: HashMap<String, String>) -> Self {
        let lowered = options
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        Self {
            original: options,
            lowered,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lowered.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lowered.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.lowered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lowered.is_empty()
    }

    /// The map as it was supplied, with the original key casing.
    pub fn original(&self) -> &HashMap<String, String> {
        &self.original
    }
}

impl From<HashMap<String, String>> for CaseInsensitiveMap {
    fn from(options: HashMap<String, String>) -> Self {
        Self::new(options)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CaseInsensitiveMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Typed view over the options recognised by this format.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Canonical codec name, `None` when output is uncompressed.
    pub compression_codec: Option<String>,
    pub filter_expression: Option<String>,
    pub projection_list: Option<String>,
    pub port: Option<u16>,
}

impl FormatOptions {
    pub fn new(options: &CaseInsensitiveMap) -> Self {
        let compression_codec = options.get(COMPRESSION).and_then(canonical_codec_name);
        let port = options.get(PORT).and_then(|raw| match raw.trim().parse::<u16>() {
            Ok(port) => Some(port),
            Err(e) => {
                warn!("Ignoring option {PORT}={raw:?}: {e}");
                None
            }
        });
        Self {
            compression_codec,
            filter_expression: options.get(FILTERS).map(str::to_string),
            projection_list: options.get(PROJECTIONS).map(str::to_string),
            port,
        }
    }
}

/// Map a user supplied codec name onto the canonical registry name.
///
/// `none` and `uncompressed` disable compression. Names that are not known
/// aliases are lowercased and passed through; whether they resolve to a codec
/// is decided by [`crate::io::compression::codec_for_name`].
pub fn canonical_codec_name(name: &str) -> Option<String> {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "" | "none" | "uncompressed" => None,
        "gz" => Some("gzip".to_string()),
        "bz2" => Some("bzip2".to_string()),
        "zst" => Some("zstd".to_string()),
        "zlib" => Some("deflate".to_string()),
        _ => Some(name),
    }
}
