//! Conversion profiles for common use cases.
//!
//! Profiles pick a [`ConversionConfig`] preset so users rarely need to touch
//! Parquet or index settings directly.

use std::fmt;
use std::str::FromStr;

use qpx::convert::ConversionConfig;

/// Conversion profiles for common use cases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    /// Prioritize speed over compression.
    ///
    /// - Compression: Snappy
    /// - Transform batch: 50,000 records
    Fast,

    /// Balance between speed and compression (default).
    ///
    /// - Compression: ZSTD level 3
    /// - Transform batch: 10,000 records
    #[default]
    Balanced,

    /// Maximum compression, slower conversion.
    ///
    /// - Compression: ZSTD level 19
    /// - Row group size: 500,000 rows
    MaxCompression,

    /// Small batches and a single index thread
    LowMemory,
}

impl Profile {
    /// Base configuration for this profile
    pub fn config(&self) -> ConversionConfig {
        match self {
            Profile::Fast => ConversionConfig::fast_write(),
            Profile::Balanced => ConversionConfig::balanced(),
            Profile::MaxCompression => ConversionConfig::max_compression(),
            Profile::LowMemory => ConversionConfig::low_memory(),
        }
    }

    /// Returns all available profile names.
    pub fn variants() -> &'static [&'static str] {
        &["fast", "balanced", "max-compression", "low-memory"]
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Fast => write!(f, "fast"),
            Profile::Balanced => write!(f, "balanced"),
            Profile::MaxCompression => write!(f, "max-compression"),
            Profile::LowMemory => write!(f, "low-memory"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Profile::Fast),
            "balanced" | "default" => Ok(Profile::Balanced),
            "max-compression" | "maxcompression" | "max" => Ok(Profile::MaxCompression),
            "low-memory" | "lowmemory" => Ok(Profile::LowMemory),
            _ => Err(format!(
                "Unknown profile '{}'. Valid options: {}",
                s,
                Profile::variants().join(", ")
            )),
        }
    }
}
