use std::fmt;
use std::str::FromStr;

/// Accuracy/latency tradeoff selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum QualityLevel {
    /// Highest fidelity, most compute
    #[default]
    Accurate,
    Balanced,
    /// Lowest latency
    Fast,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 3] = [
        QualityLevel::Accurate,
        QualityLevel::Balanced,
        QualityLevel::Fast,
    ];

    /// Menu token used when declaring and parsing the selector
    pub fn name(self) -> &'static str {
        match self {
            QualityLevel::Accurate => "accurate",
            QualityLevel::Balanced => "balanced",
            QualityLevel::Fast => "fast",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityLevel::Accurate => "Accurate",
            QualityLevel::Balanced => "Balanced",
            QualityLevel::Fast => "Fast",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownQualityLevel(pub String);

impl fmt::Display for UnknownQualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown quality level {:?}", self.0)
    }
}

impl std::error::Error for UnknownQualityLevel {}

impl FromStr for QualityLevel {
    type Err = UnknownQualityLevel;

    /// Accepts menu names in any case, or the legacy menu index (0, 1, 2)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if let Ok(index) = token.parse::<usize>() {
            return Self::ALL
                .get(index)
                .copied()
                .ok_or_else(|| UnknownQualityLevel(s.to_string()));
        }

        Self::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownQualityLevel(s.to_string()))
    }
}

/// Engine-native configuration for one quality tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineQualityConfig {
    /// Width the frame is resized to before inference
    pub input_width: u32,
    /// Height the frame is resized to before inference
    pub input_height: u32,
    /// Internal downsampling applied by the matting network
    pub downsample_ratio: f32,
}

/// Map a quality tier to the engine configuration that implements it
pub fn resolve(level: QualityLevel) -> EngineQualityConfig {
    match level {
        QualityLevel::Accurate => EngineQualityConfig {
            input_width: 512,
            input_height: 512,
            downsample_ratio: 0.5,
        },
        QualityLevel::Balanced => EngineQualityConfig {
            input_width: 384,
            input_height: 384,
            downsample_ratio: 0.4,
        },
        QualityLevel::Fast => EngineQualityConfig {
            input_width: 256,
            input_height: 256,
            downsample_ratio: 0.25,
        },
    }
}
