//! Style tags and duration presets offered when composing a request.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    Genre,
    Mood,
    Instruments,
    Vocals,
    Tempo,
}

impl TagCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Genre => "genre",
            Self::Mood => "mood",
            Self::Instruments => "instruments",
            Self::Vocals => "vocals",
            Self::Tempo => "tempo",
        }
    }
}

pub const STYLE_TAGS: &[(TagCategory, &[&str])] = &[
    (
        TagCategory::Genre,
        &[
            "pop",
            "rock",
            "hip-hop",
            "r&b",
            "jazz",
            "classical",
            "electronic",
            "country",
            "folk",
            "metal",
            "punk",
            "blues",
            "soul",
            "reggae",
            "latin",
            "indie",
        ],
    ),
    (
        TagCategory::Mood,
        &[
            "happy",
            "sad",
            "energetic",
            "calm",
            "romantic",
            "dark",
            "uplifting",
            "melancholic",
            "aggressive",
            "dreamy",
            "nostalgic",
            "epic",
        ],
    ),
    (
        TagCategory::Instruments,
        &[
            "piano",
            "guitar",
            "drums",
            "bass",
            "synthesizer",
            "violin",
            "trumpet",
            "saxophone",
            "flute",
            "organ",
            "ukulele",
            "cello",
        ],
    ),
    (
        TagCategory::Vocals,
        &[
            "male vocal",
            "female vocal",
            "duet",
            "choir",
            "rap",
            "whisper",
            "falsetto",
            "opera",
        ],
    ),
    (
        TagCategory::Tempo,
        &["slow", "medium tempo", "fast", "uptempo"],
    ),
];

/// `(label, max_length_ms)` presets.
pub const DURATION_OPTIONS: &[(&str, u32)] = &[
    ("30s", 30_000),
    ("1 min", 60_000),
    ("2 min", 120_000),
    ("3 min", 180_000),
    ("4 min", 240_000),
];

pub fn category_of(tag: &str) -> Option<TagCategory> {
    STYLE_TAGS
        .iter()
        .find(|(_, tags)| tags.contains(&tag))
        .map(|(category, _)| *category)
}

/// Resolves a duration preset label such as `"2 min"`.
pub fn duration_preset(label: &str) -> Option<u32> {
    DURATION_OPTIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label.trim()))
        .map(|(_, ms)| *ms)
}
