//! Intent classification
//!
//! Maps an utterance plus the mode flags to exactly one capability. Predicates
//! are evaluated in a fixed order and the first match wins. The two routing
//! variants differ only in where the intelligent-mode gate sits and which
//! image keywords apply.

use serde::{Deserialize, Serialize};

use crate::config::RoutingVariant;

const WEATHER_KEYWORDS: &[&str] = &["clima", "tiempo", "temperatura", "lluvia", "sol", "pronóstico"];

const MUSIC_KEYWORDS: &[&str] = &["música", "reproduce", "playlist"];

const IMAGE_KEYWORDS: &[&str] = &[
    "genera",
    "crear imagen",
    "dibuja",
    "imagen de",
    "muestra",
    "muéstrame",
];

const IMAGE_KEYWORDS_MCP: &[&str] = &["genera", "imagen", "dibuja", "crea"];

/// Mode flags sent with each utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modes {
    pub intelligent: bool,
    pub functional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Functional mode on, intelligent mode off
    FunctionalOnly,
    /// Both modes off
    IntelligenceDisabled,
}

/// Genres and eras that map straight to a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Eighties,
    Rock,
    Pop,
    Jazz,
    Classical,
    Electronic,
}

impl Genre {
    pub const ALL: [Genre; 6] = [
        Genre::Eighties,
        Genre::Rock,
        Genre::Pop,
        Genre::Jazz,
        Genre::Classical,
        Genre::Electronic,
    ];

    /// Trigger word, also used as the playlist search query
    pub fn keyword(&self) -> &'static str {
        match self {
            Genre::Eighties => "80",
            Genre::Rock => "rock",
            Genre::Pop => "pop",
            Genre::Jazz => "jazz",
            Genre::Classical => "clásica",
            Genre::Electronic => "electrónica",
        }
    }

    fn detect(text: &str) -> Option<Genre> {
        Self::ALL.into_iter().find(|g| text.contains(g.keyword()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Blocked { reason: BlockReason },
    Weather,
    Music { genre: Genre },
    Image,
    Chat,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Blocked { .. } => "blocked",
            Intent::Weather => "weather",
            Intent::Music { .. } => "music",
            Intent::Image => "image",
            Intent::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier {
    variant: RoutingVariant,
}

impl IntentClassifier {
    pub fn new(variant: RoutingVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> RoutingVariant {
        self.variant
    }

    pub fn classify(&self, utterance: &str, modes: Modes) -> Intent {
        let text = utterance.to_lowercase();

        match self.variant {
            RoutingVariant::Chat => {
                if let Some(blocked) = gate(modes) {
                    return blocked;
                }
                if let Some(intent) = media_intent(&text) {
                    return intent;
                }
                if contains_any(&text, IMAGE_KEYWORDS) {
                    return Intent::Image;
                }
            }
            RoutingVariant::Mcp => {
                if let Some(intent) = media_intent(&text) {
                    return intent;
                }
                if let Some(blocked) = gate(modes) {
                    return blocked;
                }
                if contains_any(&text, IMAGE_KEYWORDS_MCP) {
                    return Intent::Image;
                }
            }
        }

        Intent::Chat
    }
}

fn gate(modes: Modes) -> Option<Intent> {
    if modes.intelligent {
        return None;
    }
    let reason = if modes.functional {
        BlockReason::FunctionalOnly
    } else {
        BlockReason::IntelligenceDisabled
    };
    Some(Intent::Blocked { reason })
}

/// Weather, then music with a recognised genre. Music without one falls through.
fn media_intent(text: &str) -> Option<Intent> {
    if contains_any(text, WEATHER_KEYWORDS) {
        return Some(Intent::Weather);
    }
    if contains_any(text, MUSIC_KEYWORDS) {
        return Genre::detect(text).map(|genre| Intent::Music { genre });
    }
    None
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ON: Modes = Modes {
        intelligent: true,
        functional: false,
    };

    const FUNCTIONAL: Modes = Modes {
        intelligent: false,
        functional: true,
    };

    const OFF: Modes = Modes {
        intelligent: false,
        functional: false,
    };

    fn chat() -> IntentClassifier {
        IntentClassifier::new(RoutingVariant::Chat)
    }

    fn mcp() -> IntentClassifier {
        IntentClassifier::new(RoutingVariant::Mcp)
    }

    #[test]
    fn test_gate_blocks_everything_in_chat_variant() {
        for utterance in ["clima en Madrid", "reproduce música de los 80", "hola"] {
            assert_eq!(
                chat().classify(utterance, FUNCTIONAL),
                Intent::Blocked {
                    reason: BlockReason::FunctionalOnly
                }
            );
            assert_eq!(
                chat().classify(utterance, OFF),
                Intent::Blocked {
                    reason: BlockReason::IntelligenceDisabled
                }
            );
        }
    }

    #[test]
    fn test_weather_wins_over_other_keywords() {
        assert_eq!(chat().classify("clima en Madrid", ON), Intent::Weather);
        assert_eq!(
            chat().classify("genera una imagen del pronóstico", ON),
            Intent::Weather
        );
        assert_eq!(
            chat().classify("reproduce música para la lluvia", ON),
            Intent::Weather
        );
    }

    #[test]
    fn test_music_with_genre() {
        assert_eq!(
            chat().classify("reproduce música de los 80", ON),
            Intent::Music {
                genre: Genre::Eighties
            }
        );
        assert_eq!(
            chat().classify("Pon mi playlist de JAZZ", ON),
            Intent::Music { genre: Genre::Jazz }
        );
        assert_eq!(
            chat().classify("música clásica, por favor", ON),
            Intent::Music {
                genre: Genre::Classical
            }
        );
    }

    #[test]
    fn test_music_without_genre_falls_through() {
        assert_eq!(chat().classify("reproduce algo bonito", ON), Intent::Chat);
        assert_eq!(
            chat().classify("reproduce y muéstrame la portada", ON),
            Intent::Image
        );
    }

    #[test]
    fn test_image_keywords() {
        assert_eq!(
            chat().classify("genera una imagen de un perro", ON),
            Intent::Image
        );
        assert_eq!(chat().classify("dibuja un gato", ON), Intent::Image);
        // "crea" alone is only an image trigger in the MCP variant
        assert_eq!(chat().classify("crea un robot", ON), Intent::Chat);
        assert_eq!(mcp().classify("crea un robot", ON), Intent::Image);
    }

    #[test]
    fn test_default_is_chat() {
        assert_eq!(chat().classify("¿quién escribió el Quijote?", ON), Intent::Chat);
    }

    #[test]
    fn test_mcp_checks_media_before_gate() {
        assert_eq!(mcp().classify("clima en Madrid", OFF), Intent::Weather);
        assert_eq!(
            mcp().classify("reproduce música de los 80", FUNCTIONAL),
            Intent::Music {
                genre: Genre::Eighties
            }
        );
        assert_eq!(
            mcp().classify("dibuja un gato", FUNCTIONAL),
            Intent::Blocked {
                reason: BlockReason::FunctionalOnly
            }
        );
    }

    #[test]
    fn test_intent_serialization() {
        let json = serde_json::to_value(Intent::Music { genre: Genre::Rock }).unwrap();
        assert_eq!(json["kind"], "music");
        assert_eq!(json["genre"], "rock");
    }
}
