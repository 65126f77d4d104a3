//! Image capability
//!
//! Builds placeholder images from a prompt without calling any paid
//! generator. The colour, label and category are a pure function of the
//! prompt; only the cache-busting fallback URL varies between calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::prompts::{builtin, render};

use super::{AssistantAction, CapabilityReply};

pub const IMAGE_WIDTH: u32 = 1024;
pub const IMAGE_HEIGHT: u32 = 1024;

/// Longest label derived from free text
const MAX_LABEL_CHARS: usize = 20;

/// Generator verbs, articles and fillers removed before matching
const STOP_WORDS: &[&str] = &[
    "genera", "generar", "genérame", "crea", "crear", "créame", "dibuja", "dibujar", "dibújame",
    "muestra", "muéstrame", "mostrar", "imagen", "imágenes", "foto", "una", "un", "uno", "de",
    "del", "el", "la", "los", "las", "por", "favor", "me", "generate", "create", "draw", "show",
    "image", "picture", "of", "a", "an", "the",
];

struct ImageStyle {
    keywords: &'static [&'static str],
    category: &'static str,
    background: &'static str,
    foreground: &'static str,
    label: &'static str,
}

/// Checked in order; first keyword hit wins
const STYLES: &[ImageStyle] = &[
    ImageStyle {
        keywords: &["perro", "dog"],
        category: "animal",
        background: "8B4513",
        foreground: "FFFFFF",
        label: "🐕 PERRO",
    },
    ImageStyle {
        keywords: &["gato", "cat"],
        category: "animal",
        background: "FF8C00",
        foreground: "FFFFFF",
        label: "🐈 GATO",
    },
    ImageStyle {
        keywords: &["coche", "carro", "auto", "car"],
        category: "vehicle",
        background: "DC143C",
        foreground: "FFFFFF",
        label: "🚗 COCHE",
    },
    ImageStyle {
        keywords: &["casa", "house"],
        category: "building",
        background: "A0522D",
        foreground: "FFFFFF",
        label: "🏠 CASA",
    },
    ImageStyle {
        keywords: &["flor", "flower"],
        category: "nature",
        background: "FF69B4",
        foreground: "FFFFFF",
        label: "🌸 FLOR",
    },
    ImageStyle {
        keywords: &["árbol", "arbol", "tree"],
        category: "nature",
        background: "228B22",
        foreground: "FFFFFF",
        label: "🌳 ÁRBOL",
    },
    ImageStyle {
        keywords: &["sol", "sun"],
        category: "space",
        background: "FFD700",
        foreground: "000000",
        label: "☀️ SOL",
    },
    ImageStyle {
        keywords: &["luna", "moon"],
        category: "space",
        background: "191970",
        foreground: "FFFFFF",
        label: "🌙 LUNA",
    },
    ImageStyle {
        keywords: &["robot"],
        category: "technology",
        background: "708090",
        foreground: "FFFFFF",
        label: "🤖 ROBOT",
    },
    ImageStyle {
        keywords: &["música", "musica", "music"],
        category: "music",
        background: "9370DB",
        foreground: "FFFFFF",
        label: "🎵 MÚSICA",
    },
];

/// Fallback backgrounds for prompts that match no style
const PALETTE: [&str; 10] = [
    "FF6B6B", "4ECDC4", "45B7D1", "96CEB4", "FFEAA7", "DDA0DD", "98D8C8", "F7DC6F", "BB8FCE",
    "85C1E9",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticImage {
    pub prompt: String,
    pub clean_prompt: String,
    pub category: String,
    pub background_color: String,
    pub text_color: String,
    pub text: String,
    pub width: u32,
    pub height: u32,
    pub primary_url: String,
    pub alternative_urls: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Lowercase the prompt and drop stop words and punctuation
pub fn clean_prompt(prompt: &str) -> String {
    prompt
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_matches(word: &str, keyword: &str) -> bool {
    word == keyword
        || word
            .strip_prefix(keyword)
            .is_some_and(|rest| rest == "s" || rest == "es")
}

fn find_style(clean: &str) -> Option<&'static ImageStyle> {
    let words: Vec<&str> = clean.split_whitespace().collect();
    STYLES.iter().find(|style| {
        style
            .keywords
            .iter()
            .any(|k| words.iter().any(|w| word_matches(w, k)))
    })
}

/// Position-weighted rolling hash folded onto [`PALETTE`]. The first
/// character has weight zero.
pub fn palette_color(text: &str) -> &'static str {
    let mut hash: i32 = 0;
    for (i, c) in text.chars().enumerate() {
        let term = (c as i32).wrapping_mul(i as i32);
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(term);
    }
    PALETTE[(hash.unsigned_abs() % PALETTE.len() as u32) as usize]
}

fn fallback_label(clean: &str) -> String {
    if clean.is_empty() {
        return "IMAGEN".to_string();
    }
    clean.chars().take(MAX_LABEL_CHARS).collect::<String>().to_uppercase()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCapability;

impl ImageCapability {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, prompt: &str) -> SyntheticImage {
        let clean = clean_prompt(prompt);

        let (category, background, foreground, text) = match find_style(&clean) {
            Some(style) => (
                style.category.to_string(),
                style.background,
                style.foreground,
                style.label.to_string(),
            ),
            None => (
                "general".to_string(),
                palette_color(&clean),
                "FFFFFF",
                format!("🎨 {}", fallback_label(&clean)),
            ),
        };

        let now = Utc::now();
        let encoded = urlencoding::encode(&text);
        let primary_url = format!(
            "https://placehold.co/{}x{}/{}/{}/png?text={}",
            IMAGE_WIDTH, IMAGE_HEIGHT, background, foreground, encoded
        );
        let alternative_urls = vec![
            format!(
                "https://dummyimage.com/{}x{}/{}/{}.png&text={}",
                IMAGE_WIDTH, IMAGE_HEIGHT, background, foreground, encoded
            ),
            format!(
                "https://via.placeholder.com/{}x{}/{}/{}?text={}",
                IMAGE_WIDTH, IMAGE_HEIGHT, background, foreground, encoded
            ),
            format!(
                "https://picsum.photos/seed/{}/{}/{}?t={}",
                urlencoding::encode(if clean.is_empty() { "nexus" } else { clean.as_str() }),
                IMAGE_WIDTH,
                IMAGE_HEIGHT,
                now.timestamp_millis()
            ),
        ];

        SyntheticImage {
            prompt: prompt.to_string(),
            clean_prompt: clean,
            category,
            background_color: background.to_string(),
            text_color: foreground.to_string(),
            text,
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
            primary_url,
            alternative_urls,
            generated_at: now,
        }
    }

    pub fn handle(&self, prompt: &str, assistant_name: &str, address_form: &str) -> CapabilityReply {
        let image = self.generate(prompt);
        tracing::info!(category = %image.category, color = %image.background_color, "Synthesized image");

        CapabilityReply::text(render(builtin::IMAGE_READY, assistant_name, address_form, ""))
            .with_image(image.primary_url.clone())
            .with_action(AssistantAction::ShowImage { image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dog_prompt() {
        let image = ImageCapability::new().generate("genera una imagen de un perro");
        assert_eq!(image.clean_prompt, "perro");
        assert_eq!(image.category, "animal");
        assert_eq!(image.background_color, "8B4513");
        assert!(image.text.contains("PERRO"));
        assert!(image.primary_url.contains("/1024x1024/8B4513/"));
        assert_eq!(image.alternative_urls.len(), 3);
    }

    #[test]
    fn test_english_keywords_and_plurals() {
        let capability = ImageCapability::new();
        assert_eq!(capability.generate("draw a moon").background_color, "191970");
        assert_eq!(capability.generate("dibuja dos gatos").category, "animal");
        assert_eq!(capability.generate("muéstrame flores").background_color, "FF69B4");
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // "carta" is not a car, "soldado" is not the sun
        let image = ImageCapability::new().generate("dibuja una carta de un soldado");
        assert_eq!(image.category, "general");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let capability = ImageCapability::new();
        let a = capability.generate("Crea un paisaje futurista con montañas nevadas");
        let b = capability.generate("Crea un paisaje futurista con montañas nevadas");

        assert_eq!(
            (&a.background_color, &a.text, &a.category),
            (&b.background_color, &b.text, &b.category)
        );
        assert_eq!(a.primary_url, b.primary_url);
        assert_eq!(a.category, "general");
        assert!(PALETTE.contains(&a.background_color.as_str()));
        assert_eq!(a.text, "🎨 PAISAJE FUTURISTA CO");
    }

    #[test]
    fn test_palette_hash_weights_by_position() {
        // First character weighs zero: 0 * 31 + 'b' * 1 = 98
        assert_eq!(palette_color("ab"), PALETTE[8]);
        assert_eq!(palette_color("zb"), PALETTE[8]);
        assert_eq!(palette_color("a"), PALETTE[0]);
    }

    #[test]
    fn test_empty_prompt_still_renders() {
        let image = ImageCapability::new().generate("genera una imagen");
        assert_eq!(image.clean_prompt, "");
        assert_eq!(image.text, "🎨 IMAGEN");
        assert_eq!(image.background_color, PALETTE[0]);
    }

    #[test]
    fn test_handle_envelope() {
        let reply = ImageCapability::new().handle("dibuja un robot", "JARVIS", "señor");
        assert!(reply.success);
        assert!(reply.has_image);
        match reply.action {
            Some(AssistantAction::ShowImage { image }) => {
                assert_eq!(reply.image_url.as_deref(), Some(image.primary_url.as_str()));
                assert_eq!(image.category, "technology");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
