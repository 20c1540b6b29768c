//! Data-driven caption styles.
//!
//! A style is a plain description: typography for normal and highlighted
//! words, where the caption sits, how words are grouped, which word is
//! highlighted, and how the caption animates in and out. The frame renderer
//! in [`crate::track`] interprets it; nothing here is executable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Style used when a requested id is unknown.
pub const FALLBACK_STYLE_ID: &str = "heat-glow";

/// Where the caption block is anchored on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Bottom-centre, 80 px above the edge
    Bottom,
    Center,
}

/// How transcript words are split into on-screen captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "size", rename_all = "snake_case")]
pub enum Grouping {
    /// Groups of roughly this many words
    Group(usize),
    /// One word at a time
    SingleWord,
}

/// Which words of the visible group get the active look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    /// Every word whose own window contains the frame
    ActiveWord,
    /// The most recently started word, held until the next one starts
    CurrentWord,
    None,
}

/// Critically or under-damped spring with unit mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub stiffness: f64,
    pub damping: f64,
}

impl Spring {
    pub const SNAPPY: Spring = Spring {
        stiffness: 200.0,
        damping: 20.0,
    };

    /// Displacement from 0 toward 1 after `elapsed_frames`.
    ///
    /// Negative elapsed time means the spring has not been released yet.
    pub fn value(&self, elapsed_frames: f64, fps: u32) -> f64 {
        if elapsed_frames <= 0.0 || fps == 0 {
            return 0.0;
        }
        let t = elapsed_frames / fps as f64;
        let omega = self.stiffness.max(f64::EPSILON).sqrt();
        let zeta = self.damping / (2.0 * omega);

        if zeta < 1.0 {
            let omega_d = omega * (1.0 - zeta * zeta).sqrt();
            let decay = (-zeta * omega * t).exp();
            1.0 - decay * ((omega_d * t).cos() + (zeta * omega / omega_d) * (omega_d * t).sin())
        } else if zeta == 1.0 {
            1.0 - (-omega * t).exp() * (1.0 + omega * t)
        } else {
            let root = (zeta * zeta - 1.0).sqrt();
            let r1 = -omega * (zeta - root);
            let r2 = -omega * (zeta + root);
            1.0 + (r2 * (r1 * t).exp() - r1 * (r2 * t).exp()) / (r1 - r2)
        }
    }
}

/// Entrance and exit behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Animation {
    /// Linear opacity ramps over the first and last frames of a group
    Fade { in_frames: u32, out_frames: u32 },
    /// Spring scale-up from `from_scale` when a caption appears
    Pop { from_scale: f64, spring: Spring },
}

/// Typography of a word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLook {
    pub font_family: String,
    pub font_weight: u16,
    pub font_size: u32,
    pub color: String,
    #[serde(default)]
    pub italic: bool,
    /// CSS `filter` glow, e.g. `drop-shadow(0 0 20px #FF3B30)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_shadow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<String>,
}

impl TextLook {
    fn sans(weight: u16, size: u32, color: &str) -> Self {
        Self {
            font_family: "system-ui, sans-serif".to_string(),
            font_weight: weight,
            font_size: size,
            color: color.to_string(),
            italic: false,
            glow: None,
            stroke: None,
            text_shadow: None,
            letter_spacing: None,
        }
    }

    fn glow(mut self, glow: &str) -> Self {
        self.glow = Some(glow.to_string());
        self
    }

    fn shadow(mut self, shadow: &str) -> Self {
        self.text_shadow = Some(shadow.to_string());
        self
    }

    fn stroke(mut self, stroke: &str) -> Self {
        self.stroke = Some(stroke.to_string());
        self
    }
}

/// A complete caption style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionStyle {
    pub id: String,
    pub position: Position,
    /// Horizontal gap between words in pixels
    pub gap: u32,
    pub grouping: Grouping,
    pub highlight: Highlight,
    pub animation: Animation,
    pub text: TextLook,
    /// Look of highlighted words; `None` keeps the base look
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_text: Option<TextLook>,
    /// Whether emoji cues are drawn
    #[serde(default)]
    pub emoji_overlays: bool,
}

fn heat_glow() -> CaptionStyle {
    let shadow = "2px 2px 8px rgba(0,0,0,0.7)";
    CaptionStyle {
        id: "heat-glow".to_string(),
        position: Position::Bottom,
        gap: 16,
        grouping: Grouping::Group(4),
        highlight: Highlight::ActiveWord,
        animation: Animation::Fade {
            in_frames: 6,
            out_frames: 0,
        },
        text: TextLook::sans(800, 72, "#FFFFFF").shadow(shadow),
        active_text: Some(
            TextLook::sans(800, 72, "#FF3B30")
                .shadow(shadow)
                .glow("drop-shadow(0 0 20px #FF3B30)"),
        ),
        emoji_overlays: false,
    }
}

fn elegant() -> CaptionStyle {
    let shadow = "3px 3px 6px rgba(0,0,0,0.9), -1px -1px 4px rgba(0,0,0,0.7)";
    CaptionStyle {
        id: "elegant".to_string(),
        position: Position::Bottom,
        gap: 14,
        grouping: Grouping::Group(4),
        highlight: Highlight::ActiveWord,
        animation: Animation::Fade {
            in_frames: 8,
            out_frames: 0,
        },
        text: TextLook::sans(500, 64, "#FFFFFF").shadow(shadow),
        active_text: Some(TextLook {
            font_family: "'Noto Serif', Georgia, serif".to_string(),
            italic: true,
            ..TextLook::sans(400, 80, "#FFFFFF")
                .shadow(shadow)
                .glow("drop-shadow(0 0 25px rgba(255,255,255,0.9))")
        }),
        emoji_overlays: false,
    }
}

fn word_pop() -> CaptionStyle {
    CaptionStyle {
        id: "word-pop".to_string(),
        position: Position::Center,
        gap: 0,
        grouping: Grouping::SingleWord,
        highlight: Highlight::None,
        animation: Animation::Pop {
            from_scale: 0.7,
            spring: Spring::SNAPPY,
        },
        text: TextLook::sans(900, 120, "#FFFFFF")
            .stroke("4px black")
            .shadow("4px 4px 12px rgba(0,0,0,0.6)"),
        active_text: None,
        emoji_overlays: false,
    }
}

fn cinematic() -> CaptionStyle {
    CaptionStyle {
        id: "cinematic".to_string(),
        position: Position::Bottom,
        gap: 12,
        grouping: Grouping::Group(6),
        highlight: Highlight::None,
        animation: Animation::Fade {
            in_frames: 12,
            out_frames: 8,
        },
        text: TextLook {
            letter_spacing: Some("0.02em".to_string()),
            ..TextLook::sans(400, 58, "#FFFFFF").shadow("2px 2px 6px rgba(0,0,0,0.7)")
        },
        active_text: None,
        emoji_overlays: false,
    }
}

fn emoji_auto() -> CaptionStyle {
    CaptionStyle {
        id: "emoji-auto".to_string(),
        emoji_overlays: true,
        ..heat_glow()
    }
}

/// Variants of the built-in shapes with their own palette.
fn variants() -> Vec<CaptionStyle> {
    let recolor = |id: &str, base: CaptionStyle, color: &str| {
        let mut style = base;
        style.id = id.to_string();
        if let Some(active) = style.active_text.as_mut() {
            active.color = color.to_string();
            if active.glow.is_some() {
                active.glow = Some(format!("drop-shadow(0 0 20px {})", color));
            }
        }
        style
    };

    vec![
        recolor("neon", heat_glow(), "#39FF14"),
        recolor("glow", heat_glow(), "#FFD60A"),
        recolor("pulse", heat_glow(), "#FF2D95"),
        // Karaoke-style: the last started word stays lit between words.
        CaptionStyle {
            highlight: Highlight::CurrentWord,
            ..recolor("bold", heat_glow(), "#FFCC00")
        },
        CaptionStyle {
            highlight: Highlight::CurrentWord,
            ..recolor("energy", heat_glow(), "#00E5FF")
        },
        CaptionStyle {
            id: "minimal".to_string(),
            animation: Animation::Fade {
                in_frames: 4,
                out_frames: 4,
            },
            ..cinematic()
        },
        CaptionStyle {
            id: "elegant-classic".to_string(),
            highlight: Highlight::CurrentWord,
            ..elegant()
        },
        CaptionStyle {
            id: "million".to_string(),
            text: TextLook::sans(900, 120, "#FFE600")
                .stroke("4px black")
                .shadow("4px 4px 12px rgba(0,0,0,0.6)"),
            ..word_pop()
        },
    ]
}

/// Catalogued ids with no bespoke look; they render with the fallback style.
pub const CATALOG_ALIASES: &[&str] = &[
    "heat", "zodiac", "hustle-v3", "orion", "cove", "magazine", "betelgeuse", "daily-mail",
    "eclipse", "suzy", "milky-way", "vitamin-c", "alcyone", "buzz", "thuban", "marigold",
    "closed-cap", "note", "poem", "recess", "messages", "mizar", "linear", "cartwheel-black",
    "footprint-v3", "andromeda", "baseline", "cartwheel-purple", "arion-pink", "castor",
    "techwave", "flair", "aries", "dimidium", "fuel", "orbitar-black", "vitamin-b", "lumin",
    "drive", "pacific", "scene", "cygnus-a", "doodle", "blueprint", "freshly", "finlay",
    "runway", "sirius", "medusa", "minima", "energy-ii", "nova", "garnet", "monster", "alhena",
    "pollux",
];

/// Style lookup by id.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    styles: HashMap<String, CaptionStyle>,
    aliases: HashMap<String, String>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::with_builtin_styles()
    }
}

impl StyleRegistry {
    /// Registry with no styles. `resolve` needs the fallback style registered.
    pub fn empty() -> Self {
        Self {
            styles: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Registry preloaded with every built-in style and catalogued alias.
    pub fn with_builtin_styles() -> Self {
        let mut registry = Self::empty();
        for style in [heat_glow(), elegant(), word_pop(), cinematic(), emoji_auto()] {
            registry.register(style);
        }
        for style in variants() {
            registry.register(style);
        }
        for alias in CATALOG_ALIASES {
            registry.alias(alias, FALLBACK_STYLE_ID);
        }
        registry
    }

    /// Add or replace a style.
    pub fn register(&mut self, style: CaptionStyle) {
        self.aliases.remove(&style.id);
        self.styles.insert(style.id.clone(), style);
    }

    /// Make `id` render as `target`.
    pub fn alias(&mut self, id: &str, target: &str) {
        if !self.styles.contains_key(id) {
            self.aliases.insert(id.to_string(), target.to_string());
        }
    }

    /// Exact lookup, following aliases.
    pub fn get(&self, id: &str) -> Option<&CaptionStyle> {
        self.styles.get(id).or_else(|| {
            self.aliases
                .get(id)
                .and_then(|target| self.styles.get(target))
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Lookup with fallback to the default style.
    ///
    /// Returns `None` only when neither `id` nor the fallback is registered.
    pub fn resolve(&self, id: &str) -> Option<&CaptionStyle> {
        self.get(id).or_else(|| self.styles.get(FALLBACK_STYLE_ID))
    }

    /// All addressable ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .styles
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Styles with a bespoke look, sorted by id.
    pub fn styles(&self) -> Vec<&CaptionStyle> {
        let mut styles: Vec<&CaptionStyle> = self.styles.values().collect();
        styles.sort_by(|a, b| a.id.cmp(&b.id));
        styles
    }

    pub fn len(&self) -> usize {
        self.styles.len() + self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let registry = StyleRegistry::with_builtin_styles();
        for id in ["heat-glow", "elegant", "word-pop", "cinematic", "emoji-auto"] {
            assert_eq!(registry.get(id).unwrap().id, id);
        }
        assert!(registry.get("emoji-auto").unwrap().emoji_overlays);
        assert_eq!(registry.get("cinematic").unwrap().grouping, Grouping::Group(6));
    }

    #[test]
    fn test_unknown_falls_back() {
        let registry = StyleRegistry::default();
        assert!(registry.get("does-not-exist").is_none());
        assert_eq!(registry.resolve("does-not-exist").unwrap().id, FALLBACK_STYLE_ID);
    }

    #[test]
    fn test_catalog_alias_resolves_to_fallback() {
        let registry = StyleRegistry::default();
        assert!(registry.contains("heat"));
        assert_eq!(registry.get("zodiac").unwrap().id, FALLBACK_STYLE_ID);
        assert!(registry.ids().contains(&"million".to_string()));
    }

    #[test]
    fn test_register_overrides_alias() {
        let mut registry = StyleRegistry::default();
        registry.register(CaptionStyle {
            id: "heat".to_string(),
            ..cinematic()
        });
        assert_eq!(registry.get("heat").unwrap().id, "heat");
        assert_eq!(registry.get("heat").unwrap().grouping, Grouping::Group(6));
    }

    #[test]
    fn test_empty_registry_cannot_resolve() {
        assert!(StyleRegistry::empty().resolve("heat-glow").is_none());
    }

    #[test]
    fn test_spring_settles() {
        let spring = Spring::SNAPPY;
        assert_eq!(spring.value(0.0, 30), 0.0);
        assert_eq!(spring.value(-3.0, 30), 0.0);
        let early = spring.value(3.0, 30);
        assert!(early > 0.0 && early < 1.0);
        assert!((spring.value(60.0, 30) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_overdamped_spring_never_overshoots() {
        let spring = Spring {
            stiffness: 100.0,
            damping: 40.0,
        };
        let mut last = 0.0;
        for frame in 0..120 {
            let v = spring.value(frame as f64, 30);
            assert!(v >= last - 1e-12 && v <= 1.0 + 1e-12);
            last = v;
        }
    }

    #[test]
    fn test_style_serializes_for_composition() {
        let json = serde_json::to_value(heat_glow()).unwrap();
        assert_eq!(json["text"]["fontWeight"], 800);
        assert_eq!(json["activeText"]["color"], "#FF3B30");
        assert_eq!(json["grouping"]["kind"], "group");
        assert_eq!(json["grouping"]["size"], 4);
        assert_eq!(json["animation"]["kind"], "fade");
    }
}
