use bureau_protocol::Appearance;
use std::collections::BTreeSet;

/// Sprite keys whose atlases are loaded. Anything else falls back to a glyph.
#[derive(Debug, Clone, Default)]
pub struct SpriteCatalog {
    loaded: BTreeSet<String>,
}

impl SpriteCatalog {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            loaded: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn replace<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loaded = keys.into_iter().map(Into::into).collect();
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded.contains(key)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn appearance(&self, key: Option<&str>, glyph: &str) -> Appearance {
        match key {
            Some(k) if self.is_loaded(k) => Appearance::Sprite { key: k.to_string() },
            _ => Appearance::Glyph {
                text: if glyph.is_empty() { "?" } else { glyph }.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sprite_falls_back_to_glyph() {
        let catalog = SpriteCatalog::new(["agent:1"]);
        assert_eq!(
            catalog.appearance(Some("agent:1"), "🧑"),
            Appearance::Sprite {
                key: "agent:1".into()
            }
        );
        assert_eq!(
            catalog.appearance(Some("agent:2"), "🧑"),
            Appearance::Glyph { text: "🧑".into() }
        );
        assert_eq!(
            catalog.appearance(None, ""),
            Appearance::Glyph { text: "?".into() }
        );
    }
}
