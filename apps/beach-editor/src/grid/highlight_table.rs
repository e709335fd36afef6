use std::collections::HashMap;

use crate::redraw::{DefaultColors, HlAttrs, Rgb};

/// Fallbacks used when the editor never sent `default_colors_set`.
const FALLBACK_FOREGROUND: Rgb = 0xFF_FF_FF;
const FALLBACK_BACKGROUND: Rgb = 0x00_00_00;

/// Concrete colors and flags for one cell after defaults and `reverse` apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedStyle {
    pub foreground: Rgb,
    pub background: Rgb,
    pub special: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
}

/// Highlight definitions collected from `hl_attr_define`.
#[derive(Clone, Debug, Default)]
pub struct HighlightTable {
    attrs: HashMap<i64, HlAttrs>,
    defaults: DefaultColors,
}

impl HighlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, id: i64, attrs: HlAttrs) {
        self.attrs.insert(id, attrs);
    }

    pub fn set_defaults(&mut self, defaults: DefaultColors) {
        self.defaults = defaults;
    }

    pub fn defaults(&self) -> DefaultColors {
        self.defaults
    }

    pub fn get(&self, id: i64) -> Option<&HlAttrs> {
        self.attrs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Unknown ids (including 0) resolve to the default colors.
    pub fn resolve(&self, id: i64) -> ResolvedStyle {
        let fallback = HlAttrs::default();
        let attrs = self.attrs.get(&id).unwrap_or(&fallback);
        let default_fg = self.defaults.foreground.unwrap_or(FALLBACK_FOREGROUND);
        let default_bg = self.defaults.background.unwrap_or(FALLBACK_BACKGROUND);

        let mut foreground = attrs.foreground.unwrap_or(default_fg);
        let mut background = attrs.background.unwrap_or(default_bg);
        if attrs.reverse {
            std::mem::swap(&mut foreground, &mut background);
        }
        ResolvedStyle {
            foreground,
            background,
            special: attrs
                .special
                .or(self.defaults.special)
                .unwrap_or(foreground),
            bold: attrs.bold,
            italic: attrs.italic,
            underline: attrs.underline,
            strikethrough: attrs.strikethrough,
        }
    }
}
