use crate::protocol::WireValue;

/// 24-bit RGB color as sent by the editor (`0xRRGGBB`).
pub type Rgb = u32;

/// Visual attributes for one highlight id.
///
/// Colors left as `None` inherit the default colors; style flags default to off.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HlAttrs {
    pub foreground: Option<Rgb>,
    pub background: Option<Rgb>,
    pub special: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub reverse: bool,
}

impl HlAttrs {
    /// Reads the known keys of an `rgb_attr` map; anything else is ignored.
    pub fn from_rgb_map(map: &WireValue) -> Self {
        let mut attrs = HlAttrs::default();
        let Some(entries) = map.as_map() else {
            return attrs;
        };
        for (key, value) in entries {
            let Some(key) = key.as_str() else { continue };
            match key {
                "foreground" => attrs.foreground = color(value),
                "background" => attrs.background = color(value),
                "special" => attrs.special = color(value),
                "bold" => attrs.bold = flag(value),
                "italic" => attrs.italic = flag(value),
                "underline" => attrs.underline = flag(value),
                "strikethrough" => attrs.strikethrough = flag(value),
                "reverse" => attrs.reverse = flag(value),
                _ => {}
            }
        }
        attrs
    }
}

/// Colors used where a highlight leaves a color unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultColors {
    pub foreground: Option<Rgb>,
    pub background: Option<Rgb>,
    pub special: Option<Rgb>,
}

/// Negative values mean "not set" on the wire.
pub(crate) fn color(value: &WireValue) -> Option<Rgb> {
    value
        .as_i64()
        .filter(|raw| *raw >= 0)
        .map(|raw| (raw & 0x00FF_FFFF) as Rgb)
}

fn flag(value: &WireValue) -> bool {
    match value {
        WireValue::Bool(flag) => *flag,
        WireValue::Int(int) => *int != 0,
        _ => false,
    }
}
