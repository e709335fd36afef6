use crate::protocol::WireValue;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CursorShape {
    #[default]
    Block,
    Horizontal,
    Vertical,
    Other(String),
}

impl CursorShape {
    pub fn from_name(name: &str) -> Self {
        match name {
            "block" => CursorShape::Block,
            "horizontal" => CursorShape::Horizontal,
            "vertical" => CursorShape::Vertical,
            other => CursorShape::Other(other.to_owned()),
        }
    }
}

/// One entry of `mode_info_set`'s mode list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeInfo {
    pub cursor_shape: CursorShape,
    pub cell_percentage: u32,
    pub attr_id: i64,
    pub name: String,
    pub short_name: String,
    pub blinkwait: u64,
    pub blinkon: u64,
    pub blinkoff: u64,
}

impl Default for ModeInfo {
    fn default() -> Self {
        Self {
            cursor_shape: CursorShape::Block,
            cell_percentage: 100,
            attr_id: 0,
            name: String::new(),
            short_name: String::new(),
            blinkwait: 0,
            blinkon: 0,
            blinkoff: 0,
        }
    }
}

impl ModeInfo {
    pub fn from_map(map: &WireValue) -> Self {
        let mut info = ModeInfo::default();
        let Some(entries) = map.as_map() else {
            return info;
        };
        for (key, value) in entries {
            match key.as_str() {
                Some("cursor_shape") => {
                    if let Some(shape) = value.as_str() {
                        info.cursor_shape = CursorShape::from_name(shape);
                    }
                }
                Some("cell_percentage") => {
                    if let Some(pct) = unsigned(value) {
                        info.cell_percentage = pct.min(u64::from(u32::MAX)) as u32;
                    }
                }
                Some("attr_id") => {
                    if let Some(id) = value.as_i64() {
                        info.attr_id = id;
                    }
                }
                Some("name") => {
                    if let Some(name) = value.as_str() {
                        info.name = name.to_owned();
                    }
                }
                Some("short_name") => {
                    if let Some(name) = value.as_str() {
                        info.short_name = name.to_owned();
                    }
                }
                Some("blinkwait") => info.blinkwait = unsigned(value).unwrap_or(0),
                Some("blinkon") => info.blinkon = unsigned(value).unwrap_or(0),
                Some("blinkoff") => info.blinkoff = unsigned(value).unwrap_or(0),
                _ => {}
            }
        }
        info
    }
}

fn unsigned(value: &WireValue) -> Option<u64> {
    value.as_i64().and_then(|raw| u64::try_from(raw).ok())
}
