//! Decoder for the `redraw` notification.
//!
//! A redraw batch is an ordered list of groups `[name, occurrence...]`; every
//! occurrence is an argument array. Groups and occurrences are emitted in wire
//! order. Unknown event names are skipped, and an occurrence that fails to
//! decode is logged and dropped without affecting the rest of the batch.

pub mod highlight;
pub mod mode;

use tracing::{trace, warn};

use crate::protocol::WireValue;
use crate::telemetry::PerfGuard;

pub use highlight::{DefaultColors, HlAttrs, Rgb};
pub use mode::{CursorShape, ModeInfo};

pub const REDRAW_METHOD: &str = "redraw";

/// One cell of a `grid_line` occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineCell {
    pub text: String,
    /// `None` means "same highlight as the previous cell in this occurrence".
    pub hl_id: Option<i64>,
    pub repeat: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridLine {
    pub grid: i64,
    pub row: usize,
    pub col_start: usize,
    pub cells: Vec<LineCell>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridScroll {
    pub grid: i64,
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
    pub rows: i64,
    pub cols: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RedrawEvent {
    GridLine(GridLine),
    GridCursorGoto {
        grid: i64,
        row: usize,
        col: usize,
    },
    GridScroll(GridScroll),
    GridResize {
        grid: i64,
        width: usize,
        height: usize,
    },
    GridClear {
        grid: i64,
    },
    Flush,
    HlAttrDefine {
        id: i64,
        attrs: HlAttrs,
    },
    DefaultColorsSet(DefaultColors),
    ModeChange {
        name: String,
        index: usize,
    },
    ModeInfoSet {
        cursor_style_enabled: bool,
        modes: Vec<ModeInfo>,
    },
}

/// One occurrence that could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("{event}: {reason}")]
pub struct ParseError {
    pub event: String,
    pub reason: String,
}

/// Decodes the params of one `redraw` notification into events, in order.
pub fn parse_redraw(params: &[WireValue]) -> Vec<RedrawEvent> {
    let _perf = PerfGuard::new("redraw.parse");
    let mut events = Vec::with_capacity(params.len());
    for group in params {
        let Some(items) = group.as_array() else {
            warn!(target: "editor::redraw", "redraw group is not an array");
            continue;
        };
        let Some((name, occurrences)) = items.split_first() else {
            continue;
        };
        let Some(name) = name.as_str() else {
            warn!(target: "editor::redraw", "redraw group without an event name");
            continue;
        };
        let Some(decode) = decoder_for(name) else {
            trace!(target: "editor::redraw", event = name, "ignoring unknown event");
            continue;
        };
        for occurrence in occurrences {
            let decoded = occurrence
                .as_array()
                .ok_or_else(|| "occurrence is not an array".to_owned())
                .and_then(|args| decode(Args(args)));
            match decoded {
                Ok(event) => events.push(event),
                Err(reason) => {
                    let err = ParseError {
                        event: name.to_owned(),
                        reason,
                    };
                    warn!(target: "editor::redraw", error = %err, "dropping redraw occurrence");
                }
            }
        }
    }
    events
}

type Decoder = fn(Args<'_>) -> Result<RedrawEvent, String>;

fn decoder_for(name: &str) -> Option<Decoder> {
    let decoder: Decoder = match name {
        "grid_line" => decode_grid_line,
        "grid_cursor_goto" => decode_cursor_goto,
        "grid_scroll" => decode_grid_scroll,
        "grid_resize" => decode_grid_resize,
        "grid_clear" => decode_grid_clear,
        "flush" => decode_flush,
        "hl_attr_define" => decode_hl_attr_define,
        "default_colors_set" => decode_default_colors,
        "mode_change" => decode_mode_change,
        "mode_info_set" => decode_mode_info_set,
        _ => return None,
    };
    Some(decoder)
}

fn decode_flush(_: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::Flush)
}

/// Positional view over one occurrence's arguments.
#[derive(Clone, Copy)]
struct Args<'a>(&'a [WireValue]);

impl<'a> Args<'a> {
    fn get(&self, idx: usize) -> Result<&'a WireValue, String> {
        self.0
            .get(idx)
            .ok_or_else(|| format!("missing argument {idx}"))
    }

    fn int(&self, idx: usize) -> Result<i64, String> {
        self.get(idx)?
            .as_i64()
            .ok_or_else(|| format!("argument {idx} is not an integer"))
    }

    fn index(&self, idx: usize) -> Result<usize, String> {
        let value = self.int(idx)?;
        usize::try_from(value).map_err(|_| format!("argument {idx} is negative: {value}"))
    }

    fn string(&self, idx: usize) -> Result<&'a str, String> {
        self.get(idx)?
            .as_str()
            .ok_or_else(|| format!("argument {idx} is not a string"))
    }

    fn array(&self, idx: usize) -> Result<&'a [WireValue], String> {
        self.get(idx)?
            .as_array()
            .ok_or_else(|| format!("argument {idx} is not an array"))
    }

    fn boolean(&self, idx: usize) -> Result<bool, String> {
        self.get(idx)?
            .as_bool()
            .ok_or_else(|| format!("argument {idx} is not a boolean"))
    }
}

fn decode_grid_line(args: Args<'_>) -> Result<RedrawEvent, String> {
    let cells = args
        .array(3)?
        .iter()
        .map(decode_line_cell)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RedrawEvent::GridLine(GridLine {
        grid: args.int(0)?,
        row: args.index(1)?,
        col_start: args.index(2)?,
        cells,
    }))
}

fn decode_line_cell(cell: &WireValue) -> Result<LineCell, String> {
    let parts = Args(cell.as_array().ok_or("grid_line cell is not an array")?);
    let text = parts.string(0)?.to_owned();
    let hl_id = match parts.0.get(1) {
        Some(value) => Some(
            value
                .as_i64()
                .ok_or("grid_line cell hl_id is not an integer")?,
        ),
        None => None,
    };
    let repeat = match parts.0.get(2) {
        Some(_) => parts.index(2)?,
        None => 1,
    };
    Ok(LineCell {
        text,
        hl_id,
        repeat,
    })
}

fn decode_cursor_goto(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::GridCursorGoto {
        grid: args.int(0)?,
        row: args.index(1)?,
        col: args.index(2)?,
    })
}

fn decode_grid_scroll(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::GridScroll(GridScroll {
        grid: args.int(0)?,
        top: args.index(1)?,
        bottom: args.index(2)?,
        left: args.index(3)?,
        right: args.index(4)?,
        rows: args.int(5)?,
        cols: args.int(6)?,
    }))
}

fn decode_grid_resize(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::GridResize {
        grid: args.int(0)?,
        width: args.index(1)?,
        height: args.index(2)?,
    })
}

fn decode_grid_clear(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::GridClear {
        grid: args.int(0)?,
    })
}

fn decode_hl_attr_define(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::HlAttrDefine {
        id: args.int(0)?,
        attrs: HlAttrs::from_rgb_map(args.get(1)?),
    })
}

fn decode_default_colors(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::DefaultColorsSet(DefaultColors {
        foreground: highlight::color(args.get(0)?),
        background: highlight::color(args.get(1)?),
        special: highlight::color(args.get(2)?),
    }))
}

fn decode_mode_change(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::ModeChange {
        name: args.string(0)?.to_owned(),
        index: args.index(1)?,
    })
}

fn decode_mode_info_set(args: Args<'_>) -> Result<RedrawEvent, String> {
    Ok(RedrawEvent::ModeInfoSet {
        cursor_style_enabled: args.boolean(0)?,
        modes: args.array(1)?.iter().map(ModeInfo::from_map).collect(),
    })
}
