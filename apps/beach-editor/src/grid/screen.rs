use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::redraw::{ModeInfo, RedrawEvent};

use super::{Grid, HighlightTable};

/// Screen state shared between the event drain task and readers.
pub type SharedScreen = Arc<Mutex<Screen>>;

/// The line-grid plus everything else a renderer needs to paint it.
#[derive(Clone, Debug)]
pub struct Screen {
    grid_id: i64,
    pub grid: Grid,
    pub highlights: HighlightTable,
    pub modes: Vec<ModeInfo>,
    pub cursor_style_enabled: bool,
    pub mode: Option<(String, usize)>,
    flushes: u64,
}

impl Screen {
    /// Tracks grid id 1, the only grid the editor draws without multigrid.
    pub fn new(width: usize, height: usize) -> Self {
        Self::for_grid(1, width, height)
    }

    pub fn for_grid(grid_id: i64, width: usize, height: usize) -> Self {
        Self {
            grid_id,
            grid: Grid::new(width, height),
            highlights: HighlightTable::new(),
            modes: Vec::new(),
            cursor_style_enabled: false,
            mode: None,
            flushes: 0,
        }
    }

    pub fn shared(self) -> SharedScreen {
        Arc::new(Mutex::new(self))
    }

    pub fn grid_id(&self) -> i64 {
        self.grid_id
    }

    /// Number of `flush` events seen so far.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Active mode entry, if `mode_change` pointed at a known index.
    pub fn current_mode(&self) -> Option<&ModeInfo> {
        let (_, index) = self.mode.as_ref()?;
        self.modes.get(*index)
    }

    /// Applies one event. Events for other grid ids are ignored.
    pub fn apply(&mut self, event: &RedrawEvent) {
        match event {
            RedrawEvent::GridLine(line) if line.grid == self.grid_id => self.grid.apply_line(line),
            RedrawEvent::GridCursorGoto { grid, row, col } if *grid == self.grid_id => {
                self.grid.cursor_goto(*row, *col)
            }
            RedrawEvent::GridScroll(scroll) if scroll.grid == self.grid_id => {
                self.grid.scroll(scroll)
            }
            RedrawEvent::GridResize {
                grid,
                width,
                height,
            } if *grid == self.grid_id => {
                debug!(target: "editor::grid", width, height, "grid resized");
                self.grid.resize(*width, *height);
            }
            RedrawEvent::GridClear { grid } if *grid == self.grid_id => self.grid.clear(),
            RedrawEvent::Flush => self.flushes += 1,
            RedrawEvent::HlAttrDefine { id, attrs } => self.highlights.define(*id, attrs.clone()),
            RedrawEvent::DefaultColorsSet(colors) => self.highlights.set_defaults(*colors),
            RedrawEvent::ModeChange { name, index } => self.mode = Some((name.clone(), *index)),
            RedrawEvent::ModeInfoSet {
                cursor_style_enabled,
                modes,
            } => {
                self.cursor_style_enabled = *cursor_style_enabled;
                self.modes = modes.clone();
            }
            other => trace!(target: "editor::grid", ?other, "event for another grid"),
        }
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a RedrawEvent>) {
        for event in events {
            self.apply(event);
        }
    }
}
