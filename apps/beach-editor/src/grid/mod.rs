//! Cell matrix replaying the editor's line-grid events.
//!
//! The grid is single-writer: only the task applying redraw events mutates it.
//! A renderer reads it after each `flush` and then calls
//! [`Grid::clear_dirty_rows`], which is the only hand-off point between the two.

pub mod highlight_table;
pub mod screen;

use std::collections::BTreeSet;

use tracing::trace;

use crate::redraw::{GridLine, GridScroll};

pub use highlight_table::{HighlightTable, ResolvedStyle};
pub use screen::{Screen, SharedScreen};

/// Highlight id meaning "default colors".
pub const DEFAULT_HL_ID: i64 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    /// Display glyph; the right half of a double-width glyph is an empty string.
    pub text: String,
    pub hl_id: i64,
}

impl Cell {
    pub fn blank() -> Self {
        Self {
            text: " ".to_owned(),
            hl_id: DEFAULT_HL_ID,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text == " " && self.hl_id == DEFAULT_HL_ID
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorPosition {
    pub row: usize,
    pub col: usize,
}

/// Row-major `width x height` matrix of [`Cell`]s with dirty-row tracking.
#[derive(Clone, Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    cursor: CursorPosition,
    dirty: BTreeSet<usize>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        let mut grid = Self {
            width,
            height,
            cells: vec![Cell::blank(); width * height],
            cursor: CursorPosition::default(),
            dirty: BTreeSet::new(),
        };
        grid.mark_all_dirty();
        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cursor(&self) -> CursorPosition {
        self.cursor
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.cells.get(self.offset(row, col))
    }

    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        if row >= self.height {
            return None;
        }
        let start = self.offset(row, 0);
        Some(&self.cells[start..start + self.width])
    }

    /// Concatenated glyphs of one row.
    pub fn row_text(&self, row: usize) -> Option<String> {
        self.row(row)
            .map(|cells| cells.iter().map(|cell| cell.text.as_str()).collect())
    }

    pub fn dirty_rows(&self) -> &BTreeSet<usize> {
        &self.dirty
    }

    pub fn is_dirty(&self, row: usize) -> bool {
        self.dirty.contains(&row)
    }

    /// Marks the current frame as consumed.
    pub fn clear_dirty_rows(&mut self) {
        self.dirty.clear();
    }

    /// Writes one `grid_line` occurrence. Cells past the right edge are clipped.
    pub fn apply_line(&mut self, line: &GridLine) {
        if line.row >= self.height {
            trace!(
                target: "editor::grid",
                row = line.row,
                height = self.height,
                "grid_line outside grid"
            );
            return;
        }
        let mut col = line.col_start;
        let mut hl_id = DEFAULT_HL_ID;
        'cells: for cell in &line.cells {
            if let Some(id) = cell.hl_id {
                hl_id = id;
            }
            for _ in 0..cell.repeat {
                if col >= self.width {
                    break 'cells;
                }
                let offset = self.offset(line.row, col);
                let target = &mut self.cells[offset];
                target.text.clone_from(&cell.text);
                target.hl_id = hl_id;
                col += 1;
            }
        }
        self.dirty.insert(line.row);
    }

    /// Shifts the region `[top, bottom) x [left, right)` by `rows`.
    ///
    /// Positive `rows` moves content up, negative moves it down; rows uncovered
    /// by the shift become blank. Every row of the region is marked dirty.
    pub fn scroll(&mut self, scroll: &GridScroll) {
        let bottom = scroll.bottom.min(self.height);
        let right = scroll.right.min(self.width);
        let top = scroll.top.min(bottom);
        let left = scroll.left.min(right);
        let amount = usize::try_from(scroll.rows.unsigned_abs()).unwrap_or(usize::MAX);
        let span = bottom - top;

        if amount >= span {
            for row in top..bottom {
                self.blank_span(row, left, right);
            }
        } else if scroll.rows > 0 {
            for row in top..bottom - amount {
                self.copy_span(row + amount, row, left, right);
            }
            for row in bottom - amount..bottom {
                self.blank_span(row, left, right);
            }
        } else if scroll.rows < 0 {
            for row in (top + amount..bottom).rev() {
                self.copy_span(row - amount, row, left, right);
            }
            for row in top..top + amount {
                self.blank_span(row, left, right);
            }
        }
        self.dirty.extend(top..bottom);
    }

    /// Reallocates to `width x height`, keeping the overlapping top-left
    /// rectangle. Always marks the whole grid dirty, even for the same size.
    pub fn resize(&mut self, width: usize, height: usize) {
        let mut cells = vec![Cell::blank(); width * height];
        let keep_rows = height.min(self.height);
        let keep_cols = width.min(self.width);
        for row in 0..keep_rows {
            let src = self.offset(row, 0);
            let dst = row * width;
            for col in 0..keep_cols {
                cells[dst + col] = std::mem::take(&mut self.cells[src + col]);
            }
        }
        self.cells = cells;
        self.width = width;
        self.height = height;
        self.cursor.row = self.cursor.row.min(height.saturating_sub(1));
        self.cursor.col = self.cursor.col.min(width.saturating_sub(1));
        self.dirty.clear();
        self.mark_all_dirty();
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::blank();
        }
        self.mark_all_dirty();
    }

    /// Cursor is stored alongside the matrix, never inside it.
    pub fn cursor_goto(&mut self, row: usize, col: usize) {
        self.cursor = CursorPosition { row, col };
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.extend(0..self.height);
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    fn copy_span(&mut self, from_row: usize, to_row: usize, left: usize, right: usize) {
        for col in left..right {
            let src = self.offset(from_row, col);
            let dst = self.offset(to_row, col);
            let cell = self.cells[src].clone();
            self.cells[dst] = cell;
        }
    }

    fn blank_span(&mut self, row: usize, left: usize, right: usize) {
        for col in left..right {
            let offset = self.offset(row, col);
            self.cells[offset] = Cell::blank();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redraw::LineCell;

    fn cell(text: &str, hl_id: Option<i64>, repeat: usize) -> LineCell {
        LineCell {
            text: text.to_owned(),
            hl_id,
            repeat,
        }
    }

    fn line(row: usize, col_start: usize, cells: Vec<LineCell>) -> GridLine {
        GridLine {
            grid: 1,
            row,
            col_start,
            cells,
        }
    }

    /// Fills each row with a distinct letter so moved rows are recognizable.
    fn lettered(width: usize, height: usize) -> Grid {
        let mut grid = Grid::new(width, height);
        for row in 0..height {
            let letter = char::from(b'a' + row as u8).to_string();
            grid.apply_line(&line(row, 0, vec![cell(&letter, Some(row as i64), width)]));
        }
        grid.clear_dirty_rows();
        grid
    }

    fn scroll(top: usize, bottom: usize, left: usize, right: usize, rows: i64) -> GridScroll {
        GridScroll {
            grid: 1,
            top,
            bottom,
            left,
            right,
            rows,
            cols: 0,
        }
    }

    #[test_timeout::timeout]
    fn repeated_cells_fill_the_row() {
        let mut grid = Grid::new(20, 3);
        grid.clear_dirty_rows();
        grid.apply_line(&line(1, 0, vec![cell(" ", Some(0), 10), cell("X", Some(1), 5)]));
        assert_eq!(
            grid.row_text(1).as_deref(),
            Some("          XXXXX     ")
        );
        assert_eq!(grid.cell(1, 12).map(|c| c.hl_id), Some(1));
        assert_eq!(grid.dirty_rows().iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test_timeout::timeout]
    fn omitted_hl_id_inherits_previous_cell() {
        let mut grid = Grid::new(10, 1);
        grid.apply_line(&line(
            0,
            0,
            vec![
                cell("a", None, 1),
                cell("b", Some(4), 1),
                cell("c", None, 2),
                cell("d", Some(2), 1),
                cell("e", None, 1),
            ],
        ));
        let ids: Vec<i64> = (0..6)
            .map(|col| grid.cell(0, col).map(|c| c.hl_id).unwrap_or(-1))
            .collect();
        assert_eq!(ids, vec![0, 4, 4, 4, 2, 2]);
    }

    #[test_timeout::timeout]
    fn inheritance_restarts_per_occurrence() {
        let mut grid = Grid::new(4, 1);
        grid.apply_line(&line(0, 0, vec![cell("a", Some(9), 1)]));
        grid.apply_line(&line(0, 1, vec![cell("b", None, 1)]));
        assert_eq!(grid.cell(0, 1).map(|c| c.hl_id), Some(0));
    }

    #[test_timeout::timeout]
    fn writes_past_right_edge_are_clipped() {
        let mut grid = Grid::new(5, 2);
        grid.apply_line(&line(0, 3, vec![cell("z", Some(1), 10)]));
        assert_eq!(grid.width(), 5);
        assert_eq!(grid.row_text(0).as_deref(), Some("   zz"));
        grid.apply_line(&line(7, 0, vec![cell("q", None, 1)]));
        assert_eq!(grid.height(), 2);
    }

    #[test_timeout::timeout]
    fn clear_dirty_rows_twice_stays_empty() {
        let mut grid = lettered(4, 4);
        grid.apply_line(&line(2, 0, vec![cell("x", None, 1)]));
        grid.clear_dirty_rows();
        assert!(grid.dirty_rows().is_empty());
        grid.clear_dirty_rows();
        assert!(grid.dirty_rows().is_empty());
    }

    #[test_timeout::timeout]
    fn resize_to_same_size_marks_everything_dirty() {
        let mut grid = lettered(6, 4);
        grid.resize(6, 4);
        assert_eq!(grid.dirty_rows().len(), 4);
        assert_eq!(grid.row_text(3).as_deref(), Some("dddddd"));
    }

    #[test_timeout::timeout]
    fn shrinking_keeps_top_left_rectangle() {
        let mut grid = Grid::new(1, 1);
        grid.clear_dirty_rows();
        grid.resize(80, 24);
        assert_eq!(grid.dirty_rows().len(), 24);
        grid.clear_dirty_rows();
        for row in 0..24 {
            let text = format!("{:02}", row);
            let cells = text
                .chars()
                .map(|ch| cell(&ch.to_string(), Some(row as i64), 40))
                .collect();
            grid.apply_line(&line(row, 0, cells));
        }
        grid.clear_dirty_rows();

        let before = grid.clone();
        grid.resize(40, 10);
        assert_eq!((grid.width(), grid.height()), (40, 10));
        assert_eq!(grid.dirty_rows().len(), 10);
        for row in 0..10 {
            for col in 0..40 {
                assert_eq!(grid.cell(row, col), before.cell(row, col));
            }
        }
    }

    #[test_timeout::timeout]
    fn growing_pads_with_blanks() {
        let mut grid = lettered(2, 2);
        grid.resize(4, 3);
        assert_eq!(grid.row_text(0).as_deref(), Some("aa  "));
        assert_eq!(grid.row_text(2).as_deref(), Some("    "));
        assert!(grid.cell(2, 3).is_some_and(Cell::is_blank));
    }

    #[test_timeout::timeout]
    fn scroll_up_moves_rows_and_blanks_the_tail() {
        let height = 8;
        let before = lettered(6, height);
        let mut grid = before.clone();
        let (top, bottom, left, right, n) = (1, 7, 1, 5, 2);
        grid.scroll(&scroll(top, bottom, left, right, n as i64));
        for row in top..bottom - n {
            for col in left..right {
                assert_eq!(grid.cell(row, col), before.cell(row + n, col));
            }
        }
        for row in bottom - n..bottom {
            for col in left..right {
                assert!(grid.cell(row, col).is_some_and(Cell::is_blank));
            }
        }
        // Outside the column range nothing moves.
        assert_eq!(grid.cell(1, 0), before.cell(1, 0));
        assert_eq!(grid.cell(7, 2), before.cell(7, 2));
        assert_eq!(
            grid.dirty_rows().iter().copied().collect::<Vec<_>>(),
            (top..bottom).collect::<Vec<_>>()
        );
    }

    #[test_timeout::timeout]
    fn scroll_down_moves_rows_and_blanks_the_head() {
        let before = lettered(5, 8);
        let mut grid = before.clone();
        let (top, bottom, n) = (2, 8, 3);
        grid.scroll(&scroll(top, bottom, 0, 5, -(n as i64)));
        for row in top + n..bottom {
            for col in 0..5 {
                assert_eq!(grid.cell(row, col), before.cell(row - n, col));
            }
        }
        for row in top..top + n {
            assert_eq!(grid.row_text(row).as_deref(), Some("     "));
        }
        assert_eq!(grid.row_text(0), before.row_text(0));
    }

    #[test_timeout::timeout]
    fn scroll_larger_than_region_blanks_it() {
        let mut grid = lettered(3, 4);
        grid.scroll(&scroll(0, 2, 0, 3, 5));
        assert_eq!(grid.row_text(0).as_deref(), Some("   "));
        assert_eq!(grid.row_text(1).as_deref(), Some("   "));
        assert_eq!(grid.row_text(2).as_deref(), Some("ccc"));
    }

    #[test_timeout::timeout]
    fn clear_resets_cells_and_marks_all_dirty() {
        let mut grid = lettered(3, 3);
        grid.cursor_goto(2, 1);
        grid.clear();
        assert!((0..3).all(|row| grid.row_text(row).as_deref() == Some("   ")));
        assert_eq!(grid.dirty_rows().len(), 3);
        assert_eq!(grid.cursor(), CursorPosition { row: 2, col: 1 });
    }

    #[test_timeout::timeout]
    fn cursor_goto_does_not_touch_cells_or_dirty_rows() {
        let mut grid = lettered(3, 3);
        grid.cursor_goto(1, 2);
        assert!(grid.dirty_rows().is_empty());
        assert_eq!(grid.cursor(), CursorPosition { row: 1, col: 2 });
        assert_eq!(grid.row_text(1).as_deref(), Some("bbb"));
    }
}
