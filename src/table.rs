//! Binds resolved columns to rows: sorting, the render grid and header
//! gestures.

use std::cmp::Ordering;

use ratatui::layout::{Constraint, Flex, Layout, Rect};
use rayon::prelude::*;
use tracing::trace;

use crate::columns::{ColumnDefinition, RenderedCell};
use crate::market::{CellValue, MarketRow};
use crate::view_controller::WorkingCopy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Single column sort. Multi-column sort is not supported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    column: Option<(String, SortDirection)>,
}

impl SortState {
    pub fn column(&self) -> Option<&str> {
        self.column.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn direction_of(&self, id: &str) -> Option<SortDirection> {
        match &self.column {
            Some((sorted, direction)) if sorted == id => Some(*direction),
            _ => None,
        }
    }

    /// unsorted -> ascending -> descending -> unsorted. Another column
    /// starts over at ascending.
    pub fn toggle(&mut self, column: &ColumnDefinition) {
        if !column.sortable {
            return;
        }
        self.column = match self.direction_of(column.id) {
            None => Some((column.id.to_string(), SortDirection::Ascending)),
            Some(SortDirection::Ascending) => {
                Some((column.id.to_string(), SortDirection::Descending))
            }
            Some(SortDirection::Descending) => None,
        };
        trace!("Sort is now {:?}", self.column);
    }
}

fn variant_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Number(_) => 0,
        CellValue::Text(_) => 1,
        CellValue::Series(_) => 2,
        CellValue::Missing => 3,
    }
}

/// Numeric for numbers, lexicographic for text.
pub fn compare_values(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (CellValue::Text(x), CellValue::Text(y)) => x.cmp(y),
        (CellValue::Series(x), CellValue::Series(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(p, q)| p.partial_cmp(q).unwrap_or(Ordering::Equal))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => variant_rank(a).cmp(&variant_rank(b)),
    }
}

/// Row indices in display order. Missing values always go last. The sort is
/// stable, so equal rows keep upstream order.
pub fn sorted_order(
    rows: &[MarketRow],
    columns: &[&ColumnDefinition],
    sort: &SortState,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    let Some(column) = sort
        .column()
        .and_then(|id| columns.iter().find(|c| c.id == id))
    else {
        return order;
    };
    let descending = sort.direction_of(column.id) == Some(SortDirection::Descending);

    let keys: Vec<CellValue> = rows.iter().map(|r| column.value_of(r)).collect();
    order.sort_by(|&a, &b| match (keys[a].is_missing(), keys[b].is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = match column.comparator {
                Some(comparator) => comparator(&rows[a], &rows[b]),
                None => compare_values(&keys[a], &keys[b]),
            };
            if descending { ordering.reverse() } else { ordering }
        }
    });
    order
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCell {
    pub id: &'static str,
    pub label: String,
    pub sortable: bool,
    pub sort: Option<SortDirection>,
}

/// Two dimensional render output, one row per data row in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<Vec<RenderedCell>>,
    pub widths: Vec<u16>,
}

pub fn build_grid(
    columns: &[&ColumnDefinition],
    rows: &[MarketRow],
    sort: &SortState,
    max_column_width: usize,
) -> Grid {
    let headers: Vec<HeaderCell> = columns
        .iter()
        .map(|c| {
            let sort = sort.direction_of(c.id);
            let label = match (c.sortable, sort) {
                (false, _) => c.header.to_string(),
                (true, Some(SortDirection::Ascending)) => format!("{} ↑", c.header),
                (true, Some(SortDirection::Descending)) => format!("{} ↓", c.header),
                (true, None) => format!("{} ↕", c.header),
            };
            HeaderCell {
                id: c.id,
                label,
                sortable: c.sortable,
                sort,
            }
        })
        .collect();

    let order = sorted_order(rows, columns, sort);
    let cells: Vec<Vec<RenderedCell>> = order
        .par_iter()
        .map(|&idx| columns.iter().map(|c| c.render(&rows[idx], idx)).collect())
        .collect();

    let widths = headers
        .iter()
        .enumerate()
        .map(|(cidx, header)| {
            let content = cells
                .iter()
                .map(|row| row[cidx].text.chars().count())
                .max()
                .unwrap_or(0);
            content
                .max(header.label.chars().count())
                .min(max_column_width) as u16
        })
        .collect();

    Grid {
        headers,
        rows: cells,
        widths,
    }
}

/// Horizontal extent of every header cell, used for mouse hit tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLayout {
    spans: Vec<(u16, u16)>,
}

impl HeaderLayout {
    /// Splits a row of `area_width` cells the way the table widget lays out
    /// its columns, so shrunk columns are hit where they are drawn.
    pub fn fit(area_width: usize, widths: &[u16], spacing: u16) -> Self {
        let area = Rect::new(0, 0, u16::try_from(area_width).unwrap_or(u16::MAX), 1);
        let spans = Layout::horizontal(widths.iter().map(|&w| Constraint::Length(w)))
            .spacing(spacing)
            .flex(Flex::Start)
            .split(area)
            .iter()
            .map(|rect| (rect.x, rect.width))
            .collect();
        HeaderLayout { spans }
    }

    #[cfg(test)]
    pub fn start_of(&self, idx: usize) -> Option<u16> {
        self.spans.get(idx).map(|&(start, _)| start)
    }

    /// Column under `x`, if any.
    pub fn index_at(&self, x: u16) -> Option<usize> {
        self.spans
            .iter()
            .position(|&(start, width)| x >= start && x < start.saturating_add(width))
    }

    /// Column whose slot contains `x`, clamped to the first and last column.
    /// The gap after a column counts as that column.
    pub fn slot_at(&self, x: u16) -> Option<usize> {
        let first = self.spans.first()?;
        if x < first.0 {
            return Some(0);
        }
        Some(
            self.spans
                .iter()
                .rposition(|&(start, _)| x >= start)
                .unwrap_or(0),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Click(usize),
    Move { from: usize, to: usize },
}

/// Header drag tracking. Only the x coordinate matters, vertical movement
/// never changes the target column.
#[derive(Debug, Default)]
pub struct DragGesture {
    origin: Option<usize>,
}

impl DragGesture {
    pub fn press(&mut self, layout: &HeaderLayout, x: u16) -> bool {
        self.origin = layout.index_at(x);
        self.origin.is_some()
    }

    pub fn release(&mut self, layout: &HeaderLayout, x: u16, _y: u16) -> Option<DragOutcome> {
        let from = self.origin.take()?;
        let to = layout.slot_at(x)?;
        if from == to {
            Some(DragOutcome::Click(from))
        } else {
            Some(DragOutcome::Move { from, to })
        }
    }
}

/// Maps a move between displayed columns to a move in the working copy,
/// which also holds hidden columns.
pub fn working_move(
    displayed: &[&ColumnDefinition],
    working: &WorkingCopy,
    from: usize,
    to: usize,
) -> Option<(usize, usize)> {
    let from = working.position(displayed.get(from)?.id)?;
    let to = working.position(displayed.get(to)?.id)?;
    Some((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{CHANGE_1H, CHANGE_24H, INDEX, NAME, PRICE};

    fn row(name: &str, price: Option<f64>, change_1h: Option<f64>) -> MarketRow {
        MarketRow {
            id: name.to_lowercase(),
            name: name.into(),
            current_price: price,
            price_change_percentage_1h_in_currency: change_1h,
            ..MarketRow::default()
        }
    }

    fn rows() -> Vec<MarketRow> {
        vec![
            row("bitcoin", Some(67000.0), Some(0.5)),
            row("Avalanche", Some(30.0), None),
            row("Cardano", Some(0.4), Some(-1.0)),
        ]
    }

    #[test]
    fn sort_cycles_through_three_states() {
        let mut sort = SortState::default();
        sort.toggle(&PRICE);
        assert_eq!(sort.direction_of("current_price"), Some(SortDirection::Ascending));
        sort.toggle(&PRICE);
        assert_eq!(sort.direction_of("current_price"), Some(SortDirection::Descending));
        sort.toggle(&PRICE);
        assert_eq!(sort, SortState::default());
    }

    #[test]
    fn only_one_column_is_sorted() {
        let mut sort = SortState::default();
        sort.toggle(&PRICE);
        sort.toggle(&PRICE);
        sort.toggle(&NAME);
        assert_eq!(sort.column(), Some("name"));
        assert_eq!(sort.direction_of("name"), Some(SortDirection::Ascending));
        assert_eq!(sort.direction_of("current_price"), None);

        sort.toggle(&INDEX);
        assert_eq!(sort.column(), Some("name"));
    }

    #[test]
    fn numeric_sort_is_numeric() {
        let mut sort = SortState::default();
        sort.toggle(&PRICE);
        let columns = [&PRICE];
        assert_eq!(sorted_order(&rows(), &columns, &sort), [2, 1, 0]);
        sort.toggle(&PRICE);
        assert_eq!(sorted_order(&rows(), &columns, &sort), [0, 1, 2]);
    }

    #[test]
    fn custom_comparator_wins() {
        let mut sort = SortState::default();
        sort.toggle(&NAME);
        // plain byte order would put "bitcoin" last
        assert_eq!(sorted_order(&rows(), &[&NAME], &sort), [1, 0, 2]);
    }

    #[test]
    fn missing_values_sort_last_both_ways() {
        let mut sort = SortState::default();
        sort.toggle(&CHANGE_1H);
        assert_eq!(sorted_order(&rows(), &[&CHANGE_1H], &sort), [2, 0, 1]);
        sort.toggle(&CHANGE_1H);
        assert_eq!(sorted_order(&rows(), &[&CHANGE_1H], &sort), [0, 2, 1]);
    }

    #[test]
    fn sort_on_hidden_column_keeps_upstream_order() {
        let mut sort = SortState::default();
        sort.toggle(&PRICE);
        assert_eq!(sorted_order(&rows(), &[&NAME], &sort), [0, 1, 2]);
    }

    #[test]
    fn generic_ordering() {
        assert_eq!(
            compare_values(&CellValue::Number(2.0), &CellValue::Number(10.0)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&CellValue::Text("10".into()), &CellValue::Text("2".into())),
            Ordering::Less
        );
    }

    #[test]
    fn grid_renders_placeholder_for_missing_cells() {
        let columns = [&NAME, &CHANGE_1H, &CHANGE_24H];
        let grid = build_grid(&columns, &rows(), &SortState::default(), 20);
        assert_eq!(grid.rows.len(), 3);
        assert_eq!(grid.rows[1][0].text, "Avalanche");
        assert_eq!(grid.rows[1][1].text, "N/A");
        assert_eq!(grid.rows[0][1].text, "↑ 0.50%");
        assert_eq!(grid.headers[0].label, "Coin ↕");
        assert_eq!(grid.widths.len(), 3);
    }

    #[test]
    fn grid_index_follows_upstream_position() {
        let mut sort = SortState::default();
        sort.toggle(&PRICE);
        let grid = build_grid(&[&INDEX, &PRICE], &rows(), &sort, 20);
        let index: Vec<&str> = grid.rows.iter().map(|r| r[0].text.as_str()).collect();
        assert_eq!(index, ["3", "2", "1"]);
        assert_eq!(grid.headers[0].label, "#");
        assert_eq!(grid.headers[1].label, "Price ↑");
    }

    #[test]
    fn header_hit_testing() {
        let layout = HeaderLayout::fit(80, &[4, 6, 3], 1);
        // spans: 0..4, 5..11, 12..15
        assert_eq!(layout.index_at(0), Some(0));
        assert_eq!(layout.index_at(4), None);
        assert_eq!(layout.index_at(10), Some(1));
        assert_eq!(layout.index_at(15), None);
        assert_eq!(layout.slot_at(4), Some(0));
        assert_eq!(layout.slot_at(200), Some(2));
    }

    #[test]
    fn header_layout_shrinks_with_the_area() {
        let layout = HeaderLayout::fit(20, &[10, 10, 10], 1);
        let last = layout.start_of(2).unwrap();
        assert!(last < 20);
        assert_eq!(layout.index_at(last), Some(2));
        assert_eq!(layout.index_at(25), None);
    }

    #[test]
    fn drag_ignores_vertical_displacement() {
        let layout = HeaderLayout::fit(80, &[4, 6, 3], 1);
        let mut drag = DragGesture::default();

        assert!(drag.press(&layout, 8));
        assert_eq!(
            drag.release(&layout, 1, 0),
            Some(DragOutcome::Move { from: 1, to: 0 })
        );

        assert!(drag.press(&layout, 8));
        assert_eq!(
            drag.release(&layout, 1, 40),
            Some(DragOutcome::Move { from: 1, to: 0 })
        );

        assert!(drag.press(&layout, 8));
        assert_eq!(drag.release(&layout, 9, 40), Some(DragOutcome::Click(1)));
        assert_eq!(drag.release(&layout, 9, 40), None);
        assert!(!drag.press(&layout, 4));
    }
}
