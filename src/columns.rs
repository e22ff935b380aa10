//! The static catalog of table columns.
//!
//! Column definitions carry functions, so they are never serialized. Saved
//! views only reference them by [`ColumnDefinition::id`].

use std::cmp::Ordering;

use crate::market::{CellValue, MarketRow, NOT_AVAILABLE, format_usd};

pub type Accessor = fn(&MarketRow) -> CellValue;
/// Renders a row; the second argument is the row's upstream position.
pub type Renderer = fn(&MarketRow, usize) -> RenderedCell;
pub type Comparator = fn(&MarketRow, &MarketRow) -> Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trend {
    #[default]
    Neutral,
    Up,
    Down,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedCell {
    pub text: String,
    pub trend: Trend,
}

impl RenderedCell {
    pub fn plain(text: impl Into<String>) -> Self {
        RenderedCell {
            text: text.into(),
            trend: Trend::Neutral,
        }
    }
}

/// Which function a consumer calls to display a cell.
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    /// Display the accessor's value as is.
    Value,
    /// Display through a dedicated renderer.
    Rendered(Renderer),
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinition {
    pub id: &'static str,
    pub header: &'static str,
    pub accessor: Accessor,
    pub kind: ColumnKind,
    pub comparator: Option<Comparator>,
    pub sortable: bool,
}

impl ColumnDefinition {
    pub const fn value(id: &'static str, header: &'static str, accessor: Accessor) -> Self {
        ColumnDefinition {
            id,
            header,
            accessor,
            kind: ColumnKind::Value,
            comparator: None,
            sortable: true,
        }
    }

    pub const fn rendered(
        id: &'static str,
        header: &'static str,
        accessor: Accessor,
        renderer: Renderer,
    ) -> Self {
        ColumnDefinition {
            kind: ColumnKind::Rendered(renderer),
            ..ColumnDefinition::value(id, header, accessor)
        }
    }

    pub const fn with_comparator(self, comparator: Comparator) -> Self {
        ColumnDefinition {
            comparator: Some(comparator),
            ..self
        }
    }

    pub const fn unsortable(self) -> Self {
        ColumnDefinition {
            sortable: false,
            ..self
        }
    }

    pub fn value_of(&self, row: &MarketRow) -> CellValue {
        (self.accessor)(row)
    }

    pub fn render(&self, row: &MarketRow, position: usize) -> RenderedCell {
        match self.kind {
            ColumnKind::Rendered(renderer) => renderer(row, position),
            ColumnKind::Value => RenderedCell::plain(self.value_of(row).display()),
        }
    }
}

pub const INDEX: ColumnDefinition = ColumnDefinition::rendered(
    "index",
    "#",
    |row| CellValue::number(row.market_cap_rank.map(f64::from)),
    |_, position| RenderedCell::plain((position + 1).to_string()),
)
.unsortable();

pub const NAME: ColumnDefinition =
    ColumnDefinition::value("name", "Coin", |row| CellValue::Text(row.name.clone()))
        .with_comparator(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

pub const PRICE: ColumnDefinition = ColumnDefinition::rendered(
    "current_price",
    "Price",
    |row| CellValue::number(row.current_price),
    |row, _| usd_cell(row.current_price),
);

pub const CHANGE_1H: ColumnDefinition = ColumnDefinition::rendered(
    "price_change_percentage_1h_in_currency",
    "1h",
    |row| CellValue::number(row.price_change_percentage_1h_in_currency),
    |row, _| percentage_cell(row.price_change_percentage_1h_in_currency),
);

pub const CHANGE_24H: ColumnDefinition = ColumnDefinition::rendered(
    "price_change_percentage_24h_in_currency",
    "24h",
    |row| CellValue::number(row.price_change_percentage_24h_in_currency),
    |row, _| percentage_cell(row.price_change_percentage_24h_in_currency),
);

pub const CHANGE_7D: ColumnDefinition = ColumnDefinition::rendered(
    "price_change_percentage_7d_in_currency",
    "7d",
    |row| CellValue::number(row.price_change_percentage_7d_in_currency),
    |row, _| percentage_cell(row.price_change_percentage_7d_in_currency),
);

pub const VOLUME: ColumnDefinition = ColumnDefinition::rendered(
    "total_volume",
    "24h Volume",
    |row| CellValue::number(row.total_volume),
    |row, _| usd_cell(row.total_volume),
);

pub const MARKET_CAP: ColumnDefinition = ColumnDefinition::rendered(
    "market_cap",
    "Market Cap",
    |row| CellValue::number(row.market_cap),
    |row, _| usd_cell(row.market_cap),
);

pub const SPARKLINE: ColumnDefinition = ColumnDefinition::rendered(
    "sparkline",
    "Last 7 Days",
    |row| match &row.sparkline_in_7d {
        Some(s) if !s.price.is_empty() => CellValue::Series(s.price.clone()),
        _ => CellValue::Missing,
    },
    |row, _| match &row.sparkline_in_7d {
        Some(s) if !s.price.is_empty() => sparkline_cell(&s.price, SPARKLINE_WIDTH),
        _ => RenderedCell::plain(NOT_AVAILABLE),
    },
)
.unsortable();

pub static BUILTIN_COLUMNS: [ColumnDefinition; 9] = [
    INDEX, NAME, PRICE, CHANGE_1H, CHANGE_24H, CHANGE_7D, VOLUME, MARKET_CAP, SPARKLINE,
];

const SPARKLINE_WIDTH: usize = 14;
const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn usd_cell(value: Option<f64>) -> RenderedCell {
    match value {
        Some(v) if v.is_finite() => RenderedCell::plain(format_usd(v)),
        _ => RenderedCell::plain(NOT_AVAILABLE),
    }
}

fn percentage_cell(value: Option<f64>) -> RenderedCell {
    match value {
        Some(v) if v.is_finite() => {
            let (arrow, trend) = if v >= 0.0 {
                ('↑', Trend::Up)
            } else {
                ('↓', Trend::Down)
            };
            RenderedCell {
                text: format!("{arrow} {:.2}%", v.abs()),
                trend,
            }
        }
        _ => RenderedCell::plain(NOT_AVAILABLE),
    }
}

fn sparkline_cell(prices: &[f64], width: usize) -> RenderedCell {
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    let samples = width.min(prices.len());

    let text = (0..samples)
        .map(|i| prices[i * prices.len() / samples])
        .map(|p| {
            if span <= f64::EPSILON {
                SPARK_BARS[3]
            } else {
                let level = ((p - min) / span * (SPARK_BARS.len() - 1) as f64).round() as usize;
                SPARK_BARS[level.min(SPARK_BARS.len() - 1)]
            }
        })
        .collect::<String>();

    let trend = match (prices.first(), prices.last()) {
        (Some(first), Some(last)) if last >= first => Trend::Up,
        (Some(_), Some(_)) => Trend::Down,
        _ => Trend::Neutral,
    };
    RenderedCell { text, trend }
}

/// Ordered, immutable view over a set of column definitions.
#[derive(Debug, Clone, Copy)]
pub struct Registry<'a> {
    columns: &'a [ColumnDefinition],
}

impl<'a> Registry<'a> {
    pub const fn new(columns: &'a [ColumnDefinition]) -> Self {
        Registry { columns }
    }

    pub fn list_columns(&self) -> &'a [ColumnDefinition] {
        self.columns
    }

    /// A miss means the column is no longer available.
    pub fn get(&self, id: &str) -> Option<&'a ColumnDefinition> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.to_string()).collect()
    }
}

impl Registry<'static> {
    pub fn builtin() -> Self {
        Registry::new(&BUILTIN_COLUMNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Sparkline;

    fn row() -> MarketRow {
        MarketRow {
            id: "bitcoin".into(),
            symbol: "btc".into(),
            name: "Bitcoin".into(),
            current_price: Some(67187.0),
            price_change_percentage_24h_in_currency: Some(-1.234),
            sparkline_in_7d: Some(Sparkline {
                price: vec![1.0, 2.0, 3.0, 4.0],
            }),
            ..MarketRow::default()
        }
    }

    #[test]
    fn builtin_ids_are_unique() {
        let ids = Registry::builtin().ids();
        let mut dedup = ids.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(ids.len(), dedup.len());
    }

    #[test]
    fn lookup_miss_is_none() {
        assert!(Registry::builtin().get("old_field").is_none());
        assert_eq!(Registry::builtin().get("market_cap").unwrap().header, "Market Cap");
    }

    #[test]
    fn value_column_displays_accessor() {
        assert_eq!(NAME.render(&row(), 0).text, "Bitcoin");
        assert!(matches!(NAME.kind, ColumnKind::Value));
    }

    #[test]
    fn rendered_columns() {
        let r = row();
        assert_eq!(INDEX.render(&r, 4).text, "5");
        assert_eq!(PRICE.render(&r, 0).text, "$67,187");
        let change = CHANGE_24H.render(&r, 0);
        assert_eq!(change.text, "↓ 1.23%");
        assert_eq!(change.trend, Trend::Down);
        assert_eq!(SPARKLINE.render(&r, 0).text, "▁▃▆█");
    }

    #[test]
    fn missing_percentage_renders_placeholder() {
        let r = row();
        assert_eq!(CHANGE_1H.render(&r, 0).text, NOT_AVAILABLE);
        assert_eq!(CHANGE_1H.value_of(&r), CellValue::Missing);
        assert_eq!(VOLUME.render(&r, 0).text, NOT_AVAILABLE);
    }
}
