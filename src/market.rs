use serde::{Deserialize, Serialize};

/// One entry of the upstream `/coins/markets` listing.
///
/// Only `id` and `name` are required. Every figure may be absent or `null`
/// upstream and renders as a placeholder instead of failing the row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    pub sparkline_in_7d: Option<Sparkline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sparkline {
    #[serde(default)]
    pub price: Vec<f64>,
}

/// Primitive value a column accessor extracts from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Series(Vec<f64>),
    Missing,
}

impl CellValue {
    pub fn number(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_grouped(*n, 2),
            CellValue::Series(s) => format!("[{} points]", s.len()),
            CellValue::Missing => NOT_AVAILABLE.to_string(),
        }
    }
}

pub const NOT_AVAILABLE: &str = "N/A";

/// Formats `value` with thousands separators and at most `decimals` fraction
/// digits, trailing zeros removed.
pub fn format_grouped(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (formatted.as_str(), ""),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, chr) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(chr);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    if frac_part.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac_part}")
    }
}

/// Dollar amount, with more precision for sub-dollar prices.
pub fn format_usd(value: f64) -> String {
    let decimals = if value.abs() >= 1.0 { 2 } else { 6 };
    format!("${}", format_grouped(value, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_numbers() {
        assert_eq!(format_grouped(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_grouped(999.0, 2), "999");
        assert_eq!(format_grouped(-1000.5, 2), "-1,000.5");
        assert_eq!(format_grouped(-0.0001, 2), "0");
    }

    #[test]
    fn usd_precision_depends_on_magnitude() {
        assert_eq!(format_usd(67187.0), "$67,187");
        assert_eq!(format_usd(0.000123), "$0.000123");
    }

    #[test]
    fn null_figures_deserialize_as_missing() {
        let row: MarketRow = serde_json::from_str(
            r#"{"id":"x","name":"X","current_price":null,"market_cap":5}"#,
        )
        .unwrap();
        assert_eq!(row.current_price, None);
        assert_eq!(row.market_cap, Some(5.0));
        assert!(CellValue::number(row.current_price).is_missing());
    }
}
