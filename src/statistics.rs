use crate::domain::Statistic;

/// Text written in place of an undefined statistic.
pub const UNDEFINED: &str = "nan";

/// Reduces `values` with `statistic`, skipping missing entries.
///
/// Returns `None` when nothing is left once missing entries are dropped.
pub fn reduce(statistic: Statistic, values: &[Option<f64>]) -> Option<f64> {
    let present = values.iter().flatten().copied().collect::<Vec<_>>();
    if present.is_empty() {
        return None;
    }
    let value = match statistic {
        Statistic::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
        Statistic::Mean => mean(&present),
        Statistic::Median => median(present),
        Statistic::Var => variance(&present),
    };
    Some(value)
}

/// Element-wise mean across aligned score vectors, ignoring missing entries.
///
/// Shorter vectors count as missing past their end; a column with no reading
/// in any vector stays missing.
pub fn average_columns(vectors: &[Vec<Option<f64>>]) -> Vec<Option<f64>> {
    let width = vectors.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|column| {
            let (sum, count) = vectors
                .iter()
                .filter_map(|vector| vector.get(column).copied().flatten())
                .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

/// Fraction of missing entries; an empty vector counts as fully missing.
pub fn missing_fraction(values: &[Option<f64>]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let missing = values.iter().filter(|value| value.is_none()).count();
    missing as f64 / values.len() as f64
}

/// Formats a statistic for a mined file. Integral values keep one decimal so
/// the column always reads as floating point.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        None => UNDEFINED.to_string(),
        Some(value) if value.is_nan() => UNDEFINED.to_string(),
        Some(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 => {
            format!("{value:.1}")
        }
        Some(value) => format!("{value}"),
    }
}

/// Parses a value written by [`format_value`] (or an upstream `NA`).
pub fn parse_value(token: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    match token.trim() {
        "" | "NA" | "nan" | "NaN" => Ok(None),
        other => other.parse::<f64>().map(Some),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    let center = mean(values);
    values
        .iter()
        .map(|value| (value - center).powi(2))
        .sum::<f64>()
        / values.len() as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    }
}
