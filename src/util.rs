// Parsing and formatting helpers.
//
// Certificate cells are free text; these keep the "is this a number"
// decision in one place so the classifier only sees clean values.
use num_format::{Locale, ToFormattedString};

/// Parse a certificate cell into `f64`, forgiving of common export noise.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (`"N/A"`, `"NO DATA!"`).
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Thousands-separated integer for log lines (e.g. `9,855 records`).
pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Statistic cell text; undefined statistics render empty.
pub fn format_stat(v: Option<f64>) -> String {
    match v {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{:.4}", v),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_grouped_numbers() {
        assert_eq!(parse_f64_safe(" 42 "), Some(42.0));
        assert_eq!(parse_f64_safe("1,234.5"), Some(1234.5));
        assert_eq!(parse_f64_safe("-3"), Some(-3.0));
    }

    #[test]
    fn rejects_text_and_blanks() {
        assert_eq!(parse_f64_safe(""), None);
        assert_eq!(parse_f64_safe("NO DATA!"), None);
        assert_eq!(parse_f64_safe("12kWh"), None);
        assert_eq!(parse_f64_safe("--"), None);
    }

    #[test]
    fn formats_counts_and_stats() {
        assert_eq!(format_int(9855u64), "9,855");
        assert_eq!(format_stat(Some(4.0)), "4");
        assert_eq!(format_stat(Some(2.5)), "2.5000");
        assert_eq!(format_stat(None), "");
    }
}
