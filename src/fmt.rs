/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let negative = val < 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

/// Share of a total as a percentage with one decimal: 66.7%
pub fn percent(pct: f64) -> String {
    format!("{pct:.1}%")
}

/// Text bar for terminal tables.
pub fn bar(len: usize) -> String {
    "\u{2588}".repeat(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.00), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(42.10), "$42.10");
    }

    #[test]
    fn test_percent_and_bar() {
        assert_eq!(percent(200.0 / 3.0), "66.7%");
        assert_eq!(percent(0.0), "0.0%");
        assert_eq!(bar(3).chars().count(), 3);
        assert!(bar(0).is_empty());
    }
}
