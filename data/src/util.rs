/// Round to a fixed number of decimal places.
pub fn round_dp(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Decimal places that keep a price tick readable on the axis.
pub fn count_decimals(value: f64) -> usize {
    if value >= 1_000.0 {
        1
    } else if value >= 1.0 {
        2
    } else if value >= 0.01 {
        4
    } else {
        6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_requested_precision() {
        assert_eq!(round_dp(1.23456, 4), 1.2346);
        assert_eq!(round_dp(1.23454, 4), 1.2345);
        assert_eq!(round_dp(-0.000_05, 4), -0.0001);
    }

    #[test]
    fn picks_decimals_by_magnitude() {
        assert_eq!(count_decimals(64_000.0), 1);
        assert_eq!(count_decimals(1.5), 2);
        assert_eq!(count_decimals(0.05), 4);
        assert_eq!(count_decimals(0.0001), 6);
    }
}
