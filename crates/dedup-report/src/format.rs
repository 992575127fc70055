const PREFIXES: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

/// Formats a byte count as an IEC value ("5.6 MiB"). Falls through to the
/// "Yi" prefix for anything that doesn't fit the table above.
pub fn sizeof_fmt(bytes: u64) -> String {
    let mut num = bytes as f64;
    for prefix in PREFIXES {
        if num.abs() < 1024.0 {
            return format!("{num:3.1} {prefix}B");
        }
        num /= 1024.0;
    }
    format!("{num:.1} YiB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bytes_formats_plain() {
        assert_eq!(sizeof_fmt(0), "0.0 B");
    }

    #[test]
    fn exact_kibibyte_steps_up_a_prefix() {
        assert_eq!(sizeof_fmt(1024), "1.0 KiB");
    }

    #[test]
    fn fractional_mebibyte_keeps_one_decimal() {
        assert_eq!(sizeof_fmt(1024 * 1024 * 3 / 2), "1.5 MiB");
    }

    #[test]
    fn falls_through_every_prefix_to_yi() {
        let huge = u64::MAX;
        let formatted = sizeof_fmt(huge);
        assert!(formatted.ends_with("YiB"));
    }
}
