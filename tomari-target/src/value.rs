//! 値の整形

/// 整数を基数に従って整形する
///
/// 対応する基数は 16 と 10 のみです。16 進数は `0x` 接頭辞付きで表示し、
/// 16 以外の基数（0 や 8 を含む）はすべて 10 進数として扱います。
pub fn format_integer(value: i64, radix: u32) -> String {
    match radix {
        16 if value < 0 => format!("-0x{:x}", value.unsigned_abs()),
        16 => format!("0x{:x}", value),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integer() {
        assert_eq!(format_integer(255, 10), "255");
        assert_eq!(format_integer(255, 16), "0xff");
        assert_eq!(format_integer(-16, 16), "-0x10");
        assert_eq!(format_integer(-16, 0), "-16");
        assert_eq!(format_integer(8, 8), "8");
        assert_eq!(format_integer(5, 2), "5");
    }
}
