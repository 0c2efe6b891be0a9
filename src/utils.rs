use anyhow::{anyhow, Result};
use ethers::types::{Address, U256};

/// Convert an integer amount of base units into a decimal string with
/// `decimals` fraction digits (e.g. wei -> ETH).
pub fn from_token_unit(amount: U256, decimals: u32) -> String {
    ethers::utils::format_units(amount, decimals).unwrap_or_else(|_| "0".to_string())
}

/// Parse a decimal token amount into integer base units.
///
/// # Errors
/// Returns an error for empty, negative or malformed input.
pub fn to_token_unit(amount: &str, decimals: u32) -> Result<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Amount cannot be empty"));
    }
    if trimmed.starts_with('-') {
        return Err(anyhow!("Amount cannot be negative: {}", trimmed));
    }

    ethers::utils::parse_units(trimmed, decimals)
        .map(|pu| pu.into())
        .map_err(|e| anyhow!("Invalid amount '{}': {}", trimmed, e))
}

/// Human-readable rendering of a decimal amount, used for fee and balance display.
///
/// Precision shrinks as the magnitude grows; values from a million upward
/// switch to M/B/T suffixes. Anything that does not parse renders as "0".
pub fn format_amount(number: &str) -> String {
    let value: f64 = match number.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return "0".to_string(),
    };

    if value == 0.0 {
        return "0".to_string();
    }
    if value < 0.001 {
        return "< 0.001".to_string();
    }

    let (scaled, fraction_digits, suffix) = if value < 1_000.0 {
        (value, 5, "")
    } else if value < 10_000.0 {
        (value, 4, "")
    } else if value < 100_000.0 {
        (value, 3, "")
    } else if value < 1_000_000.0 {
        (value, 2, "")
    } else if value < 10_000_000.0 {
        (value, 1, "")
    } else if value < 100_000_000.0 {
        (value, 0, "")
    } else if value < 1e9 {
        (value / 1e6, 3, " M")
    } else if value < 1e12 {
        (value / 1e9, 3, " B")
    } else if value < 1e15 {
        (value / 1e12, 3, " T")
    } else {
        return "> 1000T".to_string();
    };

    let fixed = format!("{:.*}", fraction_digits, scaled);
    format!("{}{}", group_thousands(trim_fraction_zeros(&fixed)), suffix)
}

fn trim_fraction_zeros(fixed: &str) -> &str {
    if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.')
    } else {
        fixed
    }
}

fn group_thousands(number: &str) -> String {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (number, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    }
}

/// Case-insensitive address comparison; blank input never matches.
pub fn same_address(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// EIP-55 checksummed representation of an address
pub fn checksum(address: &Address) -> String {
    ethers::utils::to_checksum(address, None)
}

/// Parse a user-supplied address, tolerating surrounding whitespace
pub fn parse_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    trimmed
        .parse::<Address>()
        .map_err(|e| anyhow!("Invalid address '{}': {}", trimmed, e))
}

/// Shorten an address for compact display: 0x1234…abcd
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== from_token_unit tests ====================

    #[test]
    fn test_from_token_unit_fallback_gas() {
        let result = from_token_unit(U256::from(10_000u64), 18);
        assert_eq!(result, "0.000000000000010000");
    }

    #[test]
    fn test_from_token_unit_six_decimals() {
        let result = from_token_unit(U256::from(1_500_000u64), 6);
        assert_eq!(result, "1.500000");
    }

    // ==================== to_token_unit tests ====================

    #[test]
    fn test_to_token_unit_ether() {
        let result = to_token_unit("1", 18).unwrap();
        assert_eq!(result, U256::from(10u64.pow(18)));
    }

    #[test]
    fn test_to_token_unit_six_decimals_fractional() {
        let result = to_token_unit(" 1.5 ", 6).unwrap();
        assert_eq!(result, U256::from(1_500_000u64));
    }

    #[test]
    fn test_to_token_unit_empty_fails() {
        let result = to_token_unit("   ", 18);
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_to_token_unit_negative_fails() {
        let result = to_token_unit("-2", 18);
        assert!(result.unwrap_err().to_string().contains("negative"));
    }

    #[test]
    fn test_to_token_unit_invalid_fails() {
        assert!(to_token_unit("abc", 18).is_err());
    }

    // ==================== format_amount tests ====================

    #[test]
    fn test_format_amount_zero() {
        assert_eq!(format_amount("0"), "0");
        assert_eq!(format_amount("0.000000000000000000"), "0");
    }

    #[test]
    fn test_format_amount_dust() {
        assert_eq!(format_amount("0.000000000000010000"), "< 0.001");
        assert_eq!(format_amount("0.0009"), "< 0.001");
    }

    #[test]
    fn test_format_amount_small_keeps_five_digits() {
        assert_eq!(format_amount("0.0021"), "0.0021");
        assert_eq!(format_amount("0.123456789"), "0.12346");
    }

    #[test]
    fn test_format_amount_thousands() {
        assert_eq!(format_amount("1234.5"), "1,234.5");
        assert_eq!(format_amount("54321.98765"), "54,321.988");
    }

    #[test]
    fn test_format_amount_millions_without_suffix() {
        assert_eq!(format_amount("2500000"), "2,500,000");
    }

    #[test]
    fn test_format_amount_suffixes() {
        assert_eq!(format_amount("123456789"), "123.457 M");
        assert_eq!(format_amount("1500000000"), "1.5 B");
        assert_eq!(format_amount("2000000000000"), "2 T");
        assert_eq!(format_amount("1e16"), "> 1000T");
    }

    #[test]
    fn test_format_amount_unparseable() {
        assert_eq!(format_amount("abc"), "0");
        assert_eq!(format_amount(""), "0");
    }

    // ==================== address helper tests ====================

    #[test]
    fn test_same_address_ignores_case() {
        assert!(same_address(
            "0xAbCdEf0000000000000000000000000000000001",
            "0xabcdef0000000000000000000000000000000001"
        ));
        assert!(!same_address("0x1", "0x2"));
        assert!(!same_address("", ""));
    }

    #[test]
    fn test_checksum_roundtrip() {
        let address: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        assert_eq!(checksum(&address), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn test_parse_address_trims() {
        let address = parse_address("  0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed ").unwrap();
        assert_eq!(checksum(&address), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert!(parse_address("nope").is_err());
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            "0x5aAe…eAed"
        );
        assert_eq!(short_address("0x1"), "0x1");
    }

    #[test]
    fn test_short_address_non_ascii() {
        assert_eq!(short_address("0xé5aAeb6053F3E94C9bé"), "0xé5a…C9bé");
        assert_eq!(short_address("ééééé"), "ééééé");
    }
}
