//! Field cleaners shared by every source's normalization path. Adapter
//! output is freeform text ("£12,500", "72,000 miles"); these pull out the
//! numeric value or give up with None.

/// Extract a price from freeform text. Strips currency markers, commas and
/// common prefixes before matching.
pub fn clean_price(price_text: &str) -> Option<f64> {
    if price_text.is_empty() {
        return None;
    }
    let stripped = price_text
        .to_lowercase()
        .replace(['£', ',', '+'], "")
        .replace("from", "")
        .replace("starting", "")
        .replace("price", "")
        .replace(char::is_whitespace, "");

    let re = regex::Regex::new(r"(\d+(?:\.\d{2})?)").expect("valid regex");
    re.captures(&stripped)
        .and_then(|cap| cap[1].parse::<f64>().ok())
}

/// Extract mileage from freeform text ("72,000 miles" → 72000).
pub fn clean_mileage(mileage_text: &str) -> Option<i64> {
    if mileage_text.is_empty() {
        return None;
    }
    let stripped = mileage_text
        .to_lowercase()
        .replace("mileage", "")
        .replace("miles", "")
        .replace("mile", "")
        .replace([','], "")
        .replace(char::is_whitespace, "");

    let re = regex::Regex::new(r"(\d+)").expect("valid regex");
    re.captures(&stripped)
        .and_then(|cap| cap[1].parse::<i64>().ok())
}

/// Extract a model year. Rejects anything outside 1990..=current_year+1.
pub fn clean_year(year_text: &str, current_year: i32) -> Option<i32> {
    if year_text.is_empty() {
        return None;
    }
    let re = regex::Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid regex");
    let year = re
        .captures(year_text)
        .and_then(|cap| cap[1].parse::<i32>().ok())?;
    if (1990..=current_year + 1).contains(&year) {
        Some(year)
    } else {
        None
    }
}

/// Normalize a postcode: uppercase, collapse whitespace, and insert the
/// space before the 3-character inward code if missing ("M11AA" → "M1 1AA").
pub fn format_postcode(postcode: &str) -> String {
    let collapsed = regex::Regex::new(r"\s+")
        .expect("valid regex")
        .replace_all(postcode.trim(), " ")
        .to_uppercase();

    if !collapsed.contains(' ') && collapsed.len() >= 5 {
        let (outward, inward) = collapsed.split_at(collapsed.len() - 3);
        return format!("{outward} {inward}");
    }
    collapsed
}

/// The outward part of a postcode ("M1 1AA" → "M1"). Yield feedback
/// aggregates at this granularity, matching the region table codes.
pub fn area_code(postcode: &str) -> String {
    match postcode.split_whitespace().next() {
        Some(outward) => outward.to_uppercase(),
        None => postcode.to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_strips_currency_and_commas() {
        assert_eq!(clean_price("£12,500"), Some(12_500.0));
        assert_eq!(clean_price("from £9,995 + VAT"), Some(9_995.0));
        assert_eq!(clean_price("1250.50"), Some(1_250.50));
        assert_eq!(clean_price("POA"), None);
        assert_eq!(clean_price(""), None);
    }

    #[test]
    fn mileage_strips_units() {
        assert_eq!(clean_mileage("72,000 miles"), Some(72_000));
        assert_eq!(clean_mileage("Mileage: 88000"), Some(88_000));
        assert_eq!(clean_mileage("n/a"), None);
    }

    #[test]
    fn year_bounds_are_enforced() {
        assert_eq!(clean_year("2018 Ford Transit", 2026), Some(2018));
        assert_eq!(clean_year("reg 1989", 2026), None);
        assert_eq!(clean_year("2031", 2026), None);
        // Next model year is allowed.
        assert_eq!(clean_year("2027", 2026), Some(2027));
    }

    #[test]
    fn postcode_formatting() {
        assert_eq!(format_postcode("m11aa"), "M1 1AA");
        assert_eq!(format_postcode("  sw1a   1aa "), "SW1A 1AA");
        assert_eq!(format_postcode("M1 1AA"), "M1 1AA");
    }

    #[test]
    fn area_code_takes_outward_part() {
        assert_eq!(area_code("M1 1AA"), "M1");
        assert_eq!(area_code("sw1a 2bb"), "SW1A");
        assert_eq!(area_code("M1"), "M1");
    }
}
