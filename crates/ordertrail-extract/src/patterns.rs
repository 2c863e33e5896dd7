//! Ordered text-pattern tables shared by the merchant extractors and the
//! fallback parser. Within a table the first pattern that yields a usable
//! value wins.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::dates::resolve_date;

pub(crate) fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("pattern table compiles"))
        .collect()
}

macro_rules! pattern_table {
    ($name:ident, [$($pattern:expr),+ $(,)?]) => {
        pub static $name: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&[$($pattern),+]));
    };
}

pattern_table!(ORDER_ID, [
    r"Order\s*#?\s*([A-Z0-9\-]+)",
    r"Order\s*ID[:\s]+([A-Z0-9\-]+)",
    r"Your\s+order\s+([A-Z0-9\-]+)",
    r"Order\s+Number[:\s]+([A-Z0-9\-]+)",
    r"Order\s+([A-Z0-9\-]+)",
]);

pattern_table!(DELIVERED_ON, [
    r"Delivered\s+on[:\s]+([^.\n]+)",
    r"Delivery\s+date[:\s]+([^.\n]+)",
    r"Package\s+delivered[:\s]+([^.\n]+)",
]);

pattern_table!(ORDER_DATE, [
    r"placed\s+on\s+([^.\n]+)",
    r"Order\s+placed[:\s]+([^.\n]+)",
    r"Order\s+date[:\s]+([^.\n]+)",
    r"Ordered\s+on[:\s]+([^.\n]+)",
]);

/// Amounts in the order the plain-text parser tries them.
pattern_table!(AMOUNT, [
    r"(?:₹|\bRs\.?|\bINR|\$)\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"Amount[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"Total[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
]);

/// Labelled order totals, tried before any bare currency figure.
pattern_table!(ORDER_TOTAL, [
    r"Total\s+Amount[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"Net\s+Paid[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"Total\s+paid[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"(?:Grand|Order)\s+Total[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"(?:₹|Rs\.?|INR|\$)\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*Total",
    r"\bTotal[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"Amount\s+paid[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
    r"Amount[:\s]+(?:₹|Rs\.?|INR|\$)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
]);

pattern_table!(TRACKING_NUMBER, [
    r"Your\s+Tracking\s+Id[:\s]+([A-Z0-9\-]+)",
    r"Tracking\s+Number[:\s]+([A-Z0-9\-]+)",
    r"Tracking\s+ID[:\s]+([A-Z0-9\-]+)",
    r"Track\s+ID[:\s]+([A-Z0-9\-]+)",
    r"AWB(?:\s+No\.?)?[:\s]+([A-Z0-9\-]+)",
]);

pattern_table!(LOGISTICS_PARTNER, [
    r"Logistic(?:s)?\s+Partner[:\s]+([^\n]+)",
    r"Courier(?:\s+Partner)?[:\s]+([^\n]+)",
    r"Shipping\s+Partner[:\s]+([^\n]+)",
    r"Shipped\s+(?:via|with)\s+([^.\n]+)",
]);

pattern_table!(ESTIMATED_DELIVERY, [
    r"Expected\s+delivery[:\s]+(?:by\s+)?([^.\n]+)",
    r"Delivery\s+by[:\s]+([^.\n]+)",
    r"Estimated\s+delivery[:\s]+(?:by\s+)?([^.\n]+)",
    r"Arriving\s+(?:by|on)[:\s]+([^.\n]+)",
]);

pattern_table!(SHIPPING_DATE, [
    r"Shipped\s+on[:\s]+([^,\n]+)",
    r"Dispatched\s+on[:\s]+([^,\n]+)",
    r"Shipped.*?\bon\s+([^,\n]+)",
]);

pattern_table!(RETURN_DEADLINE, [
    r"Return\s+by[:\s]+([^.\n]+)",
    r"Return\s+deadline[:\s]+([^.\n]+)",
    r"Available\s+till[:\s]+([^.\n]+)",
    r"Return\s+window[:\s]+(?:closes\s+on\s+|ends\s+on\s+)?([^.\n]+)",
]);

pattern_table!(RETURN_WINDOW_DAYS, [
    r"(\d{1,3})[\s-]*days?\s+(?:easy\s+|free\s+)?(?:returns?|exchange)",
    r"return\s+(?:window|period|policy)\s*(?:of|is|:)?\s*(\d{1,3})\s*days",
    r"return\s+within\s+(\d{1,3})\s*days",
]);

/// Currency-prefixed figure, used by the product cascade.
pub static CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:₹|\bRs\.?|\bINR|\$)\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)")
        .expect("currency regex")
});

/// Sender domain to merchant display name.
pub const MERCHANT_DOMAINS: &[(&str, &str)] = &[
    ("flipkart.com", "Flipkart"),
    ("amazon.in", "Amazon"),
    ("myntra.com", "Myntra"),
    ("nykaa.com", "Nykaa"),
    ("zomato.com", "Zomato"),
    ("hm.com", "H&M"),
];

/// A value lifted from text along with the pattern that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub value: String,
    pub pattern: String,
}

pub fn merchant_for_sender(sender: &str) -> Option<&'static str> {
    let address = sender
        .rsplit('<')
        .next()
        .unwrap_or(sender)
        .trim()
        .trim_end_matches('>');
    let domain = address.rsplit_once('@').map(|(_, d)| d)?.trim().to_ascii_lowercase();
    MERCHANT_DOMAINS
        .iter()
        .find(|(known, _)| domain == *known || domain.ends_with(&format!(".{known}")))
        .map(|(_, merchant)| *merchant)
}

pub fn first_capture(patterns: &[Regex], text: &str) -> Option<Capture> {
    first_capture_where(patterns, text, |_| true)
}

/// First capture, across patterns in order and matches in document order,
/// that `accept` allows.
pub fn first_capture_where(
    patterns: &[Regex],
    text: &str,
    accept: impl Fn(&str) -> bool,
) -> Option<Capture> {
    patterns.iter().find_map(|pattern| {
        pattern.captures_iter(text).find_map(|caps| {
            let value = caps.get(1)?.as_str().trim();
            (!value.is_empty() && accept(value)).then(|| Capture {
                value: value.to_string(),
                pattern: pattern.as_str().to_string(),
            })
        })
    })
}

/// Order ids must carry a digit; this keeps phrases like "Order confirmed"
/// from yielding "confirmed".
pub fn first_order_id(patterns: &[Regex], text: &str) -> Option<Capture> {
    first_capture_where(patterns, text, looks_like_order_id)
}

pub fn looks_like_order_id(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

pub fn first_date(
    patterns: &[Regex],
    text: &str,
    reference: NaiveDate,
) -> Option<(NaiveDate, Capture)> {
    patterns.iter().find_map(|pattern| {
        pattern.captures_iter(text).find_map(|caps| {
            let raw = caps.get(1)?.as_str();
            let date = resolve_date(raw, reference)?;
            Some((
                date,
                Capture {
                    value: raw.trim().to_string(),
                    pattern: pattern.as_str().to_string(),
                },
            ))
        })
    })
}

pub fn first_amount(patterns: &[Regex], text: &str) -> Option<(Decimal, Capture)> {
    patterns.iter().find_map(|pattern| {
        pattern.captures_iter(text).find_map(|caps| {
            let raw = caps.get(1)?.as_str();
            let amount = parse_amount(raw)?;
            Some((
                amount,
                Capture {
                    value: raw.to_string(),
                    pattern: pattern.as_str().to_string(),
                },
            ))
        })
    })
}

pub fn first_days(patterns: &[Regex], text: &str) -> Option<(u32, Capture)> {
    first_capture_where(patterns, text, |v| v.parse::<u32>().is_ok_and(|d| d > 0 && d <= 365))
        .and_then(|cap| Some((cap.value.parse().ok()?, cap)))
}

/// Parse `1,299.00` style figures.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('.')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(&cleaned).ok()
}

/// Pull the first currency figure out of an element's text, e.g. `₹ 1,299`.
pub fn amount_in(text: &str) -> Option<Decimal> {
    CURRENCY_AMOUNT
        .captures(text)
        .and_then(|caps| parse_amount(caps.get(1)?.as_str()))
        .or_else(|| {
            let digits: String = text
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
                .collect();
            parse_amount(&digits)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn merchant_from_sender_domain() {
        assert_eq!(merchant_for_sender("updates@myntra.com"), Some("Myntra"));
        assert_eq!(merchant_for_sender("Myntra <updates@MYNTRA.com>"), Some("Myntra"));
        assert_eq!(merchant_for_sender("no-reply@mail.flipkart.com"), Some("Flipkart"));
        assert_eq!(merchant_for_sender("orders@hm.com"), Some("H&M"));
        assert_eq!(merchant_for_sender("alerts@bank.example"), None);
        assert_eq!(merchant_for_sender("not-an-address"), None);
        assert_eq!(merchant_for_sender("x@notmyntra.com"), None);
    }

    #[test]
    fn order_id_requires_a_digit() {
        let text = "Order confirmed!\nYour Order ID: OD4455667788 is on its way";
        let cap = first_order_id(&ORDER_ID, text).unwrap();
        assert_eq!(cap.value, "OD4455667788");
        assert!(first_order_id(&ORDER_ID, "Order confirmed. Order summary").is_none());
    }

    #[test]
    fn dates_skip_unparseable_captures() {
        let reference = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
        let text = "Return window: 30 days\nReturn by 25 Jan 2025";
        let (date, cap) = first_date(&RETURN_DEADLINE, text, reference).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 25).unwrap());
        assert!(cap.pattern.contains("Return\\s+by"));
    }

    #[test]
    fn amounts_and_windows() {
        assert_eq!(parse_amount("1,299.00"), Some(dec!(1299.00)));
        assert_eq!(amount_in("₹ 2,499"), Some(dec!(2499)));
        assert_eq!(amount_in("Rs. 799.50 only"), Some(dec!(799.50)));
        assert_eq!(amount_in("1,200"), Some(dec!(1200)));
        assert_eq!(amount_in("free"), None);
        let (total, _) = first_amount(&ORDER_TOTAL, "Item ₹950\nTotal Amount: ₹1,200").unwrap();
        assert_eq!(total, dec!(1200));
        let (days, _) = first_days(&RETURN_WINDOW_DAYS, "Enjoy 14 days easy returns").unwrap();
        assert_eq!(days, 14);
    }

    #[test]
    fn offers_is_not_a_rupee_prefix() {
        assert!(CURRENCY_AMOUNT.captures("Offers 500").is_none());
        assert!(CURRENCY_AMOUNT.captures("Rs 500").is_some());
    }
}
