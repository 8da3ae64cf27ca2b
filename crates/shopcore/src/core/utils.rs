//! Money and phone formatting shared by the bot messages.

use rust_decimal::Decimal;

/// Currency suffix shown to customers.
pub const CURRENCY_SUFFIX: &str = "руб.";

/// Formats a price for display: `1 000 руб.` or `1 000,50 руб.`
///
/// Thousands are separated by a space and the decimal separator is a comma,
/// the way prices are written in Russian.
pub fn format_price(price: Decimal) -> String {
    let rounded = price.round_dp(2);
    let rendered = format!("{:.2}", rounded.abs());
    let (whole, fraction) = rendered.split_once('.').unwrap_or((rendered.as_str(), "00"));

    let mut out = String::new();
    if rounded.is_sign_negative() && !rounded.is_zero() {
        out.push('-');
    }
    out.push_str(&group_thousands(whole));
    if fraction != "00" {
        out.push(',');
        out.push_str(fraction);
    }
    out.push(' ');
    out.push_str(CURRENCY_SUFFIX);
    out
}

/// Plain amount without trailing zeros, e.g. `1000` or `999.5`.
pub fn format_amount(amount: Decimal) -> String {
    amount.round_dp(2).normalize().to_string()
}

/// Normalizes a phone number typed by a customer.
///
/// Russian numbers come out as `+7XXXXXXXXXX` whether they were typed with a
/// leading `8`, `7`, `+7` or without a country code. Other numbers keep their
/// digits behind a `+`. Input without digits gives `None`.
pub fn format_phone_number(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();

    match digits.len() {
        0 => None,
        11 if digits.starts_with('8') || digits.starts_with('7') => Some(format!("+7{}", &digits[1..])),
        10 => Some(format!("+7{digits}")),
        _ => Some(format!("+{digits}")),
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}
