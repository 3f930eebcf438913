/// Display label for a stored payment-type code. Unknown codes and NULL map
/// to an empty label.
pub fn payment_label(code: Option<i64>) -> &'static str {
    match code {
        Some(1) => "NAP",
        Some(2) => "SMS",
        Some(3) => "TC/TD",
        Some(4) => "SALDO",
        Some(5) => "ATM",
        _ => "",
    }
}
