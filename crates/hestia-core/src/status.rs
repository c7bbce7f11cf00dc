use http::StatusCode;

/// Reason phrase for a status code.
///
/// Codes with a registered phrase render it; anything else renders
/// `Unspecified`.
#[must_use]
pub fn reason_phrase(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unspecified")
}
