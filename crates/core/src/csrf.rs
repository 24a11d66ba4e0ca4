//! CSRF token lookup in the ambient cookie string.

/// Cookie Django stores its CSRF token in.
pub const DEFAULT_COOKIE: &str = "csrftoken";

/// Header the token travels back in on write requests.
pub const DEFAULT_HEADER: &str = "X-CSRFToken";

/// URL-decoded value of cookie `name`, or `None` when it is absent or not
/// valid UTF-8 once decoded. The first matching cookie wins.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let raw = cookies
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name).and_then(|rest| rest.strip_prefix('=')))?;
    urlencoding::decode(raw).ok().map(|v| v.into_owned())
}
