use url::Url;

/// Scales `price` by `pct` percent, rounding down and saturating at
/// `u128::MAX`.
pub const fn apply_markup(price: u128, pct: u64) -> u128 {
    let pct = pct as u128;
    // Split so that only a true overflow of the result saturates.
    (price / 100).saturating_mul(pct).saturating_add(price % 100 * pct / 100)
}

/// Derives a websocket endpoint from an HTTP RPC URL.
///
/// The scheme becomes `wss`, Infura style `/v3/` paths become `/ws/v3/`, and
/// a trailing slash is dropped. Returns `None` if the URL cannot carry a
/// websocket scheme.
pub fn ws_url_from_http(http: &Url) -> Option<String> {
    let mut ws = http.clone();
    ws.set_scheme("wss").ok()?;

    let path = ws.path();
    if path.contains("/v3/") && !path.contains("/ws/v3/") {
        let path = path.replacen("/v3/", "/ws/v3/", 1);
        ws.set_path(&path);
    }

    Some(ws.as_str().trim_end_matches('/').to_owned())
}
