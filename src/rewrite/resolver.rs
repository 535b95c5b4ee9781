//! URI resolution against a playlist's base URL.
//!
//! Playlists come from uncontrolled third-party origins, so the base URL is
//! not guaranteed to parse cleanly. When `url::Url` refuses the base, a
//! string-based fallback performs the join instead of failing the rewrite.

use tracing::debug;
use url::Url;

/// Resolve `target` against `base`.
///
/// Checked in order: already-absolute targets pass through unchanged,
/// protocol-relative targets inherit the base's scheme, everything else is
/// joined against the base per normal URL semantics.
pub fn resolve_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }

    if let Some(rest) = target.strip_prefix("//") {
        let scheme = base.split("://").next().filter(|s| !s.is_empty());
        return match scheme {
            Some("https") => format!("https://{rest}"),
            _ => format!("http://{rest}"),
        };
    }

    match Url::parse(base) {
        Ok(parsed) => match parsed.join(target) {
            Ok(joined) => joined.to_string(),
            Err(e) => {
                debug!("URL join failed for {target} against {base}: {e}");
                manual_join(base, target)
            }
        },
        Err(e) => {
            debug!("unparseable base URL {base}: {e}");
            manual_join(base, target)
        }
    }
}

/// String-based join for bases `url::Url` cannot parse.
fn manual_join(base: &str, target: &str) -> String {
    // Drop any query/fragment from the base before path math.
    let base = base.split(['?', '#']).next().unwrap_or(base);

    if let Some(abs_path) = target.strip_prefix('/') {
        // Absolute path: keep scheme://host only.
        let origin = match base.find("://") {
            Some(idx) => {
                let after = idx + 3;
                match base[after..].find('/') {
                    Some(slash) => &base[..after + slash],
                    None => base,
                }
            }
            None => base.trim_end_matches('/'),
        };
        return format!("{}/{}", origin.trim_end_matches('/'), abs_path);
    }

    // Relative path: replace everything after the last slash.
    match base.rfind('/') {
        Some(idx) if idx > base.find("://").map(|i| i + 2).unwrap_or(0) => {
            format!("{}/{}", &base[..idx], target)
        }
        _ => format!("{}/{}", base.trim_end_matches('/'), target),
    }
}
