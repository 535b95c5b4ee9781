//! M3U8 manifest rewriting.
//!
//! The rewriter walks a playlist line by line, classifies each line once into
//! a [`TagKind`], and dispatches on it. Every URI it touches is variable-
//! substituted, resolved against the upstream's post-redirect URL, and
//! replaced with a same-origin proxy URL pointing at the endpoint kind that
//! knows how to serve it (`segment`, `key`, or `m3u8`).
//!
//! A malformed tag must never fail the pass: tag handlers return `Option`
//! and the caller falls back to emitting the original line, so one broken
//! attribute cannot corrupt the rest of the manifest.

pub mod resolver;
pub mod vars;

use resolver::resolve_url;
use std::ops::Range;
use vars::{VariableTable, parse_define};

/// Everything a per-tag handler needs, fixed for one rewrite pass.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// Post-redirect URL of the fetched playlist. Authoritative base for
    /// relative-URI resolution.
    pub base_url: String,
    /// Scheme + host of this proxy, derived from the inbound request.
    pub proxy_base: String,
    /// Source key threaded into every proxied URL as `moontv-source`.
    pub source_key: Option<String>,
    /// When set, segment-kind URIs are resolved but left unproxied; the
    /// upstream already serves them with permissive CORS. Keys and nested
    /// manifests are always proxied.
    pub allow_cors: bool,
}

/// Which proxy endpoint a rewritten URI should point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Segment,
    Key,
    M3u8,
}

impl EndpointKind {
    fn path(self) -> &'static str {
        match self {
            EndpointKind::Segment => "segment",
            EndpointKind::Key => "key",
            EndpointKind::M3u8 => "m3u8",
        }
    }
}

/// One-shot classification of a manifest line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Define,
    Map,
    Key,
    SessionKey,
    Media,
    Part,
    ContentSteering,
    SessionData,
    StreamInf,
    DateRange,
    PreloadHint,
    RenditionReport,
    ServerControl,
    Skip,
    /// Any other tag or comment line, emitted unchanged.
    Comment,
    Blank,
    /// Bare URI line (segment or variant-playlist reference).
    PlainUri,
}

impl TagKind {
    pub fn classify(line: &str) -> TagKind {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return TagKind::Blank;
        }
        let Some(rest) = trimmed.strip_prefix('#') else {
            return TagKind::PlainUri;
        };

        // Prefixes include the colon so EXT-X-MEDIA never matches
        // EXT-X-MEDIA-SEQUENCE, nor EXT-X-PART EXT-X-PART-INF.
        const TABLE: &[(&str, TagKind)] = &[
            ("EXT-X-DEFINE:", TagKind::Define),
            ("EXT-X-MAP:", TagKind::Map),
            ("EXT-X-KEY:", TagKind::Key),
            ("EXT-X-SESSION-KEY:", TagKind::SessionKey),
            ("EXT-X-MEDIA:", TagKind::Media),
            ("EXT-X-PART:", TagKind::Part),
            ("EXT-X-CONTENT-STEERING:", TagKind::ContentSteering),
            ("EXT-X-SESSION-DATA:", TagKind::SessionData),
            ("EXT-X-STREAM-INF:", TagKind::StreamInf),
            ("EXT-X-DATERANGE:", TagKind::DateRange),
            ("EXT-X-PRELOAD-HINT:", TagKind::PreloadHint),
            ("EXT-X-RENDITION-REPORT:", TagKind::RenditionReport),
            ("EXT-X-SERVER-CONTROL:", TagKind::ServerControl),
            ("EXT-X-SKIP:", TagKind::Skip),
        ];

        for (prefix, kind) in TABLE {
            if rest.starts_with(prefix) {
                return *kind;
            }
        }
        TagKind::Comment
    }
}

/// Rewrite a full playlist. Infallible: lines the rewriter cannot handle are
/// emitted unchanged.
pub fn rewrite_playlist(content: &str, ctx: &RewriteContext) -> String {
    let mut variables = VariableTable::new();
    let mut out = String::with_capacity(content.len() * 2);
    // Set after EXT-X-STREAM-INF: the next bare URI is a variant playlist,
    // not a segment.
    let mut pending_variant = false;

    for line in content.lines() {
        let rewritten = match TagKind::classify(line) {
            TagKind::Define => {
                if let Some((name, value)) = tag_attrs(line).and_then(parse_define) {
                    variables.define(name, value);
                }
                line.to_string()
            }
            TagKind::Map | TagKind::Part | TagKind::PreloadHint | TagKind::SessionData => {
                rewrite_uri_attr(line, "URI", EndpointKind::Segment, ctx, &variables)
                    .unwrap_or_else(|| line.to_string())
            }
            TagKind::Key | TagKind::SessionKey => {
                rewrite_uri_attr(line, "URI", EndpointKind::Key, ctx, &variables)
                    .unwrap_or_else(|| line.to_string())
            }
            TagKind::Media => rewrite_media(line, ctx, &variables),
            TagKind::ContentSteering => {
                rewrite_uri_attr(line, "SERVER-URI", EndpointKind::M3u8, ctx, &variables)
                    .unwrap_or_else(|| line.to_string())
            }
            TagKind::RenditionReport => {
                rewrite_uri_attr(line, "URI", EndpointKind::M3u8, ctx, &variables)
                    .unwrap_or_else(|| line.to_string())
            }
            TagKind::StreamInf => {
                pending_variant = true;
                line.to_string()
            }
            TagKind::DateRange => rewrite_daterange(line, ctx, &variables),
            TagKind::ServerControl | TagKind::Skip | TagKind::Comment | TagKind::Blank => {
                line.to_string()
            }
            TagKind::PlainUri => {
                let kind = if pending_variant {
                    EndpointKind::M3u8
                } else {
                    EndpointKind::Segment
                };
                pending_variant = false;
                rewrite_target(line.trim(), kind, ctx, &variables)
            }
        };

        out.push_str(&rewritten);
        out.push('\n');
    }

    out
}

/// Substitute, resolve, and proxy one URI.
fn rewrite_target(raw: &str, kind: EndpointKind, ctx: &RewriteContext, vars: &VariableTable) -> String {
    let substituted = vars.substitute(raw);
    let resolved = resolve_url(&ctx.base_url, &substituted);
    proxy_resolved(&resolved, kind, ctx)
}

/// Proxy an already-resolved absolute URI.
fn proxy_resolved(resolved: &str, kind: EndpointKind, ctx: &RewriteContext) -> String {
    // Already points at this proxy. Never double-proxy.
    if resolved.starts_with(&format!("{}/proxy/", ctx.proxy_base)) {
        return resolved.to_string();
    }
    // Upstream serves segments with usable CORS headers; skip the hop.
    if ctx.allow_cors && kind == EndpointKind::Segment {
        return resolved.to_string();
    }

    let mut url = format!(
        "{}/proxy/{}?url={}",
        ctx.proxy_base,
        kind.path(),
        urlencoding::encode(resolved)
    );
    if let Some(key) = &ctx.source_key {
        url.push_str("&moontv-source=");
        url.push_str(&urlencoding::encode(key));
    }
    if ctx.allow_cors && kind == EndpointKind::M3u8 {
        url.push_str("&allowCORS=true");
    }
    url
}

/// Replace the named URI attribute in `line` with its proxied form.
/// `None` when the attribute is absent or empty; caller emits the original.
fn rewrite_uri_attr(
    line: &str,
    attr: &str,
    kind: EndpointKind,
    ctx: &RewriteContext,
    vars: &VariableTable,
) -> Option<String> {
    let (_, value_range, _) = attr_span(line, attr)?;
    let raw = line[value_range.clone()].trim();
    if raw.is_empty() {
        return None;
    }
    let target = rewrite_target(raw, kind, ctx, vars);
    let mut out = String::with_capacity(line.len() + target.len());
    out.push_str(&line[..value_range.start]);
    out.push_str(&target);
    out.push_str(&line[value_range.end..]);
    Some(out)
}

/// `EXT-X-MEDIA` degrades to "no alternate rendition" rather than emitting a
/// broken reference: a missing, `"nan"`, or unresolvable URI strips the
/// attribute entirely.
fn rewrite_media(line: &str, ctx: &RewriteContext, vars: &VariableTable) -> String {
    let Some((_, value_range, _)) = attr_span(line, "URI") else {
        return line.to_string();
    };
    let raw = line[value_range.clone()].trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return strip_attr(line, "URI");
    }

    // Resolve once; the same result is both validated and emitted.
    let resolved = resolve_url(&ctx.base_url, &vars.substitute(raw));
    if !resolved.starts_with("http://") && !resolved.starts_with("https://") {
        return strip_attr(line, "URI");
    }

    let target = proxy_resolved(&resolved, EndpointKind::M3u8, ctx);
    let mut out = String::with_capacity(line.len() + target.len());
    out.push_str(&line[..value_range.start]);
    out.push_str(&target);
    out.push_str(&line[value_range.end..]);
    out
}

/// `EXT-X-DATERANGE` has no fixed URI attribute; scan every quoted value and
/// proxy the ones that look like URLs or absolute paths.
fn rewrite_daterange(line: &str, ctx: &RewriteContext, vars: &VariableTable) -> String {
    let Some((head, attrs)) = line.split_once(':') else {
        return line.to_string();
    };

    let rebuilt: Vec<String> = split_attrs(attrs)
        .into_iter()
        .map(|piece| {
            let Some((name, value)) = piece.split_once('=') else {
                return piece;
            };
            let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
            if !quoted {
                return piece;
            }
            let inner = &value[1..value.len() - 1];
            if looks_like_uri(inner) {
                let target = rewrite_target(inner, EndpointKind::Segment, ctx, vars);
                format!("{name}=\"{target}\"")
            } else {
                piece
            }
        })
        .collect();

    format!("{head}:{}", rebuilt.join(","))
}

fn looks_like_uri(value: &str) -> bool {
    value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("//")
        || value.starts_with('/')
}

/// Split an attribute list on commas, respecting double quotes.
fn split_attrs(attrs: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in attrs.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                pieces.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Everything after the tag's first colon.
fn tag_attrs(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, attrs)| attrs)
}

/// Locate `NAME=value` within an attribute list.
///
/// Returns the byte offset of the attribute name, the range of the value
/// (excluding quotes), and whether the value was quoted. Matches only at
/// attribute boundaries (`,` or `:`; HLS attribute lists carry no whitespace
/// between attributes), so `URI` never matches inside `SERVER-URI`, and the
/// scan is quote-aware so a `URI=` token inside another attribute's quoted
/// value never matches either. An unterminated quote yields `None` and the
/// caller emits the line unchanged.
fn attr_span(s: &str, name: &str) -> Option<(usize, Range<usize>, bool)> {
    let bytes = s.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'"' {
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        let boundary = i == 0 || matches!(bytes[i - 1], b',' | b':');
        if !in_quotes
            && boundary
            && s[i..].starts_with(name)
            && bytes.get(i + name.len()) == Some(&b'=')
        {
            let value_start = i + name.len() + 1;
            return if bytes.get(value_start) == Some(&b'"') {
                let inner_start = value_start + 1;
                s[inner_start..]
                    .find('"')
                    .map(|end| (i, inner_start..inner_start + end, true))
            } else {
                let end = s[value_start..]
                    .find(',')
                    .map(|j| value_start + j)
                    .unwrap_or(s.len());
                Some((i, value_start..end, false))
            };
        }
        i += 1;
    }
    None
}

/// Extract an attribute's value (unquoted).
pub(crate) fn attr_value(s: &str, name: &str) -> Option<String> {
    attr_span(s, name).map(|(_, range, _)| s[range].to_string())
}

/// Remove `NAME=value` (and one adjoining comma) from an attribute line.
fn strip_attr(line: &str, name: &str) -> String {
    let Some((name_start, value_range, quoted)) = attr_span(line, name) else {
        return line.to_string();
    };
    let bytes = line.as_bytes();
    let mut start = name_start;
    let mut end = value_range.end + usize::from(quoted && bytes.get(value_range.end) == Some(&b'"'));

    if start > 0 && bytes[start - 1] == b',' {
        start -= 1;
    } else if bytes.get(end) == Some(&b',') {
        end += 1;
    }

    format!("{}{}", &line[..start], &line[end..])
}
