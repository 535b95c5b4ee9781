//! `EXT-X-DEFINE` variable substitution.
//!
//! Definitions appear before use in document order, so the table is built
//! incrementally during one rewrite pass and dropped with it. References to
//! names that were never defined stay as the literal `{$name}` token, an
//! undefined variable must never fail the rewrite.

use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: HashMap<String, String>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every `{$name}` occurrence with its defined value.
    pub fn substitute(&self, input: &str) -> String {
        if self.entries.is_empty() || !input.contains("{$") {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("{$") {
            out.push_str(&rest[..start]);
            let after = &rest[start..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[2..end];
                    match self.entries.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            debug!("undefined HLS variable reference: {{${name}}}");
                            out.push_str(&after[..=end]);
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    // Unterminated reference, emit as-is.
                    out.push_str(after);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

/// Parse `NAME` and `VALUE` out of an `#EXT-X-DEFINE:` line.
pub fn parse_define(attrs: &str) -> Option<(String, String)> {
    let name = super::attr_value(attrs, "NAME")?;
    let value = super::attr_value(attrs, "VALUE")?;
    Some((name, value))
}
