//! SQL Macro Engine
//!
//! Rewrites `$__name(args...)` placeholders in templated SQL using the time
//! range and interval of the query being executed.
//!
//! ## Example
//!
//! ```text
//! select * from cpu where $__timeRange(time)
//!     ↓
//! select * from cpu where time >= '2023-01-01T00:00:00Z' AND time <= '2023-01-01T00:10:00Z'
//! ```
//!
//! The vocabulary is a fixed, immutable [`MacroRegistry`] handed to
//! [`interpolate`] on every call. Expansion is a single left-to-right pass and
//! replacement text is never re-scanned, so identical input always produces
//! byte-identical output.

mod builtin;

use crate::query::TimeRange;
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder prefix
pub const MACRO_PREFIX: &str = "$__";

/// Errors raised while expanding macros
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacroError {
    #[error("unknown macro: $__{0}")]
    UnknownMacro(String),

    #[error("unterminated argument list for macro $__{0}")]
    UnterminatedArguments(String),

    #[error("unexpected number of arguments: expected {expected} argument(s), received {received}")]
    BadArgumentCount { expected: usize, received: usize },

    #[error("invalid macro argument: {0}")]
    InvalidArgument(String),
}

/// Query context available to every macro
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroContext {
    pub time_range: TimeRange,
    pub interval: Duration,
}

impl MacroContext {
    pub fn new(time_range: TimeRange, interval: Duration) -> Self {
        Self {
            time_range,
            interval,
        }
    }
}

/// A macro: positional string arguments in, replacement SQL out
pub type MacroFn = fn(&MacroContext, &[String]) -> Result<String, MacroError>;

/// Immutable name → macro table
#[derive(Clone)]
pub struct MacroRegistry {
    macros: BTreeMap<&'static str, MacroFn>,
}

impl MacroRegistry {
    /// An empty registry; every placeholder is then an unknown macro
    pub fn empty() -> Self {
        Self {
            macros: BTreeMap::new(),
        }
    }

    /// The builtin vocabulary
    pub fn builtin() -> Self {
        Self {
            macros: builtin::MACROS.iter().copied().collect(),
        }
    }

    /// Return a copy of this registry with one more macro
    pub fn with(mut self, name: &'static str, func: MacroFn) -> Self {
        self.macros.insert(name, func);
        self
    }

    pub fn get(&self, name: &str) -> Option<MacroFn> {
        self.macros.get(name).copied()
    }

    /// Macro names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.macros.keys().map(|k| (*k).to_string()).collect()
    }
}

impl Default for MacroRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroRegistry")
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Expand every macro in `sql`.
///
/// Unknown macro names, unterminated argument lists, and macro failures abort
/// the whole expansion.
pub fn interpolate(
    sql: &str,
    ctx: &MacroContext,
    registry: &MacroRegistry,
) -> Result<String, MacroError> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;

    while let Some(pos) = rest.find(MACRO_PREFIX) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + MACRO_PREFIX.len()..];

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if name_len == 0 {
            // A bare "$__" is not a placeholder
            out.push_str(MACRO_PREFIX);
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        let mut tail = &after[name_len..];
        let args = if let Some(inner) = tail.strip_prefix('(') {
            let (args, consumed) = split_args(inner)
                .ok_or_else(|| MacroError::UnterminatedArguments(name.to_string()))?;
            tail = &inner[consumed..];
            args
        } else {
            Vec::new()
        };

        let func = registry
            .get(name)
            .ok_or_else(|| MacroError::UnknownMacro(name.to_string()))?;
        out.push_str(&func(ctx, &args)?);
        rest = tail;
    }

    out.push_str(rest);
    Ok(out)
}

/// Split a parenthesised argument list.
///
/// `input` starts right after the opening parenthesis. Returns the trimmed
/// arguments and the number of bytes consumed including the closing
/// parenthesis, or `None` if the list is never closed.
fn split_args(input: &str) -> Option<(Vec<String>, usize)> {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut args = Vec::new();
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                if depth == 0 {
                    let last = input[start..i].trim();
                    if !(args.is_empty() && last.is_empty()) {
                        args.push(last.to_string());
                    }
                    return Some((args, i + 1));
                }
                depth -= 1;
            }
            ',' if !in_quote && depth == 0 => {
                args.push(input[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    None
}
