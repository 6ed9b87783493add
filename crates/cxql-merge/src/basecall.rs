//! Textual detection of `base.<Name>()` calls in CxQL source.
//!
//! This is a pattern matcher, not a CxQL parser. After comments are removed:
//!
//! - a source *calls base* when the literal text `base.<Name>()` occurs
//! - the call is *safe* when every occurrence is a statement of its own,
//!   `result = base.<Name>();`, with any whitespace (line breaks included)
//!   around `=` and nothing else on the lines it spans
//!
//! Anything else (`x = base.Q();`, `result = base.Q().FindByName(..)`, two
//! statements on one line) is unsafe and gets rewritten by the merger.

use regex::Regex;
use std::sync::OnceLock;

const BLOCK_COMMENT: &str = r"/\*([^*]|[\r\n]|(\*+([^*/]|[\r\n])))*\*+/";
const LINE_COMMENT: &str = r"//.*";
const SAFE_STATEMENT: &str =
    r"(?m)^[ \t]*result\s*=\s*base\.([A-Za-z_][A-Za-z0-9_]*)\(\)[ \t]*;?[ \t]*\r?$";

struct Patterns {
    block_comment: Regex,
    line_comment: Regex,
    safe_statement: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            block_comment: Regex::new(BLOCK_COMMENT)?,
            line_comment: Regex::new(LINE_COMMENT)?,
            safe_statement: Regex::new(SAFE_STATEMENT)?,
        })
    }
}

fn patterns() -> Result<&'static Patterns, regex::Error> {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    if let Some(patterns) = PATTERNS.get() {
        return Ok(patterns);
    }
    let compiled = Patterns::compile()?;
    Ok(PATTERNS.get_or_init(|| compiled))
}

/// Removes `/* */` and `//` comments.
pub fn strip_comments(source: &str) -> Result<String, regex::Error> {
    let patterns = patterns()?;
    let without_blocks = patterns.block_comment.replace_all(source, "");
    Ok(patterns
        .line_comment
        .replace_all(&without_blocks, "")
        .into_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseCall {
    pub calls_base: bool,
    /// True when there is no call at all.
    pub is_safe: bool,
}

impl BaseCall {
    /// Classifies how `source` calls the base of query `name`.
    pub fn detect(source: &str, name: &str) -> Result<Self, regex::Error> {
        let code = strip_comments(source)?;
        let call = format!("base.{name}()");
        let calls = code.matches(call.as_str()).count();
        if calls == 0 {
            return Ok(Self {
                calls_base: false,
                is_safe: true,
            });
        }

        let safe = patterns()?
            .safe_statement
            .captures_iter(&code)
            .filter(|c| c.get(1).is_some_and(|m| m.as_str() == name))
            .count();

        Ok(Self {
            calls_base: true,
            is_safe: safe == calls,
        })
    }
}
