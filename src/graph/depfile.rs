//! Parser for Make-style compiler dependency files.
//!
//! A depfile is a single Make rule: everything up to and including the first
//! unescaped `:` names the target and is discarded; the remainder is a
//! whitespace-separated list of dependency paths, possibly spread over
//! several backslash-continued lines. A backslash before any character other
//! than a newline quotes it literally, which is how compilers escape spaces
//! in paths.

use crate::mmap::MappedFile;
use camino::{Utf8Path, Utf8PathBuf};

/// Read `path` if it exists and return its dependency list.
///
/// Absence is not an error: compiler depfiles only appear after the first
/// successful compile. A depfile that is not valid UTF-8 is treated as
/// absent.
pub(crate) fn harvest(path: &Utf8Path) -> Option<Vec<Utf8PathBuf>> {
    let file = MappedFile::open(path).ok()?;
    let content = std::str::from_utf8(file.bytes()).ok()?;
    Some(parse_deps(content).into_iter().map(Utf8PathBuf::from).collect())
}

/// Extract the dependency tokens from depfile text, unescaping as we go.
fn parse_deps(content: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut token = String::new();
    let mut in_target = true;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                // Line continuation: the newline (with optional CR) is erased.
                Some('\n') => {
                    chars.next();
                }
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                // Escaped character, kept literally as part of the token.
                Some(&escaped) => {
                    token.push(escaped);
                    chars.next();
                }
                // Dangling backslash at EOF.
                None => {}
            }
        } else if in_target && c == ':' {
            token.clear();
            in_target = false;
        } else if c.is_ascii_whitespace() {
            if !token.is_empty() && !in_target {
                deps.push(std::mem::take(&mut token));
            }
            token.clear();
        } else {
            token.push(c);
        }
    }

    if !token.is_empty() && !in_target {
        deps.push(token);
    }
    deps
}
