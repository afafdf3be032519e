//! Entry selection.
//!
//! Decides per entry whether the driver acts on it or skips its data.
//! Patterns are case-sensitive globs; matching always runs on the
//! sanitized name, so `../etc/passwd` in a hostile archive is judged
//! as `etc/passwd`.

use glob::Pattern;
use shuck_core::error::{Result, ShuckError};

/// Verdict for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the entry to the action.
    Keep,
    /// Skip the entry's data without acting.
    Drop,
}

#[derive(Debug)]
struct Tracked {
    pattern: Pattern,
    hit: bool,
}

#[derive(Debug)]
enum Mode {
    All,
    List(Vec<Tracked>),
    AcceptReject {
        accept: Vec<Tracked>,
        reject: Vec<Pattern>,
    },
    Consume(Vec<Pattern>),
}

/// Entry selector. Stateful: accept patterns remember whether they
/// ever matched, and the consuming selector shrinks as names are
/// found.
#[derive(Debug)]
pub struct Selector {
    mode: Mode,
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(|e| ShuckError::invalid_pattern(p, e.to_string())))
        .collect()
}

fn track(patterns: Vec<Pattern>) -> Vec<Tracked> {
    patterns
        .into_iter()
        .map(|pattern| Tracked {
            pattern,
            hit: false,
        })
        .collect()
}

/// True when `pattern` matches `path` or one of its ancestor
/// directories, so selecting `dir` takes everything under it.
fn matches_with_ancestors(pattern: &Pattern, path: &str) -> bool {
    if pattern.matches(path) {
        return true;
    }
    let mut end = path.len();
    while let Some(slash) = path[..end].rfind('/') {
        if pattern.matches(&path[..slash]) {
            return true;
        }
        end = slash;
    }
    false
}

impl Selector {
    /// Keep everything.
    pub fn accept_all() -> Self {
        Self { mode: Mode::All }
    }

    /// Keep entries matching any pattern. A pattern also claims
    /// everything below a directory it names.
    pub fn accept_list(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            mode: Mode::List(track(compile(patterns)?)),
        })
    }

    /// Rejects trump accepts; an empty accept list means
    /// accept-everything-not-rejected.
    pub fn accept_reject(accept: &[String], reject: &[String]) -> Result<Self> {
        Ok(Self {
            mode: Mode::AcceptReject {
                accept: track(compile(accept)?),
                reject: compile(reject)?,
            },
        })
    }

    /// Keep entries matching a pattern, consuming it on match. Once
    /// all patterns are consumed the scan can stop early.
    pub fn consume(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            mode: Mode::Consume(compile(patterns)?),
        })
    }

    /// Judge one sanitized entry name.
    pub fn decide(&mut self, path: &str) -> Decision {
        match &mut self.mode {
            Mode::All => Decision::Keep,
            Mode::List(accept) => {
                let mut keep = false;
                for t in accept.iter_mut() {
                    if matches_with_ancestors(&t.pattern, path) {
                        t.hit = true;
                        keep = true;
                    }
                }
                if keep { Decision::Keep } else { Decision::Drop }
            }
            Mode::AcceptReject { accept, reject } => {
                if reject.iter().any(|p| matches_with_ancestors(p, path)) {
                    return Decision::Drop;
                }
                if accept.is_empty() {
                    return Decision::Keep;
                }
                let mut keep = false;
                for t in accept.iter_mut() {
                    if matches_with_ancestors(&t.pattern, path) {
                        t.hit = true;
                        keep = true;
                    }
                }
                if keep { Decision::Keep } else { Decision::Drop }
            }
            Mode::Consume(remaining) => {
                if let Some(pos) = remaining.iter().position(|p| p.matches(path)) {
                    remaining.remove(pos);
                    Decision::Keep
                } else {
                    Decision::Drop
                }
            }
        }
    }

    /// True when a consuming selector has found all its names; later
    /// entries cannot match anything.
    pub fn is_exhausted(&self) -> bool {
        matches!(&self.mode, Mode::Consume(remaining) if remaining.is_empty())
    }

    /// Accept patterns that never matched an entry, for reporting.
    pub fn unmatched(&self) -> Vec<String> {
        match &self.mode {
            Mode::All => Vec::new(),
            Mode::List(accept) | Mode::AcceptReject { accept, .. } => accept
                .iter()
                .filter(|t| !t.hit)
                .map(|t| t.pattern.as_str().to_string())
                .collect(),
            Mode::Consume(remaining) => {
                remaining.iter().map(|p| p.as_str().to_string()).collect()
            }
        }
    }
}
