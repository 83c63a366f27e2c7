use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::errors::DprError;
use crate::model::VariableMap;

pub const DEFAULT_PREFIX: &str = "VAR";

/// Substitution can join a value to neighbouring literal text and form a new
/// token, so rendering repeats until the output stops changing.
const MAX_PASSES: usize = 16;

/// A piece of section text: either literal text or a placeholder key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Placeholder { key: &'a str, token: &'a str },
}

/// Placeholder syntax `<PREFIX>{key}`.
#[derive(Debug, Clone)]
pub struct Placeholders {
    prefix: String,
    re: Regex,
}

impl Placeholders {
    pub fn new(prefix: &str) -> Result<Self, DprError> {
        if prefix.is_empty() || prefix.contains(['{', '}']) {
            return Err(DprError::Config(format!("invalid placeholder prefix: {prefix:?}")));
        }
        let re = Regex::new(&format!(r"{}\{{([^}}]*)\}}", regex::escape(prefix)))
            .map_err(|e| DprError::Config(e.to_string()))?;
        Ok(Self { prefix: prefix.to_string(), re })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn token(&self, key: &str) -> String {
        format!("{}{{{}}}", self.prefix, key)
    }

    /// Keys in order of first appearance, without duplicates.
    pub fn find(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.re
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    /// Keys in `text` that `render` would leave as tokens.
    pub fn unresolved(&self, text: &str, vars: &VariableMap) -> Vec<String> {
        self.find(&self.render(text, vars))
    }

    pub fn segments<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut out = Vec::new();
        let mut last = 0;
        for caps in self.re.captures_iter(text) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                out.push(Segment::Text(&text[last..whole.start()]));
            }
            out.push(Segment::Placeholder { key: key.as_str(), token: whole.as_str() });
            last = whole.end();
        }
        if last < text.len() {
            out.push(Segment::Text(&text[last..]));
        }
        out
    }

    /// Substitute resolved keys; unresolved ones (missing, empty, or part of a
    /// reference cycle) stay as their literal token.
    ///
    /// The result is always a fixpoint. Text that has not settled after
    /// `MAX_PASSES` is returned unchanged, which is a fixpoint of its own.
    pub fn render(&self, text: &str, vars: &VariableMap) -> String {
        let cyclic = self.cyclic_keys(vars);
        let mut memo = HashMap::new();
        let mut out = self.expand(text, vars, &cyclic, &mut memo);
        for _ in 0..MAX_PASSES {
            let next = self.expand(&out, vars, &cyclic, &mut memo);
            if next == out {
                return out;
            }
            out = next;
        }
        tracing::warn!(
            passes = MAX_PASSES,
            "placeholder substitution did not settle; leaving text unrendered"
        );
        text.to_string()
    }

    fn expand(
        &self,
        text: &str,
        vars: &VariableMap,
        cyclic: &HashSet<String>,
        memo: &mut HashMap<String, String>,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        for seg in self.segments(text) {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Placeholder { key, token } => {
                    match self.resolve(key, vars, cyclic, memo) {
                        Some(v) => out.push_str(&v),
                        None => out.push_str(token),
                    }
                }
            }
        }
        out
    }

    fn resolve(
        &self,
        key: &str,
        vars: &VariableMap,
        cyclic: &HashSet<String>,
        memo: &mut HashMap<String, String>,
    ) -> Option<String> {
        if cyclic.contains(key) {
            return None;
        }
        let value = vars.get(key).filter(|v| !v.is_empty())?;
        if let Some(done) = memo.get(key) {
            return Some(done.clone());
        }
        let expanded = self.expand(value, vars, cyclic, memo);
        memo.insert(key.to_string(), expanded.clone());
        Some(expanded)
    }

    /// Keys that can reach themselves through the tokens in their values.
    fn cyclic_keys(&self, vars: &VariableMap) -> HashSet<String> {
        let edges: HashMap<&str, Vec<String>> = vars
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), self.find(v)))
            .collect();

        let mut cyclic = HashSet::new();
        for &start in edges.keys() {
            let mut stack: Vec<&str> = edges[start].iter().map(String::as_str).collect();
            let mut visited = HashSet::new();
            while let Some(k) = stack.pop() {
                if k == start {
                    cyclic.insert(start.to_string());
                    break;
                }
                if !visited.insert(k) {
                    continue;
                }
                if let Some(next) = edges.get(k) {
                    stack.extend(next.iter().map(String::as_str));
                }
            }
        }
        cyclic
    }
}

impl Default for Placeholders {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX).expect("default placeholder prefix is valid")
    }
}
