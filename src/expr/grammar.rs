//! Shared recursive-descent scanner for the compact field-group DSL:
//!
//! ```text
//! group  := field (',' field)*
//! field  := name [':' size] ['(' group ')']
//! ```
//!
//! The scanner only builds raw nodes; flavour-specific rules (size suffixes,
//! merging, path shorthand) are switched by [`Flavor`].

use super::types::ExpressionError;

/// Longest accepted expression, in bytes.
pub(crate) const MAX_EXPRESSION_LEN: usize = 16 * 1024;
/// Deepest accepted nesting.
pub(crate) const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Flavor {
    /// Split a trailing `:N` off a name as a bucket size.
    pub sizes: bool,
    /// Whitespace between names separates fields like ','.
    pub whitespace_separates: bool,
    /// `a/b` is shorthand for `a(b)`.
    pub slash_nesting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawField {
    pub name: String,
    pub size: Option<u32>,
    pub children: Vec<RawField>,
}

struct Scope {
    fields: Vec<RawField>,
    /// Opened by '/' shorthand, closed by the next separator.
    implicit: bool,
}

pub(crate) fn scan(text: &str, flavor: Flavor) -> Result<Vec<RawField>, ExpressionError> {
    if text.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::new("expression too long", MAX_EXPRESSION_LEN));
    }
    let mut scanner = Scanner { flavor, stack: vec![Scope { fields: Vec::new(), implicit: false }], name: String::new() };
    for (pos, ch) in text.char_indices() {
        match ch {
            ',' => {
                scanner.finish_name();
                scanner.close_implicit();
            }
            '(' => {
                scanner.finish_name();
                scanner.open(false, pos)?;
            }
            ')' => {
                scanner.finish_name();
                scanner.close_implicit();
                scanner.close_explicit(pos)?;
            }
            '/' if flavor.slash_nesting => {
                scanner.finish_name();
                scanner.open(true, pos)?;
            }
            c if c.is_whitespace() && flavor.whitespace_separates => {
                scanner.finish_name();
            }
            c => scanner.name.push(c),
        }
    }
    scanner.finish_name();
    scanner.close_implicit();
    if scanner.stack.len() > 1 {
        return Err(ExpressionError::new("missing ')'", text.len()));
    }
    Ok(scanner.stack.pop().map(|s| s.fields).unwrap_or_default())
}

struct Scanner {
    flavor: Flavor,
    stack: Vec<Scope>,
    name: String,
}

impl Scanner {
    fn current(&mut self) -> &mut Scope {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn finish_name(&mut self) {
        let raw = std::mem::take(&mut self.name);
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let (name, size) = if self.flavor.sizes { split_size(raw) } else { (raw, None) };
        if name.is_empty() {
            return;
        }
        self.current().fields.push(RawField { name: name.to_string(), size, children: Vec::new() });
    }

    fn open(&mut self, implicit: bool, pos: usize) -> Result<(), ExpressionError> {
        if self.current().fields.is_empty() {
            let c = if implicit { '/' } else { '(' };
            return Err(ExpressionError::new(format!("unexpected '{c}'"), pos));
        }
        if self.stack.len() > MAX_DEPTH {
            return Err(ExpressionError::new("expression nested too deeply", pos));
        }
        self.stack.push(Scope { fields: Vec::new(), implicit });
        Ok(())
    }

    /// Pops one scope and attaches its fields to the most recent field below it.
    fn pop_into_parent(&mut self) {
        if let Some(scope) = self.stack.pop()
            && let Some(owner) = self.current().fields.last_mut()
        {
            owner.children.extend(scope.fields);
        }
    }

    fn close_implicit(&mut self) {
        while self.stack.len() > 1 && self.stack[self.stack.len() - 1].implicit {
            self.pop_into_parent();
        }
    }

    fn close_explicit(&mut self, pos: usize) -> Result<(), ExpressionError> {
        if self.stack.len() <= 1 {
            return Err(ExpressionError::new("unexpected ')'", pos));
        }
        self.pop_into_parent();
        Ok(())
    }
}

/// `terms:category:10` -> (`terms:category`, Some(10)); a non-numeric tail stays in the name.
fn split_size(raw: &str) -> (&str, Option<u32>) {
    match raw.rsplit_once(':') {
        Some((name, tail)) => match tail.trim().parse::<u32>() {
            Ok(size) => (name.trim(), Some(size)),
            Err(_) => (raw, None),
        },
        None => (raw, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: Flavor = Flavor { sizes: false, whitespace_separates: false, slash_nesting: false };

    fn names(fields: &[RawField]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn nested_groups_attach_to_previous_field() {
        let out = scan("a, b(c, d(e)), f", PLAIN).unwrap();
        assert_eq!(names(&out), vec!["a", "b", "f"]);
        assert_eq!(names(&out[1].children), vec!["c", "d"]);
        assert_eq!(names(&out[1].children[1].children), vec!["e"]);
    }

    #[test]
    fn open_paren_without_field_is_rejected() {
        let err = scan("(a)", PLAIN).unwrap_err();
        assert!(err.message.contains("unexpected '('"));
    }

    #[test]
    fn split_size_keeps_non_numeric_tail() {
        assert_eq!(split_size("terms:category"), ("terms:category", None));
        assert_eq!(split_size("terms:category:10"), ("terms:category", Some(10)));
        assert_eq!(split_size("a:3"), ("a", Some(3)));
    }

    #[test]
    fn depth_limit() {
        let mut s = String::new();
        for i in 0..(MAX_DEPTH + 2) {
            s.push_str(&format!("f{i}("));
        }
        let err = scan(&s, PLAIN).unwrap_err();
        assert!(err.message.contains("too deeply"));
    }
}
