//! Placeholder parsing and substitution for package locations.
//!
//! Commands and environment declarations can refer to paths that only exist
//! once fingerprints are known (install prefixes live at
//! `<store>/i/<fingerprint>`). They do so with placeholders:
//!
//! - `$${self:<field>}` - a location of the package declaring the string
//! - `$${<package>:<field>}` - a location of a (transitive) dependency
//!
//! Fields: `name`, `version`, `root`, `install`, `bin`, `lib`, `share`,
//! `etc`, `man`, `doc`, `target_dir`.
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$cur__install` and `$PATH` work without escaping. `$$${` produces a
//! literal `$${`.
//!
//! ```
//! use lodge_lib::placeholder::{parse, Field, Placeholder, Scope, Segment};
//!
//! let segments = parse("$${self:bin}:$PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder(Placeholder { scope: Scope::Current, field: Field::Bin }),
//!     Segment::Literal(":$PATH".to_string()),
//! ]);
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Which package a placeholder refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
  /// `self`
  Current,
  /// A package by name.
  Package(String),
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scope::Current => write!(f, "self"),
      Scope::Package(name) => write!(f, "{name}"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
  Name,
  Version,
  Root,
  Install,
  Bin,
  Lib,
  Share,
  Etc,
  Man,
  Doc,
  TargetDir,
}

impl Field {
  pub fn as_str(self) -> &'static str {
    match self {
      Field::Name => "name",
      Field::Version => "version",
      Field::Root => "root",
      Field::Install => "install",
      Field::Bin => "bin",
      Field::Lib => "lib",
      Field::Share => "share",
      Field::Etc => "etc",
      Field::Man => "man",
      Field::Doc => "doc",
      Field::TargetDir => "target_dir",
    }
  }
}

impl FromStr for Field {
  type Err = PlaceholderError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "name" => Field::Name,
      "version" => Field::Version,
      "root" => Field::Root,
      "install" => Field::Install,
      "bin" => Field::Bin,
      "lib" => Field::Lib,
      "share" => Field::Share,
      "etc" => Field::Etc,
      "man" => Field::Man,
      "doc" => Field::Doc,
      "target_dir" => Field::TargetDir,
      other => return Err(PlaceholderError::UnknownField(other.to_string())),
    })
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
  pub scope: Scope,
  pub field: Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unknown placeholder field: {0}")]
  UnknownField(String),

  #[error("'{scope}' is not a dependency of '{package}'")]
  UnknownScope { package: String, scope: String },

  #[error("'{field}' is not available for '{scope}' here")]
  Unavailable { scope: String, field: Field },
}

/// Supplies values for placeholders.
pub trait Resolver {
  fn resolve(&self, scope: &Scope, field: Field) -> Result<String, PlaceholderError>;
}

/// Split `input` into literal text and placeholders.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    if chars.peek().map(|(_, c)| *c) != Some('$') {
      // lone $: shell variable
      literal.push('$');
      continue;
    }
    chars.next();

    match chars.peek().map(|(_, c)| *c) {
      Some('$') => {
        chars.next();
        if chars.peek().map(|(_, c)| *c) == Some('{') {
          chars.next();
          literal.push_str("$${");
        } else {
          literal.push_str("$$$");
        }
      }
      Some('{') => {
        chars.next();

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut content = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          content.push(c);
        }

        if !closed {
          return Err(PlaceholderError::Unclosed(pos));
        }

        segments.push(Segment::Placeholder(parse_content(&content)?));
      }
      _ => literal.push_str("$$"),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  let (scope, field) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing ':' in '{content}'")))?;

  let scope = scope.trim();
  if scope.is_empty() {
    return Err(PlaceholderError::Malformed(format!("missing package in '{content}'")));
  }

  let scope = match scope {
    "self" => Scope::Current,
    name => Scope::Package(name.to_string()),
  };

  Ok(Placeholder {
    scope,
    field: field.trim().parse()?,
  })
}

/// Parse `input` and substitute every placeholder using `resolver`.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  let mut result = String::with_capacity(input.len());

  for segment in &segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => result.push_str(&resolver.resolve(&p.scope, p.field)?),
    }
  }

  Ok(result)
}
