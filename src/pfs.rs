//! Reader and writer for the engine's PFS parameter files.
//!
//! A PFS file is a tree of `[NAME] ... EndSect` sections holding `key = value` keywords. Values
//! are kept as the raw text found in the file so that anything not edited is written back as it
//! was read. Comment and blank lines are preserved in place.
use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::path::{Path, PathBuf};

/// Number of spaces per nesting level when writing
const INDENT: usize = 3;

/// Shorthand accepted at the start of a section path
const PATH_ALIASES: [(&str, &str); 1] = [("HD", "FemEngineHD/HYDRODYNAMIC_MODULE")];

#[derive(Debug, Clone, PartialEq)]
pub enum PfsError {
    /// A line could not be understood
    Syntax { line: usize, message: String },
    /// No section at this path
    MissingSection(String),
    /// Section exists but has no such keyword
    MissingKeyword { section: String, key: String },
    /// Keyword exists but its value has the wrong form
    InvalidValue { key: String, value: String },
}

impl fmt::Display for PfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PfsError::Syntax { line, message } => write!(f, "line {}: {}", line, message),
            PfsError::MissingSection(path) => write!(f, "section '{}' not found", path),
            PfsError::MissingKeyword { section, key } => {
                write!(f, "keyword '{}' not found in section '{}'", key, section)
            }
            PfsError::InvalidValue { key, value } => {
                write!(f, "keyword '{}' has invalid value '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for PfsError {}

/// A value to store under a keyword
#[derive(Debug, Clone, PartialEq)]
pub enum PfsValue {
    Int(i64),
    Float(f64),
    /// Quoted string, written as `'text'`
    Str(String),
    /// File reference, written as `|path|`
    File(PathBuf),
}

impl fmt::Display for PfsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PfsValue::Int(v) => write!(f, "{}", v),
            PfsValue::Float(v) => write!(f, "{}", v),
            PfsValue::Str(s) => write!(f, "'{}'", s),
            PfsValue::File(p) => write!(f, "|{}|", p.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PfsItem {
    Keyword { key: String, value: String },
    Section(PfsSection),
    /// Comment or blank line
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PfsSection {
    pub name: String,
    pub items: Vec<PfsItem>,
}

impl PfsSection {
    pub fn new(name: &str) -> Self {
        PfsSection {
            name: name.to_string(),
            items: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&PfsSection> {
        self.items.iter().find_map(|item| match item {
            PfsItem::Section(s) if s.name == name => Some(s),
            _ => None,
        })
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut PfsSection> {
        self.items.iter_mut().find_map(|item| match item {
            PfsItem::Section(s) if s.name == name => Some(s),
            _ => None,
        })
    }

    /// Raw text of the first keyword named `key`
    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.items.iter().find_map(|item| match item {
            PfsItem::Keyword { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn get_int(&self, key: &str) -> Result<i64, PfsError> {
        let value = self
            .keyword(key)
            .ok_or_else(|| PfsError::MissingKeyword {
                section: self.name.clone(),
                key: key.to_string(),
            })?;
        value.trim().parse().map_err(|_| PfsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Replace the first keyword named `key`, or append it if absent
    pub fn set_keyword(&mut self, key: &str, value: PfsValue) {
        let formatted = value.to_string();
        for item in &mut self.items {
            if let PfsItem::Keyword { key: k, value } = item {
                if k == key {
                    *value = formatted;
                    return;
                }
            }
        }

        // Keep new keywords ahead of any nested sections
        let pos = self
            .items
            .iter()
            .position(|item| matches!(item, PfsItem::Section(_)))
            .unwrap_or(self.items.len());
        self.items.insert(
            pos,
            PfsItem::Keyword {
                key: key.to_string(),
                value: formatted,
            },
        );
    }

    fn write_to(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = " ".repeat(depth * INDENT);
        writeln!(f, "{}[{}]", pad, self.name)?;
        let inner = " ".repeat((depth + 1) * INDENT);
        for item in &self.items {
            match item {
                PfsItem::Keyword { key, value } => writeln!(f, "{}{} = {}", inner, key, value)?,
                PfsItem::Section(section) => section.write_to(f, depth + 1)?,
                PfsItem::Other(text) if text.is_empty() => writeln!(f)?,
                PfsItem::Other(text) => writeln!(f, "{}{}", inner, text)?,
            }
        }
        writeln!(f, "{}EndSect  // {}", pad, self.name)
    }
}

/// A whole PFS file.
///
/// Top level items are the sections plus any header, comment or blank lines around them, in file
/// order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PfsDocument {
    pub items: Vec<PfsItem>,
}

fn expand_alias(path: &str) -> String {
    for (alias, full) in PATH_ALIASES {
        if path == alias {
            return full.to_string();
        }
        if let Some(rest) = path.strip_prefix(alias).and_then(|r| r.strip_prefix('/')) {
            return format!("{}/{}", full, rest);
        }
    }
    path.to_string()
}

/// PFS files are written in a single byte Windows code page. Each byte maps to the code point of
/// the same number so unedited text is written back byte for byte.
fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn encode(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            u8::try_from(c)
                .map_err(|_| anyhow!("Character '{}' can't be stored in a PFS file", c))
        })
        .collect()
}

impl PfsDocument {
    pub fn parse(text: &str) -> Result<Self, PfsError> {
        let mut doc = PfsDocument::default();
        let mut stack: Vec<PfsSection> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.starts_with('[') {
                let name = line[1..]
                    .split(']')
                    .next()
                    .filter(|_| line.contains(']'))
                    .ok_or_else(|| PfsError::Syntax {
                        line: line_no,
                        message: format!("unterminated section header '{}'", line),
                    })?;
                stack.push(PfsSection::new(name.trim()));
            } else if line.starts_with("EndSect") {
                let section = stack.pop().ok_or_else(|| PfsError::Syntax {
                    line: line_no,
                    message: "EndSect without open section".to_string(),
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.items.push(PfsItem::Section(section)),
                    None => doc.items.push(PfsItem::Section(section)),
                }
            } else if let Some(section) = stack.last_mut() {
                let item = match line.split_once('=') {
                    Some((key, value)) if !line.starts_with("//") => PfsItem::Keyword {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    },
                    _ => PfsItem::Other(line.to_string()),
                };
                section.items.push(item);
            } else if line.is_empty() || line.starts_with("//") || doc.sections().next().is_none() {
                // Header lines, and comments between top level sections
                doc.items.push(PfsItem::Other(raw.trim_end().to_string()));
            } else {
                return Err(PfsError::Syntax {
                    line: line_no,
                    message: format!("unexpected text outside a section '{}'", line),
                });
            }
        }

        if let Some(open) = stack.last() {
            return Err(PfsError::Syntax {
                line: text.lines().count(),
                message: format!("section '{}' is never closed", open.name),
            });
        }

        Ok(doc)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read PFS file: {:?}", path))?;
        Self::parse(&decode(&bytes)).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = encode(&self.to_string())
            .with_context(|| format!("Failed to encode PFS file: {:?}", path))?;
        std::fs::write(path, bytes).with_context(|| format!("Failed to write PFS file: {:?}", path))
    }

    /// Top level sections
    pub fn sections(&self) -> impl Iterator<Item = &PfsSection> {
        self.items.iter().filter_map(|item| match item {
            PfsItem::Section(s) => Some(s),
            _ => None,
        })
    }

    /// Section at a `/`-separated path such as `FemEngineHD/TIME`
    pub fn section(&self, path: &str) -> Result<&PfsSection, PfsError> {
        let full = expand_alias(path);
        let mut names = full.split('/');
        let missing = || PfsError::MissingSection(full.clone());

        let first = names.next().ok_or_else(missing)?;
        let mut current = self
            .sections()
            .find(|s| s.name == first)
            .ok_or_else(missing)?;
        for name in names {
            current = current.child(name).ok_or_else(missing)?;
        }
        Ok(current)
    }

    pub fn section_mut(&mut self, path: &str) -> Result<&mut PfsSection, PfsError> {
        let full = expand_alias(path);
        let missing = PfsError::MissingSection(full.clone());
        let mut names = full.split('/');

        let Some(first) = names.next() else {
            return Err(missing);
        };
        let top = self.items.iter_mut().find_map(|item| match item {
            PfsItem::Section(s) if s.name == first => Some(s),
            _ => None,
        });
        let Some(mut current) = top else {
            return Err(missing);
        };
        for name in names {
            let Some(next) = current.child_mut(name) else {
                return Err(missing);
            };
            current = next;
        }
        Ok(current)
    }
}

impl fmt::Display for PfsDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                PfsItem::Section(section) => section.write_to(f, 0)?,
                PfsItem::Keyword { key, value } => writeln!(f, "{} = {}", key, value)?,
                PfsItem::Other(text) => writeln!(f, "{}", text)?,
            }
        }
        Ok(())
    }
}
