//! CSS selector subset used to resolve locators against an in-process tree.
//!
//! Supported syntax:
//! - selector lists separated by `,`
//! - child (`>`) and descendant (whitespace) combinators
//! - compounds of a type selector or `*`, `#id`, `.class`, `[attr]`, `[attr=value]`
//! - `:nth-child(n)`, `:first-child`, `:last-child`

use super::error::DomError;

/// Read access to an element tree, as needed for matching
pub trait SelectorTree {
    type Node: Copy;

    fn tag<'a>(&'a self, node: Self::Node) -> &'a str;

    fn attribute<'a>(&'a self, node: Self::Node, name: &str) -> Option<&'a str>;

    /// Parent element; `None` for the root element and detached roots
    fn parent_element(&self, node: Self::Node) -> Option<Self::Node>;

    /// (1-based position, number of element siblings including the node)
    fn element_position(&self, node: Self::Node) -> (usize, usize);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Child,
    Descendant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeMatch>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeMatch {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pseudo {
    NthChild(usize),
    FirstChild,
    LastChild,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, DomError> {
        Parser::new(input).parse_list()
    }

    pub fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        self.selectors.iter().any(|s| s.matches(tree, node))
    }
}

impl ComplexSelector {
    fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        self.matches_at(tree, node, self.compounds.len() - 1)
    }

    // Right-to-left, backtracking over ancestors for descendant combinators.
    fn matches_at<T: SelectorTree>(&self, tree: &T, node: T::Node, idx: usize) -> bool {
        if !self.compounds[idx].matches(tree, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match self.combinators[idx - 1] {
            Combinator::Child => tree
                .parent_element(node)
                .map_or(false, |parent| self.matches_at(tree, parent, idx - 1)),
            Combinator::Descendant => {
                let mut current = tree.parent_element(node);
                while let Some(ancestor) = current {
                    if self.matches_at(tree, ancestor, idx - 1) {
                        return true;
                    }
                    current = tree.parent_element(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.pseudos.is_empty()
    }

    fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        if let Some(ref tag) = self.tag {
            if tag != "*" && !tree.tag(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        for id in &self.ids {
            if tree.attribute(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = tree.attribute(node, "class").unwrap_or("");
            let has_all = self
                .classes
                .iter()
                .all(|c| class_attr.split_whitespace().any(|have| have == c));
            if !has_all {
                return false;
            }
        }
        for attr in &self.attributes {
            match (tree.attribute(node, &attr.name), &attr.value) {
                (None, _) => return false,
                (Some(actual), Some(expected)) if actual != expected => return false,
                _ => {}
            }
        }
        for pseudo in &self.pseudos {
            let (position, count) = tree.element_position(node);
            let ok = match pseudo {
                Pseudo::NthChild(n) => position == *n,
                Pseudo::FirstChild => position == 1,
                Pseudo::LastChild => position == count,
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::invalid_selector(self.input, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, DomError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, DomError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if had_space => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, DomError> {
        let mut compound = Compound::default();

        match self.peek() {
            Some('*') => {
                self.pos += 1;
                compound.tag = Some("*".to_string());
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.pseudos.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected selector, found '{}'", c)),
                None => self.error("expected selector"),
            });
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, DomError> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.bump() {
                    Some(escaped) => ident.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(c) {
                ident.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected identifier"));
        }
        Ok(ident)
    }

    fn parse_attribute(&mut self) -> Result<AttributeMatch, DomError> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let value = match self.bump() {
            Some(']') => return Ok(AttributeMatch { name, value: None }),
            Some('=') => {
                self.skip_whitespace();
                match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.pos += 1;
                        let mut value = String::new();
                        loop {
                            match self.bump() {
                                Some(c) if c == quote => break,
                                Some('\\') => match self.bump() {
                                    Some(c) => value.push(c),
                                    None => return Err(self.error("dangling escape")),
                                },
                                Some(c) => value.push(c),
                                None => return Err(self.error("unterminated string")),
                            }
                        }
                        value
                    }
                    _ => self.parse_ident()?,
                }
            }
            _ => return Err(self.error("malformed attribute selector")),
        };
        self.skip_whitespace();
        if self.bump() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(AttributeMatch {
            name,
            value: Some(value),
        })
    }

    fn parse_pseudo(&mut self) -> Result<Pseudo, DomError> {
        let name = self.parse_ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Pseudo::FirstChild),
            "last-child" => Ok(Pseudo::LastChild),
            "nth-child" => {
                if self.bump() != Some('(') {
                    return Err(self.error("expected '(' after :nth-child"));
                }
                self.skip_whitespace();
                let mut digits = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                    digits.push(c);
                    self.pos += 1;
                }
                self.skip_whitespace();
                if self.bump() != Some(')') {
                    return Err(self.error("unsupported :nth-child argument"));
                }
                match digits.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Pseudo::NthChild(n)),
                    _ => Err(self.error("unsupported :nth-child argument")),
                }
            }
            other => Err(self.error(format!("unsupported pseudo-class ':{}'", other))),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Whether `value` can be written after `#` without escaping
pub fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let first_ok = match chars.next() {
        Some('-') => matches!(value.chars().nth(1), Some(c) if c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()),
        Some(c) => c.is_ascii_alphabetic() || c == '_' || !c.is_ascii(),
        None => false,
    };
    first_ok && value.chars().all(is_ident_char)
}
