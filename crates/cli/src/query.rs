//! Subscribe query expressions.
//!
//! A query is one to three tags joined by `and` / `or`
//! (case-insensitive): `news`, `news or sports`, `news and sports or music`.
//! It is evaluated left to right over URL sets.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("expected 1, 3 or 5 tokens (tag [op tag [op tag]]), got {0}")]
    TokenCount(usize),
    #[error("unknown operator {0:?}, expected \"and\" or \"or\"")]
    Operator(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    fn parse(token: &str) -> Result<Self, QueryError> {
        if token.eq_ignore_ascii_case("and") {
            Ok(Operator::And)
        } else if token.eq_ignore_ascii_case("or") {
            Ok(Operator::Or)
        } else {
            Err(QueryError::Operator(token.to_string()))
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("AND"),
            Operator::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    first: String,
    rest: Vec<(Operator, String)>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        if !matches!(tokens.len(), 1 | 3 | 5) {
            return Err(QueryError::TokenCount(tokens.len()));
        }
        let rest = tokens[1..]
            .chunks(2)
            .map(|pair| Ok((Operator::parse(pair[0])?, pair[1].to_string())))
            .collect::<Result<Vec<_>, QueryError>>()?;
        Ok(Self {
            first: tokens[0].to_string(),
            rest,
        })
    }

    /// Tags in query order; a tag named twice appears twice.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.first.as_str()).chain(self.rest.iter().map(|(_, tag)| tag.as_str()))
    }

    /// Combines per-tag URL lists. Tags missing from `urls` are empty sets.
    /// The result keeps first-seen order and holds no duplicates.
    pub fn evaluate(&self, urls: &HashMap<String, Vec<String>>) -> Vec<String> {
        let lookup = |tag: &str| -> Vec<String> {
            let mut set = Vec::new();
            for url in urls.get(tag).into_iter().flatten() {
                if !set.contains(url) {
                    set.push(url.clone());
                }
            }
            set
        };

        let mut result = lookup(&self.first);
        for (op, tag) in &self.rest {
            let rhs = lookup(tag);
            match op {
                Operator::And => result.retain(|url| rhs.contains(url)),
                Operator::Or => {
                    for url in rhs {
                        if !result.contains(&url) {
                            result.push(url);
                        }
                    }
                }
            }
        }
        result
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.first)?;
        for (op, tag) in &self.rest {
            write!(f, " {} {}", op, tag)?;
        }
        Ok(())
    }
}
