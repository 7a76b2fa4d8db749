//! `{placeholder}` substitution for rename templates.
//!
//! `{{` and `}}` produce literal braces. Placeholder names are checked against
//! [`PLACEHOLDERS`] when a rule is parsed, so rendering a validated template
//! can only fail on a template that bypassed parsing.

use crate::error::{Error, Result};

pub const PLACEHOLDERS: [&str; 6] = ["name", "ext", "kind", "source_app", "domain", "size"];

#[derive(Debug, PartialEq, Eq)]
enum Piece<'a> {
    Literal(&'a str),
    Brace(char),
    Field(&'a str),
}

fn tokenize(template: &str) -> Result<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while !rest.is_empty() {
        let Some(pos) = rest.find(['{', '}']) else {
            pieces.push(Piece::Literal(rest));
            break;
        };
        if pos > 0 {
            pieces.push(Piece::Literal(&rest[..pos]));
        }
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            pieces.push(Piece::Brace('{'));
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            pieces.push(Piece::Brace('}'));
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(Error::InvalidArgument(format!(
                "single '}}' in template {:?}",
                template
            )));
        } else {
            let close = tail.find('}').ok_or_else(|| {
                Error::InvalidArgument(format!("unclosed '{{' in template {:?}", template))
            })?;
            let field = tail[1..close].trim();
            if field.is_empty() || field.contains('{') {
                return Err(Error::InvalidArgument(format!(
                    "malformed placeholder in template {:?}",
                    template
                )));
            }
            pieces.push(Piece::Field(field));
            rest = &tail[close + 1..];
        }
    }

    Ok(pieces)
}

/// Reject templates with syntax errors or placeholders outside [`PLACEHOLDERS`].
pub fn validate(template: &str) -> Result<()> {
    for piece in tokenize(template)? {
        if let Piece::Field(field) = piece {
            if !PLACEHOLDERS.contains(&field) {
                return Err(Error::InvalidArgument(format!(
                    "unknown placeholder '{{{}}}' in template {:?}; expected one of {:?}",
                    field, template, PLACEHOLDERS
                )));
            }
        }
    }
    Ok(())
}

pub fn render<F>(template: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    for piece in tokenize(template)? {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Brace(c) => out.push(c),
            Piece::Field(field) => {
                let value = lookup(field).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "unknown placeholder '{{{}}}' in template {:?}",
                        field, template
                    ))
                })?;
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}
