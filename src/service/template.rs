//! Statement templating.
//!
//! Only `{{name}}`, `{{password}}` and `{{expiration}}` are recognised. Any
//! other `{{...}}` sequence, or an unterminated `{{`, is a configuration
//! error. Values are spliced in verbatim, so callers must only pass values
//! produced by the credential generator.

use crate::error::DbCredError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Name,
    Password,
    Expiration,
}

impl Placeholder {
    fn parse(key: &str) -> Option<Self> {
        match key.trim() {
            "name" => Some(Self::Name),
            "password" => Some(Self::Password),
            "expiration" => Some(Self::Expiration),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Password => "password",
            Self::Expiration => "expiration",
        }
    }
}

/// Values available to a rendering pass. Revocation has no password and
/// no expiration; referencing them there is an error.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    pub name: &'a str,
    pub password: Option<&'a str>,
    pub expiration: Option<&'a str>,
}

impl<'a> TemplateValues<'a> {
    pub fn name_only(name: &'a str) -> Self {
        Self {
            name,
            password: None,
            expiration: None,
        }
    }

    fn get(&self, placeholder: Placeholder) -> Option<&'a str> {
        match placeholder {
            Placeholder::Name => Some(self.name),
            Placeholder::Password => self.password,
            Placeholder::Expiration => self.expiration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'t> {
    Text(&'t str),
    Placeholder(Placeholder),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, DbCredError> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        segments.push(Segment::Text(&rest[..start]));
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open.find(CLOSE).ok_or_else(|| {
            DbCredError::config(format!("unterminated placeholder in statement: {template}"))
        })?;
        let key = &after_open[..end];
        let placeholder = Placeholder::parse(key).ok_or_else(|| {
            DbCredError::config(format!("unknown placeholder {{{{{}}}}}", key.trim()))
        })?;
        segments.push(Segment::Placeholder(placeholder));
        rest = &after_open[end + CLOSE.len()..];
    }
    segments.push(Segment::Text(rest));
    Ok(segments)
}

/// Check that a template only uses known placeholders.
pub fn validate(template: &str) -> Result<(), DbCredError> {
    parse(template).map(|_| ())
}

pub fn render(template: &str, values: &TemplateValues<'_>) -> Result<String, DbCredError> {
    let mut out = String::with_capacity(template.len() + 64);
    for segment in parse(template)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(placeholder) => {
                let value = values.get(placeholder).ok_or_else(|| {
                    DbCredError::config(format!(
                        "placeholder {{{{{}}}}} is not available in this statement",
                        placeholder.as_str()
                    ))
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Render every template and split the results into individual statements.
pub fn render_all(
    templates: &[String],
    values: &TemplateValues<'_>,
) -> Result<Vec<String>, DbCredError> {
    let mut statements = Vec::new();
    for template in templates {
        let rendered = render(template, values)?;
        statements.extend(
            rendered
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    Ok(statements)
}
