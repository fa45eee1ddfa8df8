//! Criteria operators and condition fragments

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Comparison operators accepted by `Criteria::add_filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    Like,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOperator::Equal => write!(f, "="),
            FilterOperator::NotEqual => write!(f, "<>"),
            FilterOperator::GreaterThan => write!(f, ">"),
            FilterOperator::GreaterThanOrEqual => write!(f, ">="),
            FilterOperator::LessThan => write!(f, "<"),
            FilterOperator::LessThanOrEqual => write!(f, "<="),
            FilterOperator::In => write!(f, "IN"),
            FilterOperator::Like => write!(f, "LIKE"),
        }
    }
}

/// Connector placed before a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// A resolved condition and the connector joining it to the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub connector: LogicalOperator,
    pub sql: String,
}

/// Replace every marker token in `template` with the text `resolve` returns for it.
///
/// A token runs from the character after the marker up to the first space or
/// `)`, whichever comes first. A marker with neither after it makes the
/// template malformed. Markers inside quoted literals are left alone.
pub(crate) fn scan_template<F>(template: &str, marker: char, mut resolve: F) -> ModelResult<String>
where
    F: FnMut(&str) -> ModelResult<String>,
{
    let mut resolved = String::with_capacity(template.len());
    let mut quote: Option<char> = None;
    let mut chars = template.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
                resolved.push(ch);
            }
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                resolved.push(ch);
            }
            None if ch == marker => {
                let token_start = index + ch.len_utf8();
                let end = template[token_start..]
                    .find([' ', ')'])
                    .ok_or_else(|| ModelError::MalformedCondition(template.to_string()))?;
                resolved.push_str(&resolve(&template[token_start..token_start + end])?);
                while chars.next_if(|(next, _)| *next < token_start + end).is_some() {}
            }
            None => resolved.push(ch),
        }
    }

    Ok(resolved)
}

/// Number of `?` placeholders in `sql` outside quoted literals
pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for ch in sql.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == '?' => count += 1,
            None => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(token: &str) -> ModelResult<String> {
        Ok(token.to_uppercase())
    }

    #[test]
    fn test_tokens_end_at_space_or_paren() {
        let resolved = scan_template("(@name = ? OR @client.age > ?)", '@', upper).unwrap();
        assert_eq!(resolved, "(NAME = ? OR CLIENT.AGE > ?)");

        let resolved = scan_template("lower(@name) LIKE ?", '@', upper).unwrap();
        assert_eq!(resolved, "lower(NAME) LIKE ?");
    }

    #[test]
    fn test_marker_at_end_is_malformed() {
        let result = scan_template("? = @name", '@', upper);
        assert!(matches!(result, Err(ModelError::MalformedCondition(_))));
    }

    #[test]
    fn test_template_without_markers_is_unchanged() {
        assert_eq!(scan_template("1 = 1", '@', upper).unwrap(), "1 = 1");
    }

    #[test]
    fn test_custom_marker() {
        let resolved = scan_template("#name = ?", '#', upper).unwrap();
        assert_eq!(resolved, "NAME = ?");
    }

    #[test]
    fn test_quoted_literals_are_not_scanned() {
        let resolved = scan_template("@name <> 'who@where?' AND @age > ?", '@', upper).unwrap();
        assert_eq!(resolved, "NAME <> 'who@where?' AND AGE > ?");
    }

    #[test]
    fn test_placeholder_count_skips_literals() {
        assert_eq!(count_placeholders("a = ? AND b = ?"), 2);
        assert_eq!(count_placeholders("a <> 'who?' AND b > ?"), 1);
        assert_eq!(count_placeholders("a = 'it''s?' OR \"odd?col\" = ?"), 1);
        assert_eq!(count_placeholders("1 = 1"), 0);
    }

    #[test]
    fn test_operator_rendering() {
        assert_eq!(FilterOperator::NotEqual.to_string(), "<>");
        assert_eq!(FilterOperator::GreaterThanOrEqual.to_string(), ">=");
        assert_eq!(LogicalOperator::Or.to_string(), "OR");
        assert_eq!(OrderDirection::Desc.to_string(), "DESC");
    }
}
