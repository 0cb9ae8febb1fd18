//! Managed query translation
//!
//! Managed queries name the entity and its attributes instead of the table
//! and columns:
//!
//! ```text
//! update TestEntity t set t.text = :text where t.externalId = :id
//! from TestEntity where text = :text
//! ```
//!
//! Translation rewrites the entity name to its quoted table, drops the alias
//! that follows it, and rewrites `alias.attribute` and bare attribute names
//! to quoted columns. A query starting with `from` gets a select list of every
//! mapped column. String literals, quoted identifiers and `:named` parameters
//! pass through untouched.

use crate::errors::Result;
use lookupdao_core::entity::{quote_ident, Entity, EntityDescriptor};
use lookupdao_core::errors::DaoError;

const KEYWORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "delete", "desc", "distinct", "else",
    "end", "exists", "from", "group", "having", "in", "inner", "insert", "into", "is", "join",
    "left", "like", "limit", "not", "null", "offset", "on", "or", "order", "select", "set",
    "then", "union", "update", "values", "when", "where",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Identifier, possibly dotted
    Word(String),
    Space(String),
    /// Literal, quoted identifier, parameter or punctuation
    Verbatim(String),
}

fn tokenize(query: &str) -> Vec<Token> {
    let chars: Vec<char> = query.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token::Space(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' || c == '`' {
            i += 1;
            while i < chars.len() {
                if chars[i] == c {
                    // Doubled quote is an escaped quote
                    if i + 1 < chars.len() && chars[i + 1] == c {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            tokens.push(Token::Verbatim(chars[start..i].iter().collect()));
        } else if c == ':' || c == '?' || c == '@' || c == '$' {
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Verbatim(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            i += 1;
            tokens.push(Token::Verbatim(c.to_string()));
        }
    }
    tokens
}

/// Rewrite a managed query into SQL over the descriptor's table
///
/// # Errors
///
/// `Validation` when a qualified name refers to an attribute the entity
/// does not have.
pub fn translate<T: Entity>(query: &str, descriptor: &EntityDescriptor<T>) -> Result<String> {
    let tokens = tokenize(query);
    let mut aliases: Vec<String> = Vec::new();
    let mut out = String::with_capacity(query.len() + 32);
    let mut i = 0;

    let first_word = tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w.as_str()),
        _ => None,
    });
    if first_word.is_some_and(|w| w.eq_ignore_ascii_case("from")) {
        out.push_str("SELECT ");
        out.push_str(&descriptor.select_list());
        out.push(' ');
    }

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(word) if word == T::NAME => {
                out.push_str(&descriptor.quoted_table());
                i += 1;
                if let Some((alias, next)) = alias_after(&tokens, i) {
                    aliases.push(alias);
                    i = next;
                }
                continue;
            }
            Token::Word(word) if word.contains('.') => {
                out.push_str(&qualified(word, &aliases, descriptor)?);
            }
            Token::Word(word) if !is_keyword(word) => match descriptor.attribute(word) {
                Some(attr) => out.push_str(&quote_ident(attr.column())),
                None => out.push_str(word),
            },
            Token::Word(word) | Token::Space(word) | Token::Verbatim(word) => out.push_str(word),
        }
        i += 1;
    }

    Ok(out)
}

/// Alias following an entity name, and the index of the token after it
fn alias_after(tokens: &[Token], from: usize) -> Option<(String, usize)> {
    let mut i = from;
    let mut saw_as = false;
    loop {
        match tokens.get(i)? {
            Token::Space(_) => i += 1,
            Token::Word(w) if !saw_as && w.eq_ignore_ascii_case("as") => {
                saw_as = true;
                i += 1;
            }
            Token::Word(w) if !w.contains('.') && (saw_as || !is_keyword(w)) => {
                return Some((w.clone(), i + 1));
            }
            _ => return None,
        }
    }
}

fn qualified<T: Entity>(
    word: &str,
    aliases: &[String],
    descriptor: &EntityDescriptor<T>,
) -> Result<String> {
    let Some((qualifier, attribute)) = word.split_once('.') else {
        return Ok(word.to_string());
    };
    let is_ours = qualifier == T::NAME || aliases.iter().any(|a| a == qualifier);
    if !is_ours {
        return Ok(word.to_string());
    }
    descriptor
        .attribute(attribute)
        .map(|attr| quote_ident(attr.column()))
        .ok_or_else(|| {
            DaoError::validation(format!(
                "{} has no attribute '{}' (in '{}')",
                T::NAME,
                attribute,
                word
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookupdao_core::entity::{from_value, Attribute, SqlType};

    #[derive(Clone, Default)]
    struct TestEntity {
        id: i64,
        external_id: String,
        text: String,
    }

    impl Entity for TestEntity {
        const NAME: &'static str = "TestEntity";
        const TABLE: &'static str = "test_entity";

        fn attributes() -> Vec<Attribute<Self>> {
            vec![
                Attribute::<Self>::new("id", SqlType::Integer)
                    .identifier()
                    .with_accessors(|e| e.id.into(), |e, v| {
                        e.id = from_value(v)?;
                        Ok(())
                    }),
                Attribute::<Self>::new("externalId", SqlType::Text)
                    .lookup_key()
                    .with_column("ext_id")
                    .with_accessors(|e| e.external_id.clone().into(), |e, v| {
                        e.external_id = from_value(v)?;
                        Ok(())
                    }),
                Attribute::<Self>::new("text", SqlType::Text).with_accessors(
                    |e| e.text.clone().into(),
                    |e, v| {
                        e.text = from_value(v)?;
                        Ok(())
                    },
                ),
            ]
        }
    }

    fn translated(query: &str) -> String {
        let descriptor = EntityDescriptor::<TestEntity>::discover().unwrap();
        translate(query, &descriptor).unwrap()
    }

    #[test]
    fn test_update_with_alias() {
        assert_eq!(
            translated("update TestEntity t set t.text = :text where t.externalId = :id"),
            "update \"test_entity\" set \"text\" = :text where \"ext_id\" = :id"
        );
    }

    #[test]
    fn test_update_without_alias() {
        assert_eq!(
            translated("update TestEntity set text = :text where id > 0"),
            "update \"test_entity\" set \"text\" = :text where \"id\" > 0"
        );
    }

    #[test]
    fn test_from_query_gets_select_list() {
        assert_eq!(
            translated("from TestEntity as e where e.text = :text order by e.id desc"),
            "SELECT \"id\", \"ext_id\", \"text\" from \"test_entity\" where \"text\" = :text order by \"id\" desc"
        );
    }

    #[test]
    fn test_literals_and_params_untouched() {
        assert_eq!(
            translated("update TestEntity set text = 'text' where externalId = :externalId"),
            "update \"test_entity\" set \"text\" = 'text' where \"ext_id\" = :externalId"
        );
    }

    #[test]
    fn test_unknown_qualified_attribute_rejected() {
        let descriptor = EntityDescriptor::<TestEntity>::discover().unwrap();
        let err = translate("update TestEntity t set t.missing = 1", &descriptor).unwrap_err();
        assert_eq!(err.code(), "ERR_VALIDATION");
    }
}
