//! Tokenizer: turns query text into a flat token sequence.
//!
//! No end-of-input token is emitted; the parser sees the end of the
//! slice instead. Whitespace is skipped. Unterminated or empty string
//! literals and unrecognized characters become [`TokenKind::Error`]
//! tokens carrying a message, so nothing in the input is dropped.

use crate::types::{Token, TokenKind};

/// Turn a query into a list of tokens.
pub fn tokenize(query: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = query.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }

        let token = match c {
            c if c.is_ascii_alphabetic() => {
                let mut end = start + 1;
                while let Some(&(i, next)) = chars.peek() {
                    if !(next.is_ascii_alphabetic() || next == '.') {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                let text = &query[start..end];
                let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
                Token::new(kind, text, start, end)
            }

            ',' => Token::new(TokenKind::Comma, ",", start, start + 1),
            '*' => Token::new(TokenKind::Star, "*", start, start + 1),
            '=' => Token::new(TokenKind::Equals, "=", start, start + 1),

            '\'' => {
                let mut end = query.len();
                let mut closed = false;
                for (i, next) in chars.by_ref() {
                    if next == '\'' {
                        end = i + 1;
                        closed = true;
                        break;
                    }
                }
                let text = &query[start..end];
                if closed && text.len() > 2 {
                    Token::new(TokenKind::String, text, start, end)
                } else if closed {
                    Token::new(TokenKind::Error, text, start, end)
                        .with_error("empty string literal")
                } else {
                    Token::new(TokenKind::Error, text, start, end)
                        .with_error("unterminated string literal")
                }
            }

            other => {
                let end = start + other.len_utf8();
                Token::new(TokenKind::Error, &query[start..end], start, end)
                    .with_error(format!("unexpected character '{other}'"))
            }
        };

        tokens.push(token);
    }

    tracing::trace!("tokenized {} bytes into {} tokens", query.len(), tokens.len());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Render the query with `>` and `<` around every token.
    ///
    /// Used for snapshot-style assertions on token boundaries.
    fn mark_tokens(query: &str) -> String {
        let tokens = tokenize(query);
        let mut result = String::with_capacity(query.len() + tokens.len() * 2);

        for (i, c) in query.char_indices() {
            for tok in &tokens {
                if tok.span.end == i {
                    result.push('<');
                }
            }
            for tok in &tokens {
                if tok.span.start == i {
                    result.push('>');
                }
            }
            result.push(c);
        }
        for tok in &tokens {
            if tok.span.end == query.len() {
                result.push('<');
            }
        }

        result
    }

    fn kinds(query: &str) -> Vec<TokenKind> {
        tokenize(query).iter().map(|t| t.kind).collect()
    }

    fn check_tok(query: &str, expected: TokenKind) {
        assert_eq!(kinds(query), vec![expected], "tokenizing {query:?}");
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n").is_empty());
    }

    #[test]
    fn test_simple_tokens() {
        check_tok("SELECT", TokenKind::Select);
        check_tok("FROM", TokenKind::From);
        check_tok("WHERE", TokenKind::Where);
        check_tok("AND", TokenKind::And);
        check_tok("OR", TokenKind::Or);
        check_tok("'hello :)'", TokenKind::String);
        check_tok(",", TokenKind::Comma);
        check_tok("*", TokenKind::Star);
        check_tok("=", TokenKind::Equals);
        check_tok("username", TokenKind::Identifier);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        check_tok("select", TokenKind::Identifier);
        check_tok("From", TokenKind::Identifier);
    }

    #[test]
    fn test_dotted_identifier_is_one_token() {
        let tokens = tokenize("post.author.handle");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "post.author.handle");
    }

    #[test]
    fn test_string_includes_quotes() {
        let tokens = tokenize("'hello :)'");
        assert_eq!(tokens[0].text, "'hello :)'");
        assert_eq!(tokens[0].span.start, 0);
        assert_eq!(tokens[0].span.end, 10);
        assert!(tokens[0].errors.is_empty());
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = tokenize("'unterminated");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].text, "'unterminated");
        assert_eq!(tokens[0].errors, vec!["unterminated string literal"]);
    }

    #[test]
    fn test_empty_string_is_error() {
        let tokens = tokenize("''");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].errors, vec!["empty string literal"]);
    }

    #[test]
    fn test_lone_quote_is_error() {
        check_tok("'", TokenKind::Error);
    }

    #[test]
    fn test_unknown_character_is_error_token() {
        let tokens = tokenize("a ( b");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Identifier, TokenKind::Error, TokenKind::Identifier]
        );
        assert_eq!(tokens[1].text, "(");
        assert_eq!(tokens[1].errors, vec!["unexpected character '('"]);
    }

    #[test]
    fn test_multibyte_character_span() {
        let tokens = tokenize("é");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].span.len(), 'é'.len_utf8());
        assert_eq!(tokens[0].text, "é");
    }

    #[test]
    fn test_tokenize_simple_select() {
        assert_eq!(
            kinds("SELECT * FROM posts"),
            vec![
                TokenKind::Select,
                TokenKind::Star,
                TokenKind::From,
                TokenKind::Identifier
            ]
        );
        assert_eq!(mark_tokens("SELECT * FROM posts"), ">SELECT< >*< >FROM< >posts<");
    }

    #[test]
    fn test_spans_are_contiguous_modulo_whitespace() {
        let query = "SELECT handle, displayName FROM profile WHERE actor = 'bob'";
        let tokens = tokenize(query);
        let mut last_end = 0;
        for tok in &tokens {
            assert!(tok.span.start >= last_end);
            assert!(query[last_end..tok.span.start].trim().is_empty());
            assert_eq!(&query[tok.span.range()], tok.text);
            last_end = tok.span.end;
        }
        assert!(query[last_end..].trim().is_empty());
    }

    #[test]
    fn test_equals_without_spaces() {
        assert_eq!(
            kinds("actor='bob'"),
            vec![TokenKind::Identifier, TokenKind::Equals, TokenKind::String]
        );
    }
}
