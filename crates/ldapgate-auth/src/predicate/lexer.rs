use super::PredicateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Ident(String),
    Str(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '&' | '|' | '=' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => match c {
                        '&' => Token::And,
                        '|' => Token::Or,
                        _ => Token::Eq,
                    },
                    _ => {
                        return Err(PredicateError::new(
                            format!("expected '{}{}'", c, c),
                            pos,
                        ))
                    }
                }
            }
            '!' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == quote => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(PredicateError::new("unterminated string literal", pos));
                }
                Token::Str(value)
            }
            c if is_ident_char(c) => {
                let mut ident = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    ident.push(ch);
                    chars.next();
                }
                Token::Ident(ident)
            }
            other => {
                return Err(PredicateError::new(
                    format!("unexpected character '{}'", other),
                    pos,
                ))
            }
        };

        tokens.push(Spanned {
            token,
            position: pos,
        });
    }

    Ok(tokens)
}
