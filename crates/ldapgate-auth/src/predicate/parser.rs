//! Recursive descent parser
//!
//! ```text
//! expr    := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "true" | "false" | "has" "(" ident ")"
//!          | operand op operand
//! operand := "dn" | "username" | "attr" "(" ident ")" | string
//! op      := "==" | "!=" | "contains" | "starts_with" | "ends_with"
//! ```

use super::lexer::{Spanned, Token};
use super::PredicateError;

/// Deepest `!` / `(` nesting accepted
const MAX_DEPTH: usize = 64;

/// Longest accepted token stream. Bounds `&&`/`||` chains, which build
/// left-leaning trees that evaluation walks recursively.
const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Bool(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Has(String),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Dn,
    Username,
    Attr(String),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Contains,
    StartsWith,
    EndsWith,
}

pub(crate) struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Spanned>) -> Self {
        let end = tokens.last().map(|t| t.position + 1).unwrap_or(0);
        Self {
            tokens,
            pos: 0,
            end,
            depth: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Expr, PredicateError> {
        if let Some(extra) = self.tokens.get(MAX_TOKENS) {
            return Err(PredicateError::new("expression too long", extra.position));
        }
        let expr = self.parse_or()?;
        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(PredicateError::new("unexpected trailing input", extra.position));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), PredicateError> {
        let position = self.position();
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            _ => Err(PredicateError::new(format!("expected {}", what), position)),
        }
    }

    fn enter(&mut self, position: usize) -> Result<(), PredicateError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PredicateError::new("expression nested too deeply", position));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        if self.peek() == Some(&Token::Not) {
            self.enter(self.position())?;
            self.advance();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        let position = self.position();
        match self.peek() {
            Some(Token::LParen) => {
                self.enter(position)?;
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(id)) if id == "true" => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Some(Token::Ident(id)) if id == "false" => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Some(Token::Ident(id)) if id == "has" => {
                self.advance();
                let attr = self.parse_call_argument()?;
                Ok(Expr::Has(attr))
            }
            Some(_) => {
                let left = self.parse_operand()?;
                let op = self.parse_op()?;
                let right = self.parse_operand()?;
                Ok(Expr::Compare { left, op, right })
            }
            None => Err(PredicateError::new("unexpected end of expression", position)),
        }
    }

    fn parse_call_argument(&mut self) -> Result<String, PredicateError> {
        self.expect(Token::LParen, "'('")?;
        let position = self.position();
        let name = match self.advance() {
            Some(Token::Ident(name)) => name,
            _ => return Err(PredicateError::new("expected attribute name", position)),
        };
        self.expect(Token::RParen, "')'")?;
        Ok(name)
    }

    fn parse_operand(&mut self) -> Result<Operand, PredicateError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Str(s)) => Ok(Operand::Literal(s)),
            Some(Token::Ident(id)) => match id.as_str() {
                "dn" => Ok(Operand::Dn),
                "username" => Ok(Operand::Username),
                "attr" => Ok(Operand::Attr(self.parse_call_argument()?)),
                other => Err(PredicateError::new(
                    format!("unknown operand '{}'", other),
                    position,
                )),
            },
            Some(_) => Err(PredicateError::new("expected operand", position)),
            None => Err(PredicateError::new("unexpected end of expression", position)),
        }
    }

    fn parse_op(&mut self) -> Result<CompareOp, PredicateError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Eq) => Ok(CompareOp::Eq),
            Some(Token::Ne) => Ok(CompareOp::Ne),
            Some(Token::Ident(id)) => match id.as_str() {
                "contains" => Ok(CompareOp::Contains),
                "starts_with" => Ok(CompareOp::StartsWith),
                "ends_with" => Ok(CompareOp::EndsWith),
                other => Err(PredicateError::new(
                    format!("unknown operator '{}'", other),
                    position,
                )),
            },
            _ => Err(PredicateError::new("expected comparison operator", position)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::lexer::tokenize;

    fn parse(src: &str) -> Result<Expr, PredicateError> {
        Parser::new(tokenize(src)?).parse()
    }

    #[test]
    fn test_parse_compare() {
        assert_eq!(
            parse(r#"attr(ou) starts_with "Staff""#).unwrap(),
            Expr::Compare {
                left: Operand::Attr("ou".into()),
                op: CompareOp::StartsWith,
                right: Operand::Literal("Staff".into()),
            }
        );
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse("!true || false && has(mail)").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Not(Box::new(Expr::Bool(true)))),
                Box::new(Expr::And(
                    Box::new(Expr::Bool(false)),
                    Box::new(Expr::Has("mail".into()))
                )),
            )
        );
    }

    #[test]
    fn test_error_position_at_end() {
        let err = parse("dn ==").unwrap_err();
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(parse("(true").is_err());
        assert!(parse("true)").is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let bangs = format!("{}true", "!".repeat(100_000));
        let err = parse(&bangs).unwrap_err();
        assert_eq!(err.message, "expression too long");

        let parens = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        let err = parse(&parens).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");
        assert_eq!(err.position, MAX_DEPTH);

        let nots = format!("{}true", "!".repeat(MAX_DEPTH + 1));
        assert_eq!(
            parse(&nots).unwrap_err().message,
            "expression nested too deeply"
        );
        assert!(parse(&format!("{}true", "!".repeat(MAX_DEPTH))).is_ok());
    }

    #[test]
    fn test_long_chain_rejected() {
        let chain = vec!["true"; 100_000].join(" && ");
        assert_eq!(parse(&chain).unwrap_err().message, "expression too long");

        let short = vec!["has(mail)"; 100].join(" || ");
        assert!(parse(&short).is_ok());
    }
}
