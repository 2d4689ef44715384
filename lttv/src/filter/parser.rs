//! Recursive-descent parser for filter expressions (C7).
//!
//! Grammar, precedence lowest to highest:
//! ```text
//! expr       := or_expr
//! or_expr    := xor_expr ( ("||" | "OR")  xor_expr )*
//! xor_expr   := and_expr ( ("^^" | "XOR") and_expr )*
//! and_expr   := unary    ( ("&&" | "AND") unary )*
//! unary      := ("NOT" | "!") unary | "(" expr ")" | comparison
//! comparison := field_path op literal
//! field_path := IDENT ("." IDENT)*
//! op         := "==" | "!=" | "<=" | ">=" | "<" | ">"
//! literal    := INT | '"' ... '"' | BAREWORD
//! ```

use super::ast::{CompareOp, FieldRef, FilterExpr, Literal, SimpleExpression};
use crate::domain::errors::UsageError;

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

pub fn parse(input: &str) -> Result<FilterExpr, UsageError> {
    let mut parser = Parser { src: input, pos: 0 };
    let expr = parser.parse_or()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(UsageError::FilterParse { pos: parser.pos, message: "trailing input".to_owned() });
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.src[self.pos..].starts_with(|c: char| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek_rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat_token(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.peek_rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let rest = self.peek_rest();
        if rest.len() >= keyword.len()
            && rest[..keyword.len()].eq_ignore_ascii_case(keyword)
            && rest[keyword.len()..].chars().next().is_none_or(|c| !c.is_alphanumeric() && c != '_')
        {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<FilterExpr, UsageError> {
        let mut lhs = self.parse_xor()?;
        loop {
            if self.eat_token("||") || self.eat_keyword("OR") {
                let rhs = self.parse_xor()?;
                lhs = FilterExpr::Or(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_xor(&mut self) -> Result<FilterExpr, UsageError> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.eat_token("^^") || self.eat_keyword("XOR") {
                let rhs = self.parse_and()?;
                lhs = FilterExpr::Xor(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> Result<FilterExpr, UsageError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat_token("&&") || self.eat_keyword("AND") {
                let rhs = self.parse_unary()?;
                lhs = FilterExpr::And(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<FilterExpr, UsageError> {
        if self.eat_token("!") || self.eat_keyword("NOT") {
            return Ok(FilterExpr::Not(Box::new(self.parse_unary()?)));
        }
        self.skip_ws();
        if self.eat_token("(") {
            let inner = self.parse_or()?;
            if !self.eat_token(")") {
                return Err(UsageError::FilterParse { pos: self.pos, message: "expected ')'".to_owned() });
            }
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FilterExpr, UsageError> {
        let field = self.parse_field_path()?;
        self.skip_ws();
        let op = self.parse_op()?;
        let value = self.parse_literal()?;
        Ok(FilterExpr::Leaf(SimpleExpression { field, op, value }))
    }

    fn parse_field_path(&mut self) -> Result<FieldRef, UsageError> {
        self.skip_ws();
        let start = self.pos;
        let rest = self.peek_rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || "=!<>()".contains(c))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(UsageError::FilterParse { pos: start, message: "expected a field path".to_owned() });
        }
        let path = &rest[..len];
        self.pos += len;
        field_from_path(path).map_err(|message| UsageError::FilterParse { pos: start, message })
    }

    fn parse_op(&mut self) -> Result<CompareOp, UsageError> {
        self.skip_ws();
        for (token, op) in [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ] {
            if self.eat_token(token) {
                return Ok(op);
            }
        }
        Err(UsageError::FilterParse { pos: self.pos, message: "expected a comparison operator".to_owned() })
    }

    fn parse_literal(&mut self) -> Result<Literal, UsageError> {
        self.skip_ws();
        if self.eat_token("\"") {
            let start = self.pos;
            let rel = self.peek_rest().find('"').ok_or(UsageError::FilterParse {
                pos: start,
                message: "unterminated string literal".to_owned(),
            })?;
            let value = self.src[start..start + rel].to_owned();
            self.pos = start + rel + 1;
            return Ok(Literal::Str(value));
        }
        let start = self.pos;
        let rest = self.peek_rest();
        let len = rest.find(|c: char| c.is_whitespace() || "()".contains(c)).unwrap_or(rest.len());
        if len == 0 {
            return Err(UsageError::FilterParse { pos: start, message: "expected a literal".to_owned() });
        }
        let token = &rest[..len];
        self.pos += len;
        Ok(token.parse::<i64>().map_or_else(|_| Literal::Str(token.to_owned()), Literal::Int))
    }
}

fn field_from_path(path: &str) -> Result<FieldRef, String> {
    Ok(match path {
        "process.pid" | "pid" => FieldRef::Pid,
        "process.ppid" | "ppid" => FieldRef::Ppid,
        "cpu" => FieldRef::Cpu,
        "process.name" => FieldRef::ProcessName,
        "process.brand" => FieldRef::Brand,
        "state.execution_mode" => FieldRef::ExecutionMode,
        "state.submode" => FieldRef::Submode,
        "state.status" => FieldRef::ProcessStatus,
        "process.type" => FieldRef::ProcessType,
        "event.tsc" | "tsc" => FieldRef::Tsc,
        "event.name" => FieldRef::EventName,
        other => match other.strip_prefix("event.") {
            Some(field) => FieldRef::Marker(field.to_owned()),
            None => return Err(format!("unknown field path `{other}`")),
        },
    })
}
