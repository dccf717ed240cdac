//! Parser for the solver's textual satisfiability result and model.
//!
//! Expected shape: a first line of `sat` | `unsat` | `unknown`; after
//! `sat`, a parenthesized `model` block of `(define-fun <name> () <Sort>
//! <value>)` entries. Values may span physical lines (multi-line quoted
//! strings). Malformed input yields a parse error, never a partial result.

use crate::{Model, ModelValue, SolverError, SolverResult};
use std::iter::Peekable;
use std::str::Chars;
use tracing::debug;

/// Parse a solver's full textual response.
pub fn parse_solver_output(output: &str) -> Result<SolverResult, SolverError> {
    let text = output.trim_start();
    if text.starts_with("sat") {
        debug!("solver outcome is sat, parsing model");
        parse_sat_model(text)
    } else if text.starts_with("unsat") {
        debug!("solver outcome is unsat");
        Ok(SolverResult::Unsat)
    } else if text.starts_with("unknown") {
        debug!("solver outcome is unknown");
        Ok(SolverResult::Unknown)
    } else if text.starts_with("(error") {
        let first_line = text.lines().next().unwrap_or(text);
        Err(SolverError::Reported(first_line.to_string()))
    } else {
        Err(SolverError::Parse(format!(
            "unrecognized solver output: {:?}",
            text.lines().next().unwrap_or("")
        )))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Atom(String),
    Str(String),
}

struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer {
            chars: input.chars().peekable(),
        }
    }

    /// Next token, or a parse error on premature end of input.
    fn expect_token(&mut self) -> Result<Token, SolverError> {
        self.next_token()?
            .ok_or_else(|| SolverError::Parse("unexpected end of solver output".to_string()))
    }

    fn next_token(&mut self) -> Result<Option<Token>, SolverError> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };
        match c {
            '(' => {
                self.chars.next();
                Ok(Some(Token::LParen))
            }
            ')' => {
                self.chars.next();
                Ok(Some(Token::RParen))
            }
            '"' => Ok(Some(Token::Str(self.read_string()?))),
            _ => {
                let mut atom = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    atom.push(c);
                    self.chars.next();
                }
                Ok(Some(Token::Atom(atom)))
            }
        }
    }

    /// Read a quoted string, decoding the recognized escapes (`\\`, `\n`,
    /// `\t`, `\b`, `\xHH`). An escape outside this set keeps the backslash
    /// verbatim and lets the following character through untouched, so a
    /// backslash before the closing quote does not extend the string.
    fn read_string(&mut self) -> Result<String, SolverError> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => {
                    return Err(SolverError::Parse(
                        "unterminated string in solver model".to_string(),
                    ))
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.peek() {
                    Some('\\') => {
                        self.chars.next();
                        out.push('\\');
                    }
                    Some('n') => {
                        self.chars.next();
                        out.push('\n');
                    }
                    Some('t') => {
                        self.chars.next();
                        out.push('\t');
                    }
                    Some('b') => {
                        self.chars.next();
                        out.push('\u{8}');
                    }
                    Some('x') => {
                        self.chars.next();
                        let hi = self.hex_digit()?;
                        let lo = self.hex_digit()?;
                        // A single byte; may be NUL.
                        out.push(char::from(hi * 16 + lo));
                    }
                    _ => out.push('\\'),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_digit(&mut self) -> Result<u8, SolverError> {
        match self.chars.next().and_then(|c| c.to_digit(16)) {
            Some(d) => Ok(d as u8),
            None => Err(SolverError::Parse(
                "malformed \\xHH escape in solver model".to_string(),
            )),
        }
    }
}

fn parse_sat_model(text: &str) -> Result<SolverResult, SolverError> {
    let mut tz = Tokenizer::new(text);
    expect_atom_eq(&mut tz, "sat")?;
    expect(&mut tz, Token::LParen)?;
    expect_atom_eq(&mut tz, "model")?;

    let mut model = Model::new();
    loop {
        match tz.expect_token()? {
            Token::RParen => break,
            Token::LParen => {
                expect_atom_eq(&mut tz, "define-fun")?;
                let name = expect_atom(&mut tz)?;
                expect(&mut tz, Token::LParen)?;
                expect(&mut tz, Token::RParen)?;
                let sort = expect_atom(&mut tz)?;
                let value = match sort.as_str() {
                    "Int" => ModelValue::Int(parse_int_value(&mut tz)?),
                    "Real" => ModelValue::Real(parse_real_value(&mut tz)?),
                    "String" => ModelValue::Str(parse_string_value(&mut tz)?),
                    other => {
                        return Err(SolverError::Parse(format!(
                            "unknown sort {other:?} in solver model"
                        )))
                    }
                };
                expect(&mut tz, Token::RParen)?;
                debug!(name = %name, ?value, "parsed model entry");
                model.insert(name, value);
            }
            other => {
                return Err(SolverError::Parse(format!(
                    "expected model entry, found {other:?}"
                )))
            }
        }
    }
    Ok(SolverResult::Sat(model))
}

fn expect(tz: &mut Tokenizer<'_>, token: Token) -> Result<(), SolverError> {
    let found = tz.expect_token()?;
    if found == token {
        Ok(())
    } else {
        Err(SolverError::Parse(format!(
            "expected {token:?}, found {found:?}"
        )))
    }
}

fn expect_atom(tz: &mut Tokenizer<'_>) -> Result<String, SolverError> {
    match tz.expect_token()? {
        Token::Atom(a) => Ok(a),
        other => Err(SolverError::Parse(format!(
            "expected atom, found {other:?}"
        ))),
    }
}

fn expect_atom_eq(tz: &mut Tokenizer<'_>, expected: &str) -> Result<(), SolverError> {
    let atom = expect_atom(tz)?;
    if atom == expected {
        Ok(())
    } else {
        Err(SolverError::Parse(format!(
            "expected {expected:?}, found {atom:?}"
        )))
    }
}

/// `Int` value: a decimal literal or `(- n)`.
fn parse_int_value(tz: &mut Tokenizer<'_>) -> Result<i64, SolverError> {
    match tz.expect_token()? {
        Token::Atom(a) => parse_i64(&a),
        Token::LParen => {
            expect_atom_eq(tz, "-")?;
            let a = expect_atom(tz)?;
            let value = parse_i64(&format!("-{a}"))?;
            expect(tz, Token::RParen)?;
            Ok(value)
        }
        other => Err(SolverError::Parse(format!(
            "expected integer value, found {other:?}"
        ))),
    }
}

/// `Real` value: a decimal literal, a ratio `(/ num den)` evaluated in
/// floating point, or either wrapped in a negation.
fn parse_real_value(tz: &mut Tokenizer<'_>) -> Result<f64, SolverError> {
    match tz.expect_token()? {
        Token::Atom(a) => parse_f64(&a),
        Token::LParen => match tz.expect_token()? {
            Token::Atom(a) if a == "-" => {
                let value = match tz.expect_token()? {
                    Token::Atom(x) => parse_f64(&x)?,
                    Token::LParen => {
                        let ratio = parse_ratio_tail(tz)?;
                        ratio
                    }
                    other => {
                        return Err(SolverError::Parse(format!(
                            "expected negated real, found {other:?}"
                        )))
                    }
                };
                expect(tz, Token::RParen)?;
                Ok(-value)
            }
            Token::Atom(a) if a == "/" => parse_ratio_operands(tz),
            other => Err(SolverError::Parse(format!(
                "expected real value, found {other:?}"
            ))),
        },
        other => Err(SolverError::Parse(format!(
            "expected real value, found {other:?}"
        ))),
    }
}

/// Parses `/ num den )` after an already-consumed `(`.
fn parse_ratio_tail(tz: &mut Tokenizer<'_>) -> Result<f64, SolverError> {
    expect_atom_eq(tz, "/")?;
    parse_ratio_operands(tz)
}

/// Parses `num den )`, where `num` may itself be `(- a)`.
fn parse_ratio_operands(tz: &mut Tokenizer<'_>) -> Result<f64, SolverError> {
    let (negative, num) = match tz.expect_token()? {
        Token::Atom(a) => (false, parse_f64(&a)?),
        Token::LParen => {
            expect_atom_eq(tz, "-")?;
            let a = expect_atom(tz)?;
            let v = parse_f64(&a)?;
            expect(tz, Token::RParen)?;
            (true, v)
        }
        other => {
            return Err(SolverError::Parse(format!(
                "expected ratio numerator, found {other:?}"
            )))
        }
    };
    let den = parse_f64(&expect_atom(tz)?)?;
    expect(tz, Token::RParen)?;
    let value = num / den;
    Ok(if negative { -value } else { value })
}

fn parse_string_value(tz: &mut Tokenizer<'_>) -> Result<String, SolverError> {
    match tz.expect_token()? {
        Token::Str(s) => Ok(s),
        other => Err(SolverError::Parse(format!(
            "expected string value, found {other:?}"
        ))),
    }
}

fn parse_i64(s: &str) -> Result<i64, SolverError> {
    s.parse()
        .map_err(|_| SolverError::Parse(format!("not an integer: {s:?}")))
}

fn parse_f64(s: &str) -> Result<f64, SolverError> {
    s.parse()
        .map_err(|_| SolverError::Parse(format!("not a real: {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sat_model(output: &str) -> Model {
        match parse_solver_output(output).unwrap() {
            SolverResult::Sat(model) => model,
            other => panic!("expected sat, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_int_model() {
        let model = sat_model("sat\n(model\n(define-fun var0 () Int 10)\n)\n");
        assert_eq!(model["var0"], ModelValue::Int(10));
    }

    #[test]
    fn test_parse_negative_int() {
        let model = sat_model("sat\n(model\n(define-fun x () Int (- 5))\n)\n");
        assert_eq!(model["x"], ModelValue::Int(-5));
    }

    #[test]
    fn test_parse_ratio_recovers_pi() {
        let model = sat_model(
            "sat\n(model\n(define-fun v () Real (/ 3141592653589793 1000000000000000))\n)\n",
        );
        let ModelValue::Real(v) = model["v"] else {
            panic!("expected real")
        };
        assert!((v - 3.14159265358979).abs() < 1e-13);
    }

    #[test]
    fn test_parse_real_forms() {
        let model = sat_model(
            "sat\n(model\n\
             (define-fun a () Real 2.5)\n\
             (define-fun b () Real (- 2.5))\n\
             (define-fun c () Real (/ 1 4))\n\
             (define-fun d () Real (- (/ 1 4)))\n\
             (define-fun e () Real (/ (- 1) 4))\n\
             )\n",
        );
        assert_eq!(model["a"], ModelValue::Real(2.5));
        assert_eq!(model["b"], ModelValue::Real(-2.5));
        assert_eq!(model["c"], ModelValue::Real(0.25));
        assert_eq!(model["d"], ModelValue::Real(-0.25));
        assert_eq!(model["e"], ModelValue::Real(-0.25));
    }

    #[test]
    fn test_parse_hex_escape() {
        let model = sat_model("sat\n(model\n(define-fun v () String \"\\x01\")\n)\n");
        assert_eq!(model["v"], ModelValue::Str("\u{1}".to_string()));
    }

    #[test]
    fn test_parse_nul_escape() {
        let model = sat_model("sat\n(model\n(define-fun v () String \"a\\x00b\")\n)\n");
        assert_eq!(model["v"], ModelValue::Str("a\0b".to_string()));
    }

    #[test]
    fn test_parse_string_escapes() {
        let model =
            sat_model("sat\n(model\n(define-fun v () String \"a\\nb\\tc\\bd\\\\e\")\n)\n");
        assert_eq!(model["v"], ModelValue::Str("a\nb\tc\u{8}d\\e".to_string()));
    }

    #[test]
    fn test_unrecognized_escape_passes_through() {
        let model = sat_model("sat\n(model\n(define-fun v () String \"a\\qb\")\n)\n");
        assert_eq!(model["v"], ModelValue::Str("a\\qb".to_string()));
    }

    #[test]
    fn test_blank_and_empty_strings_distinct() {
        let model = sat_model(
            "sat\n(model\n(define-fun blank () String \" \")\n(define-fun empty () String \"\")\n)\n",
        );
        assert_eq!(model["blank"], ModelValue::Str(" ".to_string()));
        assert_eq!(model["empty"], ModelValue::Str("".to_string()));
    }

    #[test]
    fn test_string_value_spans_lines_and_keeps_parens() {
        let model =
            sat_model("sat\n(model\n(define-fun v () String \"line1\nline2 (x) )\")\n)\n");
        assert_eq!(
            model["v"],
            ModelValue::Str("line1\nline2 (x) )".to_string())
        );
    }

    #[test]
    fn test_parse_unsat() {
        assert_eq!(
            parse_solver_output("unsat\n").unwrap(),
            SolverResult::Unsat
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse_solver_output("unknown\n").unwrap(),
            SolverResult::Unknown
        );
    }

    #[test]
    fn test_parse_error_response() {
        let err = parse_solver_output("(error \"line 1: invalid input\")\n").unwrap_err();
        assert!(matches!(err, SolverError::Reported(_)));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = parse_solver_output("segmentation fault\n").unwrap_err();
        assert!(matches!(err, SolverError::Parse(_)));
    }

    #[test]
    fn test_empty_model_is_sat() {
        let model = sat_model("sat\n(model\n)\n");
        assert!(model.is_empty());
    }

    #[test]
    fn test_truncated_model_fails() {
        let err = parse_solver_output("sat\n(model\n(define-fun v () Int").unwrap_err();
        assert!(matches!(err, SolverError::Parse(_)));
    }

    #[test]
    fn test_unknown_sort_fails() {
        let err =
            parse_solver_output("sat\n(model\n(define-fun v () Bool true)\n)\n").unwrap_err();
        assert!(matches!(err, SolverError::Parse(_)));
    }

    #[test]
    fn test_define_fun_with_arguments_fails() {
        let err = parse_solver_output("sat\n(model\n(define-fun v ((x Int)) Int 0)\n)\n")
            .unwrap_err();
        assert!(matches!(err, SolverError::Parse(_)));
    }

    #[test]
    fn test_unterminated_string_fails() {
        let err = parse_solver_output("sat\n(model\n(define-fun v () String \"abc)\n").unwrap_err();
        assert!(matches!(err, SolverError::Parse(_)));
    }

    #[test]
    fn test_multiple_entries() {
        let model = sat_model(
            "sat\n(model\n\
             (define-fun x () Int 3)\n\
             (define-fun y () Real 0.5)\n\
             (define-fun s () String \"hey\")\n\
             )\n",
        );
        assert_eq!(model.len(), 3);
        assert_eq!(model["x"], ModelValue::Int(3));
        assert_eq!(model["y"], ModelValue::Real(0.5));
        assert_eq!(model["s"], ModelValue::Str("hey".to_string()));
    }
}
