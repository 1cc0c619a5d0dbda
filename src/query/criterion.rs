//! Criterion Query Parser
//!
//! ```text
//! expr       := and_expr ("||" and_expr)*
//! and_expr   := primary ("&&" primary)*
//! primary    := "(" expr ")" | "!" path | path op value | path
//! op         := == = != <> !<> <>* !<>* ~ !~ ~* !~* > >= < <=
//! value      := "..." | '...' | bare
//! ```
//!
//! `&&` binds tighter than `||`. A bare path tests for presence, `!path` for
//! absence.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, opt, recognize},
    error::{Error, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::query::error::{QueryError, QueryResult};

/// Parse tree of a criterion query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriterionNode {
    Compare {
        path: String,
        operator: String,
        value: Option<String>,
    },
    And(Box<CriterionNode>, Box<CriterionNode>),
    Or(Box<CriterionNode>, Box<CriterionNode>),
}

/// Parse a criterion query string
pub fn parse_criterion(input: &str) -> QueryResult<CriterionNode> {
    let input = input.trim();

    match parse_expr(input) {
        Ok((remaining, node)) if remaining.trim().is_empty() => Ok(node),
        Ok((remaining, _)) => Err(QueryError::Syntax(remaining.trim().to_string())),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let at = e.input.trim();
            Err(QueryError::Syntax(if at.is_empty() { input } else { at }.to_string()))
        }
        Err(nom::Err::Incomplete(_)) => Err(QueryError::Syntax(input.to_string())),
    }
}

fn parse_expr(input: &str) -> IResult<&str, CriterionNode> {
    let (mut input, mut node) = parse_and_expr(input)?;

    loop {
        match preceded(delimited(multispace0, tag("||"), multispace0), parse_and_expr)(input) {
            Ok((rest, right)) => {
                node = CriterionNode::Or(Box::new(node), Box::new(right));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, node)),
            Err(e) => return Err(e),
        }
    }
}

fn parse_and_expr(input: &str) -> IResult<&str, CriterionNode> {
    let (mut input, mut node) = parse_primary(input)?;

    loop {
        match preceded(delimited(multispace0, tag("&&"), multispace0), parse_primary)(input) {
            Ok((rest, right)) => {
                node = CriterionNode::And(Box::new(node), Box::new(right));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, node)),
            Err(e) => return Err(e),
        }
    }
}

fn parse_primary(input: &str) -> IResult<&str, CriterionNode> {
    alt((
        delimited(
            pair(char('('), multispace0),
            parse_expr,
            pair(multispace0, char(')')),
        ),
        map(preceded(pair(char('!'), multispace0), parse_path), |path| {
            CriterionNode::Compare {
                path: path.to_string(),
                operator: "!=".to_string(),
                value: None,
            }
        }),
        parse_comparison,
        map(parse_path, |path| CriterionNode::Compare {
            path: path.to_string(),
            operator: "==".to_string(),
            value: None,
        }),
    ))(input)
}

fn parse_comparison(input: &str) -> IResult<&str, CriterionNode> {
    let (input, path) = parse_path(input)?;
    let (input, operator) = delimited(multispace0, parse_operator, multispace0)(input)?;
    let (input, value) = parse_value(input)?;

    Ok((
        input,
        CriterionNode::Compare {
            path: path.to_string(),
            operator: operator.to_string(),
            value: Some(value),
        },
    ))
}

/// Longest operators first so `!<>*` is not read as `!<>`
fn parse_operator(input: &str) -> IResult<&str, &str> {
    alt((
        tag("!<>*"),
        tag("!<>"),
        tag("<>*"),
        tag("<>"),
        tag("!~*"),
        tag("!~"),
        tag("~*"),
        tag("~"),
        tag("=="),
        tag("!="),
        tag(">="),
        tag("<="),
        tag("="),
        tag(">"),
        tag("<"),
    ))(input)
}

/// Dotted logical path; segments may carry an `(index)` suffix
fn parse_path(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(
        char('.'),
        pair(
            recognize(pair(
                satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
                take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            )),
            opt(delimited(
                char('('),
                take_while(|c: char| c != '(' && c != ')'),
                char(')'),
            )),
        ),
    ))(input)
}

fn parse_value(input: &str) -> IResult<&str, String> {
    alt((
        quoted('"'),
        quoted('\''),
        map(
            take_while1(|c: char| !c.is_whitespace() && !"()&|\"'".contains(c)),
            str::to_string,
        ),
    ))(input)
}

/// Quoted value; `\\` and `\<delim>` are unescaped
fn quoted(delim: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (mut rest, _) = char(delim)(input)?;
        let mut out = String::new();

        loop {
            let mut chars = rest.chars();
            match chars.next() {
                None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
                Some('\\') => match chars.next() {
                    Some(next) if next == delim || next == '\\' => {
                        out.push(next);
                        rest = &rest[1 + next.len_utf8()..];
                    }
                    _ => {
                        out.push('\\');
                        rest = &rest[1..];
                    }
                },
                Some(c) if c == delim => return Ok((&rest[c.len_utf8()..], out)),
                Some(c) => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
    }
}
