//! Lucene Query Parser
//!
//! Parses Lucene-like query strings into a [`ParseNode`] tree.
//!
//! # Supported Syntax
//!
//! ```text
//! criteria   := criterion (connective criterion)*
//! connective := AND | OR | && | || | whitespace        (whitespace means AND)
//! criterion  := "(" criteria ")" | [NOT |!|-|+] term
//! term       := [field:] [ low TO high ] | [field:] { low TO high } | [field:] string [^N|~N]
//! string     := "..." | '...' | /regex/ | bare
//! ```
//!
//! Connectives are left-associative with equal precedence.
//!
//! # Examples
//!
//! ```text
//! failed
//! severity:high AND -source:internal
//! port:[1 TO 1024] OR host:web*
//! http.headers(0).name:/x-.*/
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, multispace1, satisfy},
    combinator::{map, map_res, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryResult};

/// Characters that end a bare string unless escaped
const RESERVED_CHARS: &str = "+-!(){}[]^\"~:";
/// Characters a backslash may escape in a bare string
const ESCAPABLE_CHARS: &str = "+-!(){}[]^\"~*?:\\&|";

/// Parse a Lucene query string into a parse tree
pub fn parse_lucene(input: &str) -> QueryResult<ParseNode> {
    let input = input.trim();

    match parse_criteria(input) {
        Ok((remaining, node)) => {
            if remaining.trim().is_empty() {
                Ok(node)
            } else {
                Err(QueryError::Syntax(remaining.trim().to_string()))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(QueryError::Syntax(fragment(e.input, input)))
        }
        Err(nom::Err::Incomplete(_)) => Err(QueryError::Syntax(input.to_string())),
    }
}

/// The failing fragment, or the whole query when the parser stopped at its end
fn fragment(at: &str, input: &str) -> String {
    if at.trim().is_empty() {
        input.to_string()
    } else {
        at.trim().to_string()
    }
}

/// criterion (connective criterion)*, folded to the left
fn parse_criteria(input: &str) -> IResult<&str, ParseNode> {
    let (mut input, mut node) = parse_criterion(input)?;

    loop {
        match pair(parse_connective, parse_criterion)(input) {
            Ok((rest, (op, right))) => {
                node = ParseNode::Bool {
                    left: Box::new(node),
                    op,
                    right: Box::new(right),
                };
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, node)),
            Err(e) => return Err(e),
        }
    }
}

fn parse_connective(input: &str) -> IResult<&str, BoolOp> {
    alt((
        value(BoolOp::And, delimited(multispace0, tag("&&"), multispace0)),
        value(BoolOp::Or, delimited(multispace0, tag("||"), multispace0)),
        value(BoolOp::And, delimited(multispace0, tag("AND"), keyword_end)),
        value(BoolOp::Or, delimited(multispace0, tag("OR"), keyword_end)),
        value(BoolOp::And, multispace1),
    ))(input)
}

/// A keyword ends at whitespace or right before an opening parenthesis
fn keyword_end(input: &str) -> IResult<&str, &str> {
    alt((multispace1, recognize(peek(char('(')))))(input)
}

fn parse_criterion(input: &str) -> IResult<&str, ParseNode> {
    alt((parse_parenthesis, parse_negatable))(input)
}

fn parse_parenthesis(input: &str) -> IResult<&str, ParseNode> {
    map(
        delimited(
            pair(char('('), multispace0),
            parse_criteria,
            pair(multispace0, char(')')),
        ),
        |inner| ParseNode::Parenthesis(Box::new(inner)),
    )(input)
}

fn parse_negatable(input: &str) -> IResult<&str, ParseNode> {
    map(pair(opt(parse_unary_op), parse_term), |(operator, body)| {
        ParseNode::Negatable { operator, body }
    })(input)
}

fn parse_unary_op(input: &str) -> IResult<&str, UnaryOp> {
    alt((
        value(UnaryOp::Not, terminated(tag("NOT"), multispace1)),
        value(UnaryOp::Bang, char('!')),
        value(UnaryOp::Minus, char('-')),
        value(UnaryOp::Plus, char('+')),
    ))(input)
}

fn parse_term(input: &str) -> IResult<&str, Term> {
    alt((parse_range, parse_value_term))(input)
}

fn parse_range(input: &str) -> IResult<&str, Term> {
    let (input, field) = parse_field(input)?;
    let (input, _) = multispace0(input)?;

    let result = alt((
        map(
            delimited(char('['), parse_range_bounds, char(']')),
            |(low, high)| Term::InclusiveRange {
                field: field.clone(),
                low,
                high,
            },
        ),
        map(
            delimited(char('{'), parse_range_bounds, char('}')),
            |(low, high)| Term::ExclusiveRange {
                field: field.clone(),
                low,
                high,
            },
        ),
    ))(input);
    result
}

fn parse_range_bounds(input: &str) -> IResult<&str, (LuceneString, LuceneString)> {
    map(
        tuple((
            multispace0,
            parse_string,
            multispace1,
            tag("TO"),
            multispace1,
            parse_string,
            multispace0,
        )),
        |(_, low, _, _, _, high, _)| (low, high),
    )(input)
}

fn parse_value_term(input: &str) -> IResult<&str, Term> {
    map(
        tuple((parse_field, parse_string, opt(parse_modifier))),
        |(field, value, modifier)| Term::Fielded {
            field,
            value,
            modifier,
        },
    )(input)
}

/// Optional `path:` prefix
fn parse_field(input: &str) -> IResult<&str, Option<FieldPath>> {
    opt(terminated(parse_field_path, char(':')))(input)
}

fn parse_field_path(input: &str) -> IResult<&str, FieldPath> {
    map(separated_list1(char('.'), parse_segment), |segments| FieldPath {
        segments,
    })(input)
}

fn parse_segment(input: &str) -> IResult<&str, PathSegment> {
    let (input, name) = parse_word(input)?;
    let (input, index) = opt(delimited(char('('), parse_path_index, char(')')))(input)?;

    Ok((
        input,
        PathSegment {
            name: name.to_string(),
            index: index.map(str::to_string),
        },
    ))
}

/// Lowercase field word: a letter, then letters, digits, `-` or `_`
fn parse_word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_lowercase()),
        take_while(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'),
    ))(input)
}

fn parse_path_index(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), alt((digit1, parse_bare_raw))))(input)
}

fn parse_string(input: &str) -> IResult<&str, LuceneString> {
    alt((
        map(quoted('"'), LuceneString::DoubleQuoted),
        map(quoted('\''), LuceneString::SingleQuoted),
        map(quoted('/'), LuceneString::Regex),
        parse_bare,
    ))(input)
}

/// A `delim`-quoted string where `\delim` stands for the delimiter itself
fn quoted(delim: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (mut rest, _) = char(delim)(input)?;
        let mut out = String::new();

        loop {
            let mut chars = rest.chars();
            match chars.next() {
                None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
                Some('\\') if chars.next() == Some(delim) => {
                    out.push(delim);
                    rest = &rest[1 + delim.len_utf8()..];
                }
                Some(c) if c == delim => return Ok((&rest[c.len_utf8()..], out)),
                Some(c) => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
    }
}

/// Bare string; the keywords `AND` and `OR` are not accepted as values
fn parse_bare(input: &str) -> IResult<&str, LuceneString> {
    let (rest, raw) = parse_bare_raw(input)?;
    if raw == "AND" || raw == "OR" {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
    }
    Ok((rest, LuceneString::Unquoted(raw.to_string())))
}

fn parse_bare_raw(input: &str) -> IResult<&str, &str> {
    let mut end = 0;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&(j, next)) if ESCAPABLE_CHARS.contains(next) => {
                    chars.next();
                    end = j + next.len_utf8();
                }
                _ => end = i + 1,
            }
            continue;
        }
        if c.is_whitespace() || RESERVED_CHARS.contains(c) {
            break;
        }
        if (c == '&' || c == '|') && input[i + 1..].starts_with(c) {
            break;
        }
        end = i + c.len_utf8();
    }

    if end == 0 {
        Err(nom::Err::Error(Error::new(input, ErrorKind::TakeWhile1)))
    } else {
        Ok((&input[end..], &input[..end]))
    }
}

fn parse_modifier(input: &str) -> IResult<&str, Modifier> {
    alt((
        map(
            preceded(char('^'), map_res(digit1, |d: &str| d.parse::<u32>())),
            Modifier::Boost,
        ),
        map(preceded(char('~'), digit0), |d: &str| {
            Modifier::Fuzzy(d.parse().ok())
        }),
    ))(input)
}
