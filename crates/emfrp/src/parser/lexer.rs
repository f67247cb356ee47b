use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Integer(i32),
    Identifier(&'code str),
    AtLast,
    Newline,
    Assign,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    ShiftLeft,
    ShiftRight,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Ampersand,
    Pipe,
    Caret,
    DoubleAmpersand,
    DoublePipe,
    Node,
    Init,
    If,
    Then,
    Else,
    True,
    False,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Integer(integer) => integer.to_string().into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::AtLast => "@last".into(),
            Self::Newline => "\n".into(),
            Self::Assign => "=".into(),
            Self::Equal => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::ShiftLeft => "<<".into(),
            Self::ShiftRight => ">>".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::Ampersand => "&".into(),
            Self::Pipe => "|".into(),
            Self::Caret => "^".into(),
            Self::DoubleAmpersand => "&&".into(),
            Self::DoublePipe => "||".into(),
            Self::Node => "node".into(),
            Self::Init => "init".into(),
            Self::If => "if".into(),
            Self::Then => "then".into(),
            Self::Else => "else".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // Longer operators first so `<<` never lexes as two `<`.
    let comparator_or_shift = choice((
        just("<<").to(Token::ShiftLeft),
        just(">>").to(Token::ShiftRight),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
        just('=').to(Token::Assign),
    ));

    let logical_or_bitwise = choice((
        just("&&").to(Token::DoubleAmpersand),
        just("||").to(Token::DoublePipe),
        just('&').to(Token::Ampersand),
        just('|').to(Token::Pipe),
        just('^').to(Token::Caret),
    ));

    let arithmetic_operator = choice((
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let comment = just('#')
        .then(any().and_is(text::newline().not()).repeated())
        .to_slice()
        .map(Token::Comment);

    // Negative literals are `0 - n` after parsing; the literal itself must fit in i32.
    let integer = text::int(10).try_map(|digits: &str, span| {
        digits.parse::<i32>().map(Token::Integer).map_err(|_| {
            ParseError::custom(span, format!("Integer literal '{digits}' does not fit in 32 bits"))
        })
    });

    let word = text::ascii::ident().map(|word: &str| match word {
        "node" => Token::Node,
        "init" => Token::Init,
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        "true" => Token::True,
        "false" => Token::False,
        identifier => Token::Identifier(identifier),
    });

    let token = choice((
        bracket,
        comment,
        integer,
        word,
        just("@last").to(Token::AtLast),
        text::newline().to(Token::Newline),
        comparator_or_shift,
        logical_or_bitwise,
        arithmetic_operator,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::inline_whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}
