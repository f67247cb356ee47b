use chumsky::{input::Stream, input::ValueInput, pratt::*, prelude::*};
use std::fmt;
use std::ops::Range;

use crate::identifier::Identifier;

mod lexer;
pub use lexer::{Token, lexer};

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;

/// Deepest expression tree accepted by the parser, the node store and the
/// evaluator.
pub const MAX_NESTING: usize = 256;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// Expression tree. Built once by the parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Integer(i32),
    Boolean(bool),
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    /// Current value of a node.
    Identifier(Identifier),
    /// Previous value of a node, written `name@last`.
    LastIdentifier(Identifier),
    /// Placeholder left behind by error recovery.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    ShiftLeft,
    ShiftRight,
    LessOrEqual,
    Less,
    GreaterOrEqual,
    Greater,
    Equal,
    NotEqual,
    And,
    Or,
    Xor,
    ShortCircuitAnd,
    ShortCircuitOr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefinition {
    pub name: Identifier,
    /// Seeds the previous value before the first evaluation of `body`.
    pub init: Option<Expression>,
    pub body: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Definition(NodeDefinition),
}

impl Expression {
    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn conditional(condition: Expression, then_branch: Expression, else_branch: Expression) -> Self {
        Expression::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn identifier(name: impl Into<Identifier>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn last(name: impl Into<Identifier>) -> Self {
        Expression::LastIdentifier(name.into())
    }

    /// Height of the tree; a leaf has depth 1. Walks an explicit stack, so it
    /// is safe on trees too deep to recurse over.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expression, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            match expression {
                Expression::Binary { left, right, .. } => {
                    stack.push((&**left, depth + 1));
                    stack.push((&**right, depth + 1));
                }
                Expression::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    stack.push((&**condition, depth + 1));
                    stack.push((&**then_branch, depth + 1));
                    stack.push((&**else_branch, depth + 1));
                }
                _ => {}
            }
        }
        deepest
    }

    fn take_children(&mut self, stack: &mut Vec<Expression>) {
        match self {
            Expression::Binary { left, right, .. } => {
                take_branch(left, stack);
                take_branch(right, stack);
            }
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => {
                take_branch(condition, stack);
                take_branch(then_branch, stack);
                take_branch(else_branch, stack);
            }
            _ => {}
        }
    }
}

fn take_branch(branch: &mut Expression, stack: &mut Vec<Expression>) {
    if matches!(branch, Expression::Binary { .. } | Expression::If { .. }) {
        stack.push(std::mem::replace(branch, Expression::Invalid));
    }
}

// Long operator chains would overflow the stack with the derived recursive drop.
impl Drop for Expression {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        self.take_children(&mut stack);
        while let Some(mut expression) = stack.pop() {
            expression.take_children(&mut stack);
        }
    }
}

impl NodeDefinition {
    pub fn depth(&self) -> usize {
        let init = self.init.as_ref().map_or(0, Expression::depth);
        init.max(self.body.depth())
    }
}

impl Statement {
    pub fn depth(&self) -> usize {
        match self {
            Statement::Expression(expression) => expression.depth(),
            Statement::Definition(definition) => definition.depth(),
        }
    }
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::LessOrEqual => "<=",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::ShortCircuitAnd => "&&",
            Self::ShortCircuitOr => "||",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Integer(value) => write!(f, "{value}"),
            Expression::Boolean(value) => write!(f, "{value}"),
            Expression::Binary { operator, left, right } => write!(f, "({left} {operator} {right})"),
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "if {condition} then {then_branch} else {else_branch}"),
            Expression::Identifier(name) => write!(f, "{name}"),
            Expression::LastIdentifier(name) => write!(f, "{name}@last"),
            Expression::Invalid => f.write_str("<invalid>"),
        }
    }
}

impl fmt::Display for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("node ")?;
        if let Some(init) = &self.init {
            write!(f, "init[{init}] ")?;
        }
        write!(f, "{} = {}", self.name, self.body)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statement::Expression(expression) => write!(f, "{expression}"),
            Statement::Definition(definition) => write!(f, "{definition}"),
        }
    }
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Statement>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let newlines = just(Token::Newline).repeated();
    let identifier = select! { Token::Identifier(identifier) => Identifier::from(identifier) };

    let expression = recursive(|expression| {
        let integer = select! { Token::Integer(value) => Expression::Integer(value) };
        let boolean = select! {
            Token::True => Expression::Boolean(true),
            Token::False => Expression::Boolean(false),
        };

        let reference = identifier
            .clone()
            .then(just(Token::AtLast).or_not())
            .map(|(name, at_last)| match at_last {
                Some(_) => Expression::LastIdentifier(name),
                None => Expression::Identifier(name),
            });

        let conditional = just(Token::If)
            .ignore_then(expression.clone())
            .then_ignore(just(Token::Then))
            .then(expression.clone())
            .then_ignore(just(Token::Else))
            .then(expression.clone())
            .map(|((condition, then_branch), else_branch)| {
                Expression::conditional(condition, then_branch, else_branch)
            });

        let nested = expression
            .delimited_by(just(Token::BracketRoundOpen), just(Token::BracketRoundClose))
            .recover_with(via_parser(nested_delimiters(
                Token::BracketRoundOpen,
                Token::BracketRoundClose,
                [(Token::BracketSquareOpen, Token::BracketSquareClose)],
                |_| Expression::Invalid,
            )));

        let atom = choice((integer, boolean, reference, conditional, nested));

        atom.pratt((
            // Precedence 1 (lowest): short-circuit or
            infix(left(1), just(Token::DoublePipe), |l, _, r, _| {
                Expression::binary(BinaryOperator::ShortCircuitOr, l, r)
            }),
            infix(left(2), just(Token::DoubleAmpersand), |l, _, r, _| {
                Expression::binary(BinaryOperator::ShortCircuitAnd, l, r)
            }),
            infix(left(3), just(Token::Pipe), |l, _, r, _| {
                Expression::binary(BinaryOperator::Or, l, r)
            }),
            infix(left(4), just(Token::Caret), |l, _, r, _| {
                Expression::binary(BinaryOperator::Xor, l, r)
            }),
            infix(left(5), just(Token::Ampersand), |l, _, r, _| {
                Expression::binary(BinaryOperator::And, l, r)
            }),
            infix(
                left(6),
                select! {
                    Token::Equal => BinaryOperator::Equal,
                    Token::NotEqual => BinaryOperator::NotEqual,
                },
                |l, operator, r, _| Expression::binary(operator, l, r),
            ),
            infix(
                left(7),
                select! {
                    Token::Less => BinaryOperator::Less,
                    Token::LessOrEqual => BinaryOperator::LessOrEqual,
                    Token::Greater => BinaryOperator::Greater,
                    Token::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
                },
                |l, operator, r, _| Expression::binary(operator, l, r),
            ),
            infix(
                left(8),
                select! {
                    Token::ShiftLeft => BinaryOperator::ShiftLeft,
                    Token::ShiftRight => BinaryOperator::ShiftRight,
                },
                |l, operator, r, _| Expression::binary(operator, l, r),
            ),
            infix(
                left(9),
                select! {
                    Token::Plus => BinaryOperator::Add,
                    Token::Minus => BinaryOperator::Subtract,
                },
                |l, operator, r, _| Expression::binary(operator, l, r),
            ),
            infix(
                left(10),
                select! {
                    Token::Asterisk => BinaryOperator::Multiply,
                    Token::Slash => BinaryOperator::Divide,
                    Token::Percent => BinaryOperator::Modulo,
                },
                |l, operator, r, _| Expression::binary(operator, l, r),
            ),
            // Unary minus desugars to `0 - operand`.
            prefix(11, just(Token::Minus), |_, operand, _| {
                Expression::binary(BinaryOperator::Subtract, Expression::Integer(0), operand)
            }),
        ))
    });

    let definition = just(Token::Node)
        .ignore_then(
            just(Token::Init)
                .ignore_then(
                    expression
                        .clone()
                        .delimited_by(just(Token::BracketSquareOpen), just(Token::BracketSquareClose)),
                )
                .or_not(),
        )
        .then(identifier)
        .then_ignore(just(Token::Assign))
        .then(expression.clone())
        .map(|((init, name), body)| Statement::Definition(NodeDefinition { name, init, body }));

    let statement = choice((definition, expression.map(Statement::Expression))).map_with(|statement, extra| {
        Spanned {
            node: statement,
            span: extra.span(),
        }
    });

    statement
        .separated_by(just(Token::Newline).repeated().at_least(1))
        .allow_trailing()
        .collect()
        .padded_by(newlines)
}

/// Owned syntax error, detached from the token lifetime so a host can keep
/// or render it after the source buffer is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub span: Range<usize>,
    pub message: String,
    pub reason: String,
}

impl SyntaxError {
    fn from_rich<T: fmt::Display>(error: &ParseError<'_, T>) -> Self {
        Self {
            span: error.span().into_range(),
            message: error.to_string(),
            reason: error.reason().to_string(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for SyntaxError {}

/// Lexes and parses a whole program; one statement per line.
pub fn parse_program(source_code: &str) -> Result<Vec<Spanned<Statement>>, Vec<SyntaxError>> {
    let (tokens, errors) = lexer().parse(source_code).into_output_errors();
    if !errors.is_empty() {
        return Err(errors.iter().map(SyntaxError::from_rich).collect());
    }
    let mut tokens = tokens.unwrap_or_default();

    tokens.retain(|spanned_token| !matches!(spanned_token.node, Token::Comment(_)));

    let end_of_input = Span::from(source_code.len()..source_code.len());
    let (statements, errors) = parser()
        .parse(Stream::from_iter(tokens).map(end_of_input, |Spanned { node, span }| (node, span)))
        .into_output_errors();
    if !errors.is_empty() {
        return Err(errors.iter().map(SyntaxError::from_rich).collect());
    }
    let statements = statements.unwrap_or_default();

    let too_deep: Vec<SyntaxError> = statements
        .iter()
        .filter(|statement| statement.node.depth() > MAX_NESTING)
        .map(|statement| {
            let message = format!("expression nested deeper than {MAX_NESTING} levels");
            SyntaxError {
                span: statement.span.into_range(),
                reason: message.clone(),
                message,
            }
        })
        .collect();
    if !too_deep.is_empty() {
        return Err(too_deep);
    }
    Ok(statements)
}
