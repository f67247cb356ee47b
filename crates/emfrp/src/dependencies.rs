//! Static dependency analysis over expression trees.
//!
//! Both reference forms count: `x` and `x@last` each make the expression
//! depend on `x`. Conditionals contribute every branch, not just the one a
//! particular evaluation would take. Deciding that a node's own `@last`
//! read does not block its definition is left to the node store.

use smallvec::SmallVec;

use crate::identifier::Identifier;
use crate::parser::Expression;

/// Distinct identifiers in first-seen order.
pub type Dependencies = SmallVec<[Identifier; 4]>;

pub fn dependencies_of(expression: &Expression) -> Dependencies {
    let mut dependencies = Dependencies::new();
    collect(expression, &mut dependencies);
    dependencies
}

fn collect(expression: &Expression, dependencies: &mut Dependencies) {
    match expression {
        Expression::Integer(_) | Expression::Boolean(_) | Expression::Invalid => {}
        Expression::Identifier(name) | Expression::LastIdentifier(name) => {
            if !dependencies.contains(name) {
                dependencies.push(name.clone());
            }
        }
        Expression::Binary { left, right, .. } => {
            collect(left, dependencies);
            collect(right, dependencies);
        }
        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect(condition, dependencies);
            collect(then_branch, dependencies);
            collect(else_branch, dependencies);
        }
    }
}

/// Whether `name` appears anywhere in `expression`, without building the set.
pub fn depends_on(expression: &Expression, name: &str) -> bool {
    match expression {
        Expression::Integer(_) | Expression::Boolean(_) | Expression::Invalid => false,
        Expression::Identifier(identifier) | Expression::LastIdentifier(identifier) => identifier == name,
        Expression::Binary { left, right, .. } => depends_on(left, name) || depends_on(right, name),
        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => depends_on(condition, name) || depends_on(then_branch, name) || depends_on(else_branch, name),
    }
}
