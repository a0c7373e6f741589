//! Constant-folding table
//!
//! Maps a binary operator to the function that folds it when both operands are
//! literals. An entry only fires when its operand predicates hold; otherwise the
//! expression is left for the runtime.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::ast::{make_bool, make_num, Node, FALSE, TRUE};
use crate::error::CompileError;

macro_rules! table {
    ($table_name: ident => $($name: literal, ($left: ident, $right: ident) => ($a: ident, $b: ident) $body: block)*) => {
        pub fn $table_name() -> Vec<FoldingEntry> {
            vec![$(FoldingEntry {
                operator: $name,
                predicates: [Node::$left, Node::$right],
                fold: {
                    #[allow(unused_variables)]
                    fn f($a: &Node, $b: &Node) -> Option<Node> $body
                    f
                },
            }),*]
        }
    };
}

table! {
    arithmetic_folding_table =>
        "+", (is_constant, is_constant) => (a, b) {
            match (a, b) {
                (Node::Num(x), Node::Num(y)) => Some(make_num(x + y)),
                (Node::Str(x), Node::Str(y)) => Some(Node::Str(format!("{}{}", x, y))),
                _ => None,
            }
        }

        "-", (is_number, is_number) => (a, b) {
            Some(make_num(a.number()? - b.number()?))
        }

        "*", (is_number, is_number) => (a, b) {
            Some(make_num(a.number()? * b.number()?))
        }

        "/", (is_number, is_number) => (a, b) {
            Some(make_num(a.number()? / b.number()?))
        }

        "%", (is_number, is_number) => (a, b) {
            Some(make_num(a.number()? % b.number()?))
        }
}

table! {
    comparison_folding_table =>
        "<", (is_constant, is_constant) => (a, b) {
            compare(a, b).map(|ordering| make_bool(ordering.is_lt()))
        }

        ">", (is_constant, is_constant) => (a, b) {
            compare(a, b).map(|ordering| make_bool(ordering.is_gt()))
        }

        "<=", (is_constant, is_constant) => (a, b) {
            compare(a, b).map(|ordering| make_bool(ordering.is_le()))
        }

        ">=", (is_constant, is_constant) => (a, b) {
            compare(a, b).map(|ordering| make_bool(ordering.is_ge()))
        }

        "==", (is_constant, is_constant) => (a, b) {
            if a.kind() != b.kind() {
                return Some(FALSE);
            }
            Some(make_bool(a == b))
        }

        "!=", (is_constant, is_constant) => (a, b) {
            if a.kind() != b.kind() {
                return Some(TRUE);
            }
            Some(make_bool(a != b))
        }
}

table! {
    logical_folding_table =>
        "&&", (is_constant, is_constant) => (a, b) {
            match a.is_truthy_constant()? {
                true => Some(b.clone()),
                false => Some(FALSE),
            }
        }

        "||", (is_constant, is_constant) => (a, b) {
            match a.is_truthy_constant()? {
                true => Some(a.clone()),
                false => Some(b.clone()),
            }
        }
}

fn compare(a: &Node, b: &Node) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Node::Num(x), Node::Num(y)) => x.partial_cmp(y),
        (Node::Str(x), Node::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub struct FoldingEntry {
    pub operator: &'static str,
    pub predicates: [fn(&Node) -> bool; 2],
    pub fold: fn(&Node, &Node) -> Option<Node>,
}

impl Node {
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Num(_))
    }

    fn number(&self) -> Option<f64> {
        match self {
            Self::Num(x) => Some(*x),
            _ => None,
        }
    }
}

pub static BINARY_FOLDING_TABLE: Lazy<HashMap<&'static str, FoldingEntry>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for entry in arithmetic_folding_table()
        .into_iter()
        .chain(comparison_folding_table())
        .chain(logical_folding_table())
    {
        table.insert(entry.operator, entry);
    }
    table
});

/// Folds `left operator right` when both sides are literals.
///
/// Returns `Ok(None)` when the operator is unknown or the operands do not have the
/// kinds the operator folds over. Division or modulo by a literal zero is rejected.
pub fn fold_binary(operator: &str, left: &Node, right: &Node) -> Result<Option<Node>, CompileError> {
    if !left.is_constant() || !right.is_constant() {
        return Ok(None);
    }

    let Some(entry) = BINARY_FOLDING_TABLE.get(operator) else {
        return Ok(None);
    };

    let [left_ok, right_ok] = entry.predicates;
    if !left_ok(left) || !right_ok(right) {
        return Ok(None);
    }

    if matches!(operator, "/" | "%") && right.number() == Some(0.0) {
        return Err(CompileError::Arithmetic {
            operator: operator.to_owned(),
            expression: format!("{} {} {}", left, operator, right),
        });
    }

    Ok((entry.fold)(left, right))
}
