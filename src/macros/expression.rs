//! The flat, range-addressed expression IR shared by template bodies and e-expression tapes.
//!
//! A tape is an `Rc<[Expression]>`. Containers, invocations, and groups do not own their children:
//! they record `self_index` and `end` (exclusive), and their children are the expressions in
//! `self_index + 1 .. end`. Jumping to `end` skips a whole subtree in O(1).

use std::rc::Rc;

use super::table::MacroRef;
use super::types::Macro;
use crate::model::{IonType, SymbolToken, Value};

#[derive(Debug, Clone)]
pub enum Expression {
    /// A scalar with its annotations.
    Value {
        annotations: Vec<SymbolToken>,
        value: Value,
    },
    /// The name of the next field inside a struct's range.
    FieldName(SymbolToken),
    /// A list, s-expression, or struct whose children follow it on the tape.
    Container {
        annotations: Vec<SymbolToken>,
        ion_type: IonType,
        self_index: usize,
        end: usize,
    },
    /// A reference to the parameter at this signature index.
    Variable(usize),
    /// An invocation inside a template body, resolved at compile time.
    MacroInvocation {
        invoked: Rc<Macro>,
        self_index: usize,
        end: usize,
    },
    /// An invocation in an encoded stream, resolved through the macro table at expansion time.
    EExpression {
        macro_ref: MacroRef,
        self_index: usize,
        end: usize,
    },
    /// Zero or more argument expressions passed to one parameter.
    ExpressionGroup { self_index: usize, end: usize },
}

impl Expression {
    pub fn scalar(value: Value) -> Self {
        Expression::Value {
            annotations: Vec::new(),
            value,
        }
    }

    /// `(start_inclusive, end_exclusive)` of this expression's children, if it has any.
    pub fn child_range(&self) -> Option<(usize, usize)> {
        match self {
            Expression::Container { self_index, end, .. }
            | Expression::MacroInvocation { self_index, end, .. }
            | Expression::EExpression { self_index, end, .. }
            | Expression::ExpressionGroup { self_index, end } => Some((self_index + 1, *end)),
            _ => None,
        }
    }

    /// Index just past this expression and all of its children, given its own index.
    pub fn end_at(&self, index: usize) -> usize {
        self.child_range().map_or(index + 1, |(_, end)| end)
    }

    pub(crate) fn set_end(&mut self, new_end: usize) {
        match self {
            Expression::Container { end, .. }
            | Expression::MacroInvocation { end, .. }
            | Expression::EExpression { end, .. }
            | Expression::ExpressionGroup { end, .. } => *end = new_end,
            _ => {}
        }
    }
}

/// Iterates the indices of the direct children in `start..end`.
pub fn direct_children(tape: &[Expression], start: usize, end: usize) -> DirectChildren<'_> {
    DirectChildren {
        tape,
        next: start,
        end,
    }
}

pub struct DirectChildren<'a> {
    tape: &'a [Expression],
    next: usize,
    end: usize,
}

impl Iterator for DirectChildren<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.end {
            return None;
        }
        let index = self.next;
        self.next = self.tape[index].end_at(index);
        Some(index)
    }
}

/// Appends tapes in order, fixing up ranges. Used by callers that build tapes by hand.
#[derive(Debug, Default)]
pub struct TapeBuilder {
    expressions: Vec<Expression>,
    open: Vec<usize>,
}

impl TapeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn value(&mut self, value: Value) -> &mut Self {
        self.expressions.push(Expression::scalar(value));
        self
    }

    pub fn annotated(&mut self, annotations: Vec<SymbolToken>, value: Value) -> &mut Self {
        self.expressions.push(Expression::Value { annotations, value });
        self
    }

    pub fn field_name(&mut self, name: impl Into<SymbolToken>) -> &mut Self {
        self.expressions.push(Expression::FieldName(name.into()));
        self
    }

    pub fn variable(&mut self, index: usize) -> &mut Self {
        self.expressions.push(Expression::Variable(index));
        self
    }

    /// Opens a container; close it with [`TapeBuilder::end`].
    pub fn container(&mut self, ion_type: IonType, annotations: Vec<SymbolToken>) -> &mut Self {
        let self_index = self.expressions.len();
        self.expressions.push(Expression::Container {
            annotations,
            ion_type,
            self_index,
            end: self_index + 1,
        });
        self.open.push(self_index);
        self
    }

    pub fn invoke(&mut self, invoked: Rc<Macro>) -> &mut Self {
        let self_index = self.expressions.len();
        self.expressions.push(Expression::MacroInvocation {
            invoked,
            self_index,
            end: self_index + 1,
        });
        self.open.push(self_index);
        self
    }

    pub fn eexp(&mut self, macro_ref: MacroRef) -> &mut Self {
        let self_index = self.expressions.len();
        self.expressions.push(Expression::EExpression {
            macro_ref,
            self_index,
            end: self_index + 1,
        });
        self.open.push(self_index);
        self
    }

    pub fn group(&mut self) -> &mut Self {
        let self_index = self.expressions.len();
        self.expressions.push(Expression::ExpressionGroup {
            self_index,
            end: self_index + 1,
        });
        self.open.push(self_index);
        self
    }

    /// Closes the most recently opened container, invocation, or group.
    pub fn end(&mut self) -> &mut Self {
        if let Some(index) = self.open.pop() {
            let end = self.expressions.len();
            self.expressions[index].set_end(end);
        }
        self
    }

    pub fn build(&mut self) -> Rc<[Expression]> {
        while !self.open.is_empty() {
            self.end();
        }
        std::mem::take(&mut self.expressions).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_backfills_ranges() {
        let tape = TapeBuilder::new()
            .container(IonType::List, vec![])
            .value(Value::int(1))
            .group()
            .value(Value::int(2))
            .end()
            .value(Value::int(3))
            .end()
            .build();
        assert_eq!(tape[0].child_range(), Some((1, 5)));
        assert_eq!(tape[2].child_range(), Some((3, 4)));
        let children: Vec<usize> = direct_children(&tape, 1, 5).collect();
        assert_eq!(children, vec![1, 2, 4]);
        assert_eq!(tape[2].end_at(2), 4);
    }
}
