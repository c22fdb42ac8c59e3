//! Variable bindings for one macro invocation.

use std::rc::Rc;

use crate::macros::expression::{direct_children, Expression};
use crate::macros::types::{Macro, Parameter};
use crate::{err_msg, IonResult};

/// Binds a macro's parameters to the argument expressions of one invocation.
///
/// The arguments stay on the caller's tape: `argument_indices[i]` is the tape index of the
/// expression passed to parameter `i`, or `None` when a trailing optional argument was elided.
/// Argument expressions are evaluated in `parent`, the environment the invocation appeared in.
#[derive(Debug)]
pub struct Environment {
    pub arguments: Rc<[Expression]>,
    pub argument_indices: Vec<Option<usize>>,
    pub parent: Option<Rc<Environment>>,
    pub invoked: Option<Rc<Macro>>,
}

impl Environment {
    /// The root environment: nothing is bound.
    pub fn empty() -> Rc<Self> {
        Rc::new(Self {
            arguments: Rc::new([]),
            argument_indices: Vec::new(),
            parent: None,
            invoked: None,
        })
    }

    /// Binds the arguments of the invocation at `tape[self_index]`, whose children end at `end`.
    pub fn for_invocation(
        invoked: Rc<Macro>,
        tape: &Rc<[Expression]>,
        self_index: usize,
        end: usize,
        parent: Rc<Environment>,
    ) -> IonResult<Rc<Self>> {
        let parameters = invoked.signature().len();
        let mut argument_indices: Vec<Option<usize>> =
            direct_children(tape, self_index + 1, end).map(Some).collect();
        if argument_indices.len() > parameters {
            return Err(err_msg!(
                Expansion,
                "'{}' takes {} argument(s) but was given {}",
                invoked.name().unwrap_or("<anonymous>"),
                parameters,
                argument_indices.len()
            )
            .at(self_index));
        }
        argument_indices.resize(parameters, None);
        Ok(Rc::new(Self {
            arguments: Rc::clone(tape),
            argument_indices,
            parent: Some(parent),
            invoked: Some(invoked),
        }))
    }

    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.invoked.as_ref().and_then(|m| m.signature().get(index))
    }

    pub fn macro_name(&self) -> &str {
        self.invoked
            .as_ref()
            .and_then(|m| m.name())
            .unwrap_or("<anonymous>")
    }

    /// The `[start, end)` tape range whose expressions make up argument `index`.
    ///
    /// A group contributes its children; any other expression contributes itself.
    pub fn argument_range(&self, index: usize) -> IonResult<(usize, usize)> {
        match self.argument_indices.get(index) {
            None => Err(err_msg!(
                Expansion,
                "variable {} is not bound in '{}'",
                index,
                self.macro_name()
            )),
            Some(None) => Ok((0, 0)),
            Some(Some(at)) => match &self.arguments[*at] {
                Expression::ExpressionGroup { self_index, end } => Ok((self_index + 1, *end)),
                other => Ok((*at, other.end_at(*at))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{SystemMacro, TapeBuilder};
    use crate::model::Value;

    #[test]
    fn arguments_bind_by_position_and_groups_unwrap() {
        let invoked = Rc::new(Macro::System(SystemMacro::Repeat));
        let tape = TapeBuilder::new()
            .invoke(Rc::clone(&invoked))
            .value(Value::int(2))
            .group()
            .value(Value::string("a"))
            .value(Value::string("b"))
            .end()
            .end()
            .build();
        let env = Environment::for_invocation(invoked, &tape, 0, tape.len(), Environment::empty()).unwrap();
        assert_eq!(env.argument_indices, vec![Some(1), Some(2)]);
        assert_eq!(env.argument_range(0).unwrap(), (1, 2));
        assert_eq!(env.argument_range(1).unwrap(), (3, 5));
        assert!(env.argument_range(2).is_err());
    }

    #[test]
    fn elided_trailing_arguments_are_empty() {
        let invoked = Rc::new(Macro::System(SystemMacro::Repeat));
        let tape = TapeBuilder::new()
            .invoke(Rc::clone(&invoked))
            .value(Value::int(2))
            .end()
            .build();
        let env = Environment::for_invocation(invoked, &tape, 0, tape.len(), Environment::empty()).unwrap();
        assert_eq!(env.argument_range(1).unwrap(), (0, 0));
    }

    #[test]
    fn too_many_arguments() {
        let invoked = Rc::new(Macro::System(SystemMacro::None));
        let tape = TapeBuilder::new()
            .invoke(Rc::clone(&invoked))
            .value(Value::int(2))
            .end()
            .build();
        assert!(Environment::for_invocation(invoked, &tape, 0, tape.len(), Environment::empty()).is_err());
    }
}
