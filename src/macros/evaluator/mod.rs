//! Lazy macro evaluation.
//!
//! A [`MacroEvaluator`] expands one expression of a tape into a stream of values, pulled one at a
//! time with [`MacroEvaluator::expand_next`]. Containers are entered and left explicitly, so a
//! caller that skips a container never pays for expanding its contents.

mod environment;
mod expansion;
mod session;

use std::rc::Rc;

use tracing::debug;

pub use environment::Environment;
pub use session::{Produced, Session};

use self::session::{FrameId, Step};
use crate::config::EvaluatorOptions;
use crate::macros::expression::Expression;
use crate::macros::table::MacroTable;
use crate::model::{Element, ElementData, IonType, SymbolToken, Value};
use crate::{err_help, err_msg, IonError, IonResult};

/// The payload of an expanded value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandedData {
    Scalar(Value),
    /// A container the caller may step into.
    Container(IonType),
}

/// One value produced by an expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedValue {
    /// Set when the value is a struct field.
    pub field_name: Option<SymbolToken>,
    pub annotations: Vec<SymbolToken>,
    pub data: ExpandedData,
}

impl ExpandedValue {
    pub fn ion_type(&self) -> IonType {
        match &self.data {
            ExpandedData::Scalar(value) => value.ion_type(),
            ExpandedData::Container(ion_type) => *ion_type,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match &self.data {
            ExpandedData::Scalar(value) => Some(value),
            ExpandedData::Container(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ContainerLevel {
    /// `None` for the top level.
    ion_type: Option<IonType>,
    frame: FrameId,
}

/// Pull-based evaluator over a compiled tape.
pub struct MacroEvaluator {
    session: Session,
    levels: Vec<ContainerLevel>,
    current: Option<Produced>,
    current_value: Option<ExpandedValue>,
    poisoned: bool,
}

impl MacroEvaluator {
    pub fn new(table: Rc<dyn MacroTable>, options: &EvaluatorOptions) -> Self {
        Self {
            session: Session::new(table, options),
            levels: Vec::new(),
            current: None,
            current_value: None,
            poisoned: false,
        }
    }

    /// Starts expanding the expression at `tape[index]`, discarding any expansion in progress.
    pub fn init_expansion(&mut self, tape: Rc<[Expression]>, index: usize) -> IonResult<()> {
        let Some(expression) = tape.get(index) else {
            return Err(err_msg!(
                Encoding,
                "expression index {} is outside a tape of {} expressions",
                index,
                tape.len()
            ));
        };
        let end = expression.end_at(index);
        self.session.reset();
        self.levels.clear();
        self.current = None;
        self.current_value = None;
        self.poisoned = false;

        let env = Rc::clone(&self.session.empty_env);
        let root = self.session.stream_frame(tape, index, end, env);
        self.levels.push(ContainerLevel { ion_type: None, frame: root });
        debug!(index, end, "initialised macro expansion");
        Ok(())
    }

    /// Produces the next value at the current depth, or `None` at the end of the container.
    pub fn expand_next(&mut self) -> IonResult<Option<&ExpandedValue>> {
        if self.poisoned {
            return Err(err_help!(
                Encoding,
                "the evaluator hit its step limit",
                "call init_expansion to start a new expansion"
            ));
        }
        let Some(level) = self.levels.last().copied() else {
            return Ok(None);
        };
        self.current = None;
        self.current_value = None;

        let in_struct = level.ion_type == Some(IonType::Struct);
        let mut field_name = None;
        loop {
            let step = match self.session.produce_next(level.frame) {
                Ok(step) => step,
                Err(e) => {
                    if matches!(e, IonError::StepLimitExceeded { .. }) {
                        self.poisoned = true;
                    }
                    return Err(e);
                }
            };
            match step {
                Step::FieldName(name) => {
                    if !in_struct {
                        return Err(err_msg!(Encoding, "field name '{}' produced outside a struct", name));
                    }
                    field_name = Some(name);
                }
                Step::Value(produced) => {
                    if in_struct && field_name.is_none() {
                        return Err(err_msg!(
                            Encoding,
                            "a {} was produced in a struct without a field name",
                            produced.ion_type()
                        ));
                    }
                    let data = match &produced {
                        Produced::Scalar { value, .. } => ExpandedData::Scalar(value.clone()),
                        Produced::Container { ion_type, .. } => ExpandedData::Container(*ion_type),
                    };
                    let value = ExpandedValue {
                        field_name: field_name.take(),
                        annotations: produced.annotations().to_vec(),
                        data,
                    };
                    self.current = Some(produced);
                    return Ok(Some(&*self.current_value.insert(value)));
                }
                Step::End => {
                    if let Some(name) = field_name {
                        return Err(err_msg!(Encoding, "field '{}' has no value", name));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Enters the container most recently returned by [`expand_next`](Self::expand_next).
    pub fn step_in(&mut self) -> IonResult<()> {
        let Some(Produced::Container {
            ion_type,
            tape,
            start,
            end,
            env,
            ..
        }) = self.current.take()
        else {
            return Err(err_msg!(Encoding, "step_in requires the evaluator to be positioned on a container"));
        };
        let frame = self.session.stream_frame(tape, start, end, env);
        self.levels.push(ContainerLevel {
            ion_type: Some(ion_type),
            frame,
        });
        self.current_value = None;
        Ok(())
    }

    /// Leaves the current container, skipping whatever it has not yet produced.
    pub fn step_out(&mut self) -> IonResult<()> {
        if self.levels.len() <= 1 {
            return Err(err_msg!(Encoding, "cannot step out of the top level"));
        }
        if let Some(level) = self.levels.pop() {
            self.session.close(level.frame);
        }
        self.current = None;
        self.current_value = None;
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn current(&self) -> Option<&ExpandedValue> {
        self.current_value.as_ref()
    }

    /// Evaluation steps taken since the last `init_expansion`.
    pub fn steps(&self) -> usize {
        self.session.steps()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Materialises everything left at the current depth.
    pub fn expand_all(&mut self) -> IonResult<Vec<Element>> {
        let base = self.levels.len();
        let mut open: Vec<OpenContainer> = Vec::new();
        let mut elements = Vec::new();
        loop {
            let Some(value) = self.expand_next()?.cloned() else {
                // The level `expand_all` started at is exhausted.
                let Some(container) = open.pop() else {
                    break;
                };
                self.step_out()?;
                let (name, element) = container.finish();
                match open.last_mut() {
                    Some(parent) => parent.children.push((name, element)),
                    None => elements.push(element),
                }
                continue;
            };
            let ExpandedValue {
                field_name,
                annotations,
                data,
            } = value;
            match data {
                ExpandedData::Scalar(scalar) => {
                    let element = Element {
                        annotations,
                        data: ElementData::Scalar(scalar),
                    };
                    match open.last_mut() {
                        Some(parent) => parent.children.push((field_name, element)),
                        None => elements.push(element),
                    }
                }
                ExpandedData::Container(ion_type) => {
                    self.step_in()?;
                    open.push(OpenContainer {
                        field_name,
                        annotations,
                        ion_type,
                        children: Vec::new(),
                    });
                }
            }
        }
        debug_assert_eq!(self.levels.len(), base);
        Ok(elements)
    }
}

/// A container `expand_all` has entered but not yet finished.
struct OpenContainer {
    field_name: Option<SymbolToken>,
    annotations: Vec<SymbolToken>,
    ion_type: IonType,
    children: Vec<(Option<SymbolToken>, Element)>,
}

impl OpenContainer {
    fn finish(self) -> (Option<SymbolToken>, Element) {
        let data = match self.ion_type {
            IonType::Struct => ElementData::Struct(
                self.children
                    .into_iter()
                    .map(|(name, element)| (name.unwrap_or(SymbolToken::Sid(0)), element))
                    .collect(),
            ),
            IonType::SExp => ElementData::SExp(self.children.into_iter().map(|(_, e)| e).collect()),
            _ => ElementData::List(self.children.into_iter().map(|(_, e)| e).collect()),
        };
        (
            self.field_name,
            Element {
                annotations: self.annotations,
                data,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{MutableMacroTable, SystemMacro, TapeBuilder};

    fn evaluator() -> MacroEvaluator {
        MacroEvaluator::new(Rc::new(MutableMacroTable::new()), &EvaluatorOptions::default())
    }

    #[test]
    fn containers_expand_only_when_entered() {
        let tape = TapeBuilder::new()
            .container(IonType::List, Vec::new())
            .value(Value::int(1))
            .value(Value::int(2))
            .end()
            .build();
        let mut evaluator = evaluator();
        evaluator.init_expansion(tape, 0).unwrap();
        let list = evaluator.expand_next().unwrap().cloned().unwrap();
        assert_eq!(list.data, ExpandedData::Container(IonType::List));
        evaluator.step_in().unwrap();
        assert_eq!(evaluator.depth(), 1);
        let first = evaluator.expand_next().unwrap().cloned().unwrap();
        assert_eq!(first.as_scalar(), Some(&Value::int(1)));
        evaluator.step_out().unwrap();
        assert!(evaluator.expand_next().unwrap().is_none());
        assert!(evaluator.step_out().is_err());
    }

    #[test]
    fn step_in_on_a_scalar_fails() {
        let tape = TapeBuilder::new().value(Value::int(1)).build();
        let mut evaluator = evaluator();
        evaluator.init_expansion(tape, 0).unwrap();
        evaluator.expand_next().unwrap();
        assert!(evaluator.step_in().is_err());
    }

    #[test]
    fn field_names_outside_structs_are_rejected() {
        let table = MutableMacroTable::new();
        let tape = TapeBuilder::new()
            .invoke(table.system(SystemMacro::MakeField))
            .value(Value::string("a"))
            .value(Value::int(1))
            .end()
            .build();
        let mut evaluator = evaluator();
        evaluator.init_expansion(tape, 0).unwrap();
        // make_field produces a struct; its single field is fine inside it.
        let elements = evaluator.expand_all().unwrap();
        assert_eq!(elements, vec![Element::structure([("a", Element::int(1))])]);

        let tape = TapeBuilder::new()
            .invoke(table.system(SystemMacro::PrivateMakeFieldNameAndValue))
            .value(Value::string("a"))
            .value(Value::int(1))
            .end()
            .build();
        evaluator.init_expansion(tape, 0).unwrap();
        assert!(evaluator.expand_next().is_err());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let tape = TapeBuilder::new().value(Value::int(1)).build();
        assert!(evaluator().init_expansion(tape, 3).is_err());
    }
}
