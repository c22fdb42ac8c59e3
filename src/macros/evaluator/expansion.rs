//! Per-kind expansion semantics.
//!
//! Every kind implements one method: advance the frame once, given the event of the frame it
//! last pulled, and return a [`Transition`]. `Continue` means the frame only changed its own
//! state, for example by tearing down a delegate or tail-calling into another frame.

use std::rc::Rc;

use bigdecimal::num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use super::environment::Environment;
use super::session::{
    Condition, ExpansionKind, FrameId, FrameState, Gathering, Produced, Session, Step, Transition,
};
use crate::macros::expression::Expression;
use crate::macros::system::SystemMacro;
use crate::macros::types::{Cardinality, Macro};
use crate::model::{Decimal, Int, IonType, SymbolToken, Timestamp, Value};
use crate::{err_msg, IonResult};

impl Session {
    /// Advances frame `id` once. `input` is the event of the frame it last pulled, if any.
    pub(crate) fn step(&mut self, id: FrameId, input: Option<Step>) -> IonResult<Transition> {
        if self.frames[id].reached_end {
            return Ok(Transition::Emit(Step::End));
        }
        match self.frames[id].kind {
            ExpansionKind::Uninitialized => Err(err_msg!(Internal, "expanded a closed frame ({})", id)),
            ExpansionKind::Empty => {
                self.frames[id].reached_end = true;
                Ok(Transition::Emit(Step::End))
            }
            ExpansionKind::Stream => self.step_stream(id, input),
            ExpansionKind::Variable { cardinality, parameter } => {
                self.step_counted(id, input, cardinality, Some(parameter))
            }
            ExpansionKind::ExactlyOneValueStream => self.step_counted(id, input, Cardinality::One, None),
            ExpansionKind::SideEffect => {
                self.frames[id].reached_end = true;
                Ok(Transition::Emit(match self.side_effect.take() {
                    Some(produced) => Step::Value(produced),
                    None => Step::End,
                }))
            }
            ExpansionKind::If(condition) => self.step_if(id, input, condition),
            ExpansionKind::Derived(system) => self.step_derived(id, input, system),
            ExpansionKind::Flatten { structs } => self.step_flatten(id, input, structs),
            ExpansionKind::Repeat => self.step_repeat(id, input),
            ExpansionKind::Delta => self.step_delta(id, input),
            ExpansionKind::MakeFieldNameAndValue => self.step_make_field_name_and_value(id, input),
        }
    }

    /// Relays the events of the frame's delegate `child`, tearing it down when it ends.
    fn forward(&mut self, id: FrameId, child: FrameId, input: Option<Step>) -> Transition {
        match input {
            None => Transition::Pull(child),
            Some(Step::End) => {
                self.frames[id].child = None;
                self.close(child);
                Transition::Continue
            }
            Some(step) => Transition::Emit(step),
        }
    }

    /// Hands the rest of the frame's expansion to `child`. When nothing follows it, the frame
    /// becomes `child` instead of waiting on it.
    fn delegate(&mut self, id: FrameId, child: FrameId, last: bool) -> Transition {
        if last {
            self.tail_call(id, child);
            Transition::Continue
        } else {
            self.frames[id].child = Some(child);
            Transition::Pull(child)
        }
    }

    // ========================================================================
    // STREAMS
    // ========================================================================

    pub(crate) fn stream_frame(&mut self, tape: Rc<[Expression]>, start: usize, end: usize, env: Rc<Environment>) -> FrameId {
        self.get_stream_expander(ExpansionKind::Stream, env, tape, start, end)
    }

    fn step_stream(&mut self, id: FrameId, input: Option<Step>) -> IonResult<Transition> {
        if let Some(child) = self.frames[id].child {
            return Ok(self.forward(id, child, input));
        }
        let frame = &self.frames[id];
        let index = frame.cursor;
        if index >= frame.end {
            self.frames[id].reached_end = true;
            return Ok(Transition::Emit(Step::End));
        }
        let tape = Rc::clone(&frame.tape);
        let env = Rc::clone(&frame.env);
        let expression = &tape[index];
        let next = expression.end_at(index);
        let last = next >= frame.end;
        self.frames[id].cursor = next;

        match expression {
            Expression::Value { annotations, value } => Ok(Transition::Emit(Step::Value(Produced::Scalar {
                annotations: annotations.clone(),
                value: value.clone(),
            }))),
            Expression::FieldName(name) => Ok(Transition::Emit(Step::FieldName(name.clone()))),
            Expression::Container {
                annotations,
                ion_type,
                self_index,
                end,
            } => Ok(Transition::Emit(Step::Value(Produced::Container {
                annotations: annotations.clone(),
                ion_type: *ion_type,
                tape: Rc::clone(&tape),
                start: self_index + 1,
                end: *end,
                env,
            }))),
            Expression::Variable(parameter) => {
                let child = self.variable_frame(&env, *parameter)?;
                Ok(self.delegate(id, child, last))
            }
            Expression::MacroInvocation {
                invoked,
                self_index,
                end,
            } => {
                let child = self.invocation_frame(Rc::clone(invoked), &tape, *self_index, *end, env)?;
                Ok(self.delegate(id, child, last))
            }
            Expression::EExpression {
                macro_ref,
                self_index,
                end,
            } => {
                let invoked = self
                    .table
                    .get(macro_ref)
                    .ok_or_else(|| err_msg!(Expansion, "unknown macro '{}'", macro_ref).at(*self_index))?;
                let child = self.invocation_frame(invoked, &tape, *self_index, *end, env)?;
                Ok(self.delegate(id, child, last))
            }
            Expression::ExpressionGroup { self_index, end } => {
                let child = self.stream_frame(Rc::clone(&tape), self_index + 1, *end, env);
                Ok(self.delegate(id, child, last))
            }
        }
    }

    /// A stream over the argument bound to `parameter`, evaluated in the caller's environment.
    pub(crate) fn argument_stream(&mut self, env: &Rc<Environment>, parameter: usize) -> IonResult<FrameId> {
        let (start, end) = env.argument_range(parameter)?;
        let caller = env.parent.clone().unwrap_or_else(|| Rc::clone(&self.empty_env));
        Ok(self.stream_frame(Rc::clone(&env.arguments), start, end, caller))
    }

    /// Expands a variable reference, checking its cardinality as values stream past.
    fn variable_frame(&mut self, env: &Rc<Environment>, parameter: usize) -> IonResult<FrameId> {
        let cardinality = env
            .parameter(parameter)
            .map(|p| p.cardinality)
            .ok_or_else(|| err_msg!(Expansion, "variable {} is not bound in '{}'", parameter, env.macro_name()))?;
        let source = self.argument_stream(env, parameter)?;
        if cardinality == Cardinality::Any {
            return Ok(source);
        }
        let id = self.get_expander(ExpansionKind::Variable { cardinality, parameter }, Rc::clone(env), 0, 0);
        self.frames[id].child = Some(source);
        self.frames[id].state = FrameState::Count(0);
        Ok(id)
    }

    fn step_counted(
        &mut self,
        id: FrameId,
        input: Option<Step>,
        cardinality: Cardinality,
        parameter: Option<usize>,
    ) -> IonResult<Transition> {
        let Some(child) = self.frames[id].child else {
            self.frames[id].reached_end = true;
            return Ok(Transition::Emit(Step::End));
        };
        let Some(step) = input else {
            return Ok(Transition::Pull(child));
        };
        let seen = match self.frames[id].state {
            FrameState::Count(seen) => seen,
            _ => 0,
        };
        match step {
            Step::Value(produced) => {
                let seen = seen + 1;
                if cardinality.max().is_some_and(|max| seen > max) {
                    return Err(self.cardinality_error(id, cardinality, parameter, "more than one"));
                }
                self.frames[id].state = FrameState::Count(seen);
                Ok(Transition::Emit(Step::Value(produced)))
            }
            Step::End => {
                if seen < cardinality.min() {
                    return Err(self.cardinality_error(id, cardinality, parameter, "no"));
                }
                self.frames[id].child = None;
                self.close(child);
                self.frames[id].reached_end = true;
                Ok(Transition::Emit(Step::End))
            }
            step => Ok(Transition::Emit(step)),
        }
    }

    fn cardinality_error(
        &self,
        id: FrameId,
        cardinality: Cardinality,
        parameter: Option<usize>,
        found: &str,
    ) -> crate::IonError {
        let expected = match cardinality {
            Cardinality::One => "exactly one value",
            Cardinality::AtMostOne => "at most one value",
            Cardinality::AtLeastOne => "at least one value",
            Cardinality::Any => "any number of values",
        };
        let env = &self.frames[id].env;
        match parameter.and_then(|p| env.parameter(p)) {
            Some(p) => err_msg!(
                Expansion,
                "parameter '{}' of '{}' expects {}, but its argument produced {} value(s)",
                p.name,
                env.macro_name(),
                expected,
                found
            ),
            None => err_msg!(Expansion, "expected {}, but the stream produced {} value(s)", expected, found),
        }
    }

    // ========================================================================
    // INVOCATIONS
    // ========================================================================

    /// Binds an invocation's arguments and creates the frame that expands it.
    pub(crate) fn invocation_frame(
        &mut self,
        invoked: Rc<Macro>,
        tape: &Rc<[Expression]>,
        self_index: usize,
        end: usize,
        caller: Rc<Environment>,
    ) -> IonResult<FrameId> {
        let env = Environment::for_invocation(Rc::clone(&invoked), tape, self_index, end, caller)?;
        match &*invoked {
            Macro::Template(template) => {
                let body = Rc::clone(&template.body);
                let len = body.len();
                Ok(self.stream_frame(body, 0, len, env))
            }
            Macro::System(system) => self.system_frame(*system, env),
        }
    }

    fn system_frame(&mut self, system: SystemMacro, env: Rc<Environment>) -> IonResult<FrameId> {
        if system.is_template_backed() {
            let body = self.system_body(system)?;
            let len = body.len();
            return Ok(self.stream_frame(body, 0, len, env));
        }
        let kind = match system {
            SystemMacro::None | SystemMacro::Meta => ExpansionKind::Empty,
            SystemMacro::Values => return self.argument_stream(&env, 0),
            SystemMacro::IfNone => ExpansionKind::If(Condition::None),
            SystemMacro::IfSome => ExpansionKind::If(Condition::Some),
            SystemMacro::IfSingle => ExpansionKind::If(Condition::Single),
            SystemMacro::IfMulti => ExpansionKind::If(Condition::Multi),
            SystemMacro::Flatten => ExpansionKind::Flatten { structs: false },
            SystemMacro::PrivateFlattenStruct => ExpansionKind::Flatten { structs: true },
            SystemMacro::Repeat => ExpansionKind::Repeat,
            SystemMacro::Delta => ExpansionKind::Delta,
            SystemMacro::PrivateMakeFieldNameAndValue => ExpansionKind::MakeFieldNameAndValue,
            _ => ExpansionKind::Derived(system),
        };
        let state = match kind {
            ExpansionKind::Flatten { .. } => FrameState::Source(self.argument_stream(&env, 0)?),
            ExpansionKind::Delta => FrameState::Running {
                source: self.argument_stream(&env, 0)?,
                total: BigInt::zero(),
            },
            _ => FrameState::None,
        };
        let id = self.get_expander(kind, env, 0, 0);
        self.frames[id].state = state;
        Ok(id)
    }

    // ========================================================================
    // EAGER ARGUMENT READS
    // ========================================================================

    /// Reads the values of parameters `0..count` before the frame computes its result.
    ///
    /// Each read stops after `cap` values, or when `cap` is `None`, after two values for a
    /// parameter that accepts at most one. Later parameters are not touched until the earlier
    /// ones are read.
    fn gather(&mut self, id: FrameId, mut input: Option<Step>, count: usize, cap: Option<usize>) -> IonResult<Gathered> {
        let mut gathering = match std::mem::take(&mut self.frames[id].state) {
            FrameState::Gathering(gathering) => gathering,
            _ => Gathering::default(),
        };
        loop {
            if let Some(source) = gathering.source {
                let limit = cap.or_else(|| self.read_limit(id, gathering.done.len()));
                let finished = match input.take() {
                    Some(Step::Value(produced)) => {
                        gathering.current.push(produced);
                        limit.is_some_and(|limit| gathering.current.len() >= limit)
                    }
                    Some(Step::End) => true,
                    // Field names carry no argument value.
                    Some(Step::FieldName(_)) | None => false,
                };
                if !finished {
                    self.frames[id].state = FrameState::Gathering(gathering);
                    return Ok(Gathered::Pending(Transition::Pull(source)));
                }
                gathering.source = None;
                self.close(source);
                let values = std::mem::take(&mut gathering.current);
                gathering.done.push(values);
            }
            if gathering.done.len() >= count {
                return Ok(Gathered::Done(gathering.done));
            }
            let env = Rc::clone(&self.frames[id].env);
            gathering.source = Some(self.argument_stream(&env, gathering.done.len())?);
        }
    }

    fn read_limit(&self, id: FrameId, parameter: usize) -> Option<usize> {
        match self.frames[id].env.parameter(parameter)?.cardinality {
            Cardinality::One | Cardinality::AtMostOne => Some(2),
            Cardinality::AtLeastOne | Cardinality::Any => None,
        }
    }

    // ========================================================================
    // SYSTEM MACROS
    // ========================================================================

    fn step_if(&mut self, id: FrameId, input: Option<Step>, condition: Condition) -> IonResult<Transition> {
        // Two values are enough to tell every condition apart.
        let values = match self.gather(id, input, 1, Some(2))? {
            Gathered::Pending(transition) => return Ok(transition),
            Gathered::Done(values) => values,
        };
        let count = values.first().map_or(0, Vec::len);
        let env = Rc::clone(&self.frames[id].env);
        let branch = if condition.holds(count) { 1 } else { 2 };
        let branch = self.argument_stream(&env, branch)?;
        self.tail_call(id, branch);
        Ok(Transition::Continue)
    }

    fn step_derived(&mut self, id: FrameId, input: Option<Step>, system: SystemMacro) -> IonResult<Transition> {
        let env = Rc::clone(&self.frames[id].env);
        let count = env.invoked.as_ref().map_or(0, |m| m.signature().len());
        let values = match self.gather(id, input, count, None)? {
            Gathered::Pending(transition) => return Ok(transition),
            Gathered::Done(values) => values,
        };
        let mut args = Arguments { env: &env, values };
        let produced = match system {
            SystemMacro::Annotate => {
                let mut annotations = Vec::new();
                for produced in args.all(0) {
                    annotations.push(SymbolToken::Text(expect_text(&env, 0, &produced)?.to_string()));
                }
                let mut value = args.exactly_one(1)?;
                annotations.append(value.annotations_mut());
                *value.annotations_mut() = annotations;
                value
            }
            SystemMacro::MakeString | SystemMacro::MakeSymbol => {
                let mut text = String::new();
                for produced in args.all(0) {
                    text.push_str(expect_text(&env, 0, &produced)?);
                }
                let value = if system == SystemMacro::MakeString {
                    Value::String(text)
                } else {
                    Value::Symbol(SymbolToken::Text(text))
                };
                scalar(value)
            }
            SystemMacro::MakeBlob => {
                let mut bytes = Vec::new();
                for produced in args.all(0) {
                    match &produced {
                        Produced::Scalar {
                            value: Value::Blob(lob) | Value::Clob(lob),
                            ..
                        } => bytes.extend_from_slice(lob),
                        other => return Err(type_error(&env, 0, "a blob or clob", other)),
                    }
                }
                scalar(Value::Blob(bytes))
            }
            SystemMacro::MakeDecimal => {
                let coefficient = args.exactly_one(0)?;
                let coefficient = expect_int(&env, 0, &coefficient)?;
                let exponent = args.exactly_one(1)?;
                let exponent = expect_int(&env, 1, &exponent)?
                    .to_i64()
                    .ok_or_else(|| err_msg!(Expansion, "decimal exponent is out of range"))?;
                scalar(Value::Decimal(Decimal::new(Int::from_big(coefficient), exponent)))
            }
            SystemMacro::MakeTimestamp => scalar(Value::Timestamp(make_timestamp(&mut args)?)),
            SystemMacro::Sum => {
                let a = args.exactly_one(0)?;
                let b = args.exactly_one(1)?;
                let total = expect_int(&env, 0, &a)? + expect_int(&env, 1, &b)?;
                scalar(Value::Int(Int::from_big(total)))
            }
            other => return Err(err_msg!(Internal, "'{}' is not a derived-value macro", other)),
        };
        self.frames[id].reached_end = true;
        self.yield_side_effect(produced)
    }

    fn step_flatten(&mut self, id: FrameId, input: Option<Step>, structs: bool) -> IonResult<Transition> {
        if let Some(child) = self.frames[id].child {
            return Ok(self.forward(id, child, input));
        }
        let FrameState::Source(source) = self.frames[id].state else {
            return Err(err_msg!(Internal, "flatten frame has no source stream"));
        };
        let Some(step) = input else {
            return Ok(Transition::Pull(source));
        };
        match step {
            Step::End => {
                self.frames[id].state = FrameState::None;
                self.close(source);
                self.frames[id].reached_end = true;
                Ok(Transition::Emit(Step::End))
            }
            Step::Value(Produced::Container {
                ion_type,
                tape,
                start,
                end,
                env,
                ..
            }) if accepts(structs, ion_type) => {
                let child = self.stream_frame(tape, start, end, env);
                self.frames[id].child = Some(child);
                Ok(Transition::Pull(child))
            }
            Step::Value(Produced::Scalar {
                value: Value::Null(ion_type),
                ..
            }) if accepts(structs, ion_type) => Ok(Transition::Continue),
            Step::Value(other) => {
                let env = Rc::clone(&self.frames[id].env);
                let expected = if structs { "structs" } else { "lists or s-expressions" };
                Err(type_error(&env, 0, expected, &other))
            }
            Step::FieldName(_) => Ok(Transition::Continue),
        }
    }

    fn step_repeat(&mut self, id: FrameId, input: Option<Step>) -> IonResult<Transition> {
        let remaining = match self.frames[id].state {
            FrameState::Remaining(remaining) => remaining,
            _ => {
                let values = match self.gather(id, input, 1, Some(2))? {
                    Gathered::Pending(transition) => return Ok(transition),
                    Gathered::Done(values) => values,
                };
                let env = Rc::clone(&self.frames[id].env);
                let count = Arguments { env: &env, values }.exactly_one(0)?;
                let count = expect_int(&env, 0, &count)?;
                if count.is_negative() {
                    return Err(err_msg!(Expansion, "repeat count must not be negative, found {}", count));
                }
                let count = count
                    .to_u64()
                    .ok_or_else(|| err_msg!(Expansion, "repeat count {} is too large", count))?;
                self.frames[id].state = FrameState::Remaining(count);
                return Ok(Transition::Continue);
            }
        };
        if remaining == 0 {
            self.frames[id].reached_end = true;
            return Ok(Transition::Emit(Step::End));
        }
        let Some(child) = self.frames[id].child else {
            let env = Rc::clone(&self.frames[id].env);
            let child = self.argument_stream(&env, 1)?;
            self.frames[id].child = Some(child);
            return Ok(Transition::Pull(child));
        };
        match input {
            None => Ok(Transition::Pull(child)),
            Some(Step::End) => {
                self.frames[id].child = None;
                self.close(child);
                self.frames[id].state = FrameState::Remaining(remaining - 1);
                Ok(Transition::Continue)
            }
            Some(step) => Ok(Transition::Emit(step)),
        }
    }

    fn step_delta(&mut self, id: FrameId, input: Option<Step>) -> IonResult<Transition> {
        let FrameState::Running { source, .. } = self.frames[id].state else {
            return Err(err_msg!(Internal, "delta frame has no source stream"));
        };
        let Some(step) = input else {
            return Ok(Transition::Pull(source));
        };
        match step {
            Step::End => {
                self.frames[id].state = FrameState::None;
                self.close(source);
                self.frames[id].reached_end = true;
                Ok(Transition::Emit(Step::End))
            }
            Step::Value(produced) => {
                let env = Rc::clone(&self.frames[id].env);
                let delta = expect_int(&env, 0, &produced)?;
                let FrameState::Running { total, .. } = &mut self.frames[id].state else {
                    return Err(err_msg!(Internal, "delta frame lost its running total"));
                };
                *total += delta;
                let value = Value::Int(Int::from_big(total.clone()));
                self.yield_side_effect(scalar(value))
            }
            Step::FieldName(_) => Ok(Transition::Continue),
        }
    }

    fn step_make_field_name_and_value(&mut self, id: FrameId, input: Option<Step>) -> IonResult<Transition> {
        let values = match self.gather(id, input, 1, Some(2))? {
            Gathered::Pending(transition) => return Ok(transition),
            Gathered::Done(values) => values,
        };
        let env = Rc::clone(&self.frames[id].env);
        let name = Arguments { env: &env, values }.exactly_one(0)?;
        let name = match &name {
            Produced::Scalar {
                value: Value::Symbol(symbol),
                ..
            } => symbol.clone(),
            Produced::Scalar {
                value: Value::String(text),
                ..
            } => SymbolToken::Text(text.clone()),
            other => return Err(type_error(&env, 0, "a symbol or string", other)),
        };
        // The value argument is read from the start of its range by a fresh stream.
        let value = self.argument_stream(&env, 1)?;
        let wrapper = self.get_expander(ExpansionKind::ExactlyOneValueStream, Rc::clone(&env), 0, 0);
        self.frames[wrapper].child = Some(value);
        self.frames[wrapper].state = FrameState::Count(0);
        self.tail_call(id, wrapper);
        Ok(Transition::Emit(Step::FieldName(name)))
    }
}

/// Progress of an eager argument read.
enum Gathered {
    Pending(Transition),
    Done(Vec<Vec<Produced>>),
}

/// Eagerly read argument values, indexed by parameter.
struct Arguments<'e> {
    env: &'e Environment,
    values: Vec<Vec<Produced>>,
}

impl Arguments<'_> {
    fn all(&mut self, parameter: usize) -> Vec<Produced> {
        self.values.get_mut(parameter).map(std::mem::take).unwrap_or_default()
    }

    fn exactly_one(&mut self, parameter: usize) -> IonResult<Produced> {
        let mut values = self.all(parameter);
        match values.len() {
            1 => Ok(values.remove(0)),
            n => Err(argument_count_error(self.env, parameter, "exactly one value", n)),
        }
    }

    fn at_most_one(&mut self, parameter: usize) -> IonResult<Option<Produced>> {
        let mut values = self.all(parameter);
        match values.len() {
            0 => Ok(None),
            1 => Ok(Some(values.remove(0))),
            n => Err(argument_count_error(self.env, parameter, "at most one value", n)),
        }
    }
}

fn make_timestamp(args: &mut Arguments<'_>) -> IonResult<Timestamp> {
    let env = args.env;
    let year = args.exactly_one(0)?;
    let year = small_int(env, 0, &year, 1, 9999)?;
    let mut timestamp = Timestamp::with_year(year as u16);
    let mut component = |parameter: usize, max: i64| -> IonResult<Option<u8>> {
        match args.at_most_one(parameter)? {
            Some(produced) => Ok(Some(small_int(env, parameter, &produced, 0, max)? as u8)),
            None => Ok(None),
        }
    };
    timestamp.month = component(1, 12)?;
    timestamp.day = component(2, 31)?;
    timestamp.hour = component(3, 23)?;
    timestamp.minute = component(4, 59)?;

    if let Some(second) = args.at_most_one(5)? {
        match &second {
            Produced::Scalar {
                value: Value::Decimal(decimal),
                ..
            } => {
                let (whole, fraction) = split_seconds(decimal)
                    .ok_or_else(|| err_msg!(Expansion, "timestamp seconds {} are out of range", decimal))?;
                timestamp.second = Some(whole);
                timestamp.fraction = fraction;
            }
            _ => timestamp.second = Some(small_int(env, 5, &second, 0, 59)? as u8),
        }
    }
    if let Some(offset) = args.at_most_one(6)? {
        timestamp.offset_minutes = Some(small_int(env, 6, &offset, -1439, 1439)? as i16);
    }
    timestamp.validate()?;
    Ok(timestamp)
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

fn scalar(value: Value) -> Produced {
    Produced::Scalar {
        annotations: Vec::new(),
        value,
    }
}

fn accepts(structs: bool, ion_type: IonType) -> bool {
    if structs {
        ion_type == IonType::Struct
    } else {
        ion_type.is_sequence()
    }
}

fn parameter_name(env: &Environment, parameter: usize) -> &str {
    env.parameter(parameter).map_or("?", |p| p.name.as_str())
}

fn argument_count_error(env: &Environment, parameter: usize, expected: &str, found: usize) -> crate::IonError {
    let found = if found > 1 { "more than one".to_string() } else { found.to_string() };
    err_msg!(
        Expansion,
        "'{}' expects {} for '{}', found {}",
        env.macro_name(),
        expected,
        parameter_name(env, parameter),
        found
    )
}

fn type_error(env: &Environment, parameter: usize, expected: &str, found: &Produced) -> crate::IonError {
    err_msg!(
        Expansion,
        "'{}' expects {} for '{}', found {}",
        env.macro_name(),
        expected,
        parameter_name(env, parameter),
        found.ion_type()
    )
}

fn expect_text<'p>(env: &Environment, parameter: usize, produced: &'p Produced) -> IonResult<&'p str> {
    match produced {
        Produced::Scalar { value, .. } if !value.is_null() => value
            .as_text()
            .ok_or_else(|| type_error(env, parameter, "text", produced)),
        _ => Err(type_error(env, parameter, "text", produced)),
    }
}

fn expect_int(env: &Environment, parameter: usize, produced: &Produced) -> IonResult<BigInt> {
    match produced {
        Produced::Scalar {
            value: Value::Int(int),
            ..
        } => Ok(int.to_big()),
        _ => Err(type_error(env, parameter, "an int", produced)),
    }
}

fn small_int(env: &Environment, parameter: usize, produced: &Produced, min: i64, max: i64) -> IonResult<i64> {
    let value = expect_int(env, parameter, produced)?;
    match value.to_i64() {
        Some(value) if (min..=max).contains(&value) => Ok(value),
        _ => Err(err_msg!(
            Expansion,
            "'{}' is out of range for '{}': {}",
            parameter_name(env, parameter),
            env.macro_name(),
            value
        )),
    }
}

/// Splits decimal seconds into whole seconds and a fraction `(coefficient, scale)`.
fn split_seconds(decimal: &Decimal) -> Option<(u8, Option<(BigInt, u32)>)> {
    if decimal.is_negative() {
        return None;
    }
    let coefficient = decimal.coefficient.to_big();
    if decimal.exponent > 2 {
        return coefficient.is_zero().then_some((0, None));
    }
    if decimal.exponent >= 0 {
        let whole = coefficient * BigInt::from(10).pow(decimal.exponent as u32);
        let whole = whole.to_u8().filter(|s| *s < 60)?;
        return Some((whole, None));
    }
    let scale = u32::try_from(-decimal.exponent).ok()?;
    let divisor = BigInt::from(10).pow(scale);
    let whole = (&coefficient / &divisor).to_u8().filter(|s| *s < 60)?;
    let fraction = coefficient % divisor;
    Some((whole, Some((fraction, scale))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_split_into_whole_and_fraction() {
        let decimal = Decimal::new(12345i64, -3);
        let (whole, fraction) = split_seconds(&decimal).unwrap();
        assert_eq!(whole, 12);
        assert_eq!(fraction, Some((BigInt::from(345), 3)));
        assert!(split_seconds(&Decimal::new(60i64, 0)).is_none());
        assert!(split_seconds(&Decimal::new(-1i64, 0)).is_none());
    }

    #[test]
    fn conditions() {
        assert!(Condition::None.holds(0));
        assert!(Condition::Some.holds(2));
        assert!(Condition::Single.holds(1));
        assert!(!Condition::Multi.holds(1));
    }
}
