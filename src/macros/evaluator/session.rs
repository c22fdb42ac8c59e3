//! Expansion frames, the frame pool, and per-evaluation session state.
//!
//! Frames live in an index-addressed arena. A frame refers to its delegate (`child`) and to any
//! source stream it drains by [`FrameId`], never by reference, so frames can be recycled through
//! the free list without reference counting.
//!
//! Frames never advance each other directly. A frame that needs an event from another frame
//! returns [`Transition::Pull`], and [`Session::produce_next`] steps the pulled frame and hands
//! the event back. Nesting depth therefore costs heap, not call stack.

use std::collections::HashMap;
use std::rc::Rc;

use bigdecimal::num_bigint::BigInt;
use tracing::{debug, trace, warn};

use super::environment::Environment;
use crate::config::EvaluatorOptions;
use crate::macros::expression::Expression;
use crate::macros::system::SystemMacro;
use crate::macros::table::MacroTable;
use crate::macros::types::Cardinality;
use crate::model::{IonType, SymbolToken, Value};
use crate::{err_msg, ErrorContext, IonError, IonResult};

pub(crate) type FrameId = usize;

/// Which expansion semantics a frame runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpansionKind {
    /// Closed and sitting in the pool.
    Uninitialized,
    /// Produces nothing (`none`, `meta`).
    Empty,
    /// Walks `tape[cursor..end]`, delegating to children for variables, invocations, and groups.
    Stream,
    /// Checks the number of values a parameter's argument produces as they stream.
    Variable {
        cardinality: Cardinality,
        parameter: usize,
    },
    /// Fails unless the wrapped stream produces exactly one value.
    ExactlyOneValueStream,
    /// Yields the session's side-effect slot once.
    SideEffect,
    If(Condition),
    /// `annotate`, `make_*` scalar builders and `sum`: compute one value, then end.
    Derived(SystemMacro),
    Flatten {
        structs: bool,
    },
    Repeat,
    Delta,
    MakeFieldNameAndValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Condition {
    None,
    Some,
    Single,
    Multi,
}

impl Condition {
    pub(crate) fn holds(self, count: usize) -> bool {
        match self {
            Condition::None => count == 0,
            Condition::Some => count > 0,
            Condition::Single => count == 1,
            Condition::Multi => count > 1,
        }
    }
}

/// Kind-specific scratch state.
#[derive(Debug, Default)]
pub(crate) enum FrameState {
    #[default]
    None,
    /// Values seen so far.
    Count(usize),
    /// Iterations left.
    Remaining(u64),
    /// A stream being drained one value at a time.
    Source(FrameId),
    /// A stream being drained with a running total.
    Running { source: FrameId, total: BigInt },
    /// Arguments being read eagerly before the frame computes its result.
    Gathering(Gathering),
}

/// Eagerly read argument values, one parameter at a time from parameter 0.
#[derive(Debug, Default)]
pub(crate) struct Gathering {
    /// Values of the parameters read so far.
    pub done: Vec<Vec<Produced>>,
    /// The stream of the parameter being read.
    pub source: Option<FrameId>,
    pub current: Vec<Produced>,
}

#[derive(Debug)]
pub(crate) struct ExpansionFrame {
    pub kind: ExpansionKind,
    pub env: Rc<Environment>,
    pub tape: Rc<[Expression]>,
    pub cursor: usize,
    pub end: usize,
    pub child: Option<FrameId>,
    pub state: FrameState,
    pub reached_end: bool,
    pub keep_alive: bool,
}

/// A value produced by an expansion.
///
/// Containers are not expanded eagerly: they carry the tape range of their children and the
/// environment those children are evaluated in.
#[derive(Debug, Clone)]
pub enum Produced {
    Scalar {
        annotations: Vec<SymbolToken>,
        value: Value,
    },
    Container {
        annotations: Vec<SymbolToken>,
        ion_type: IonType,
        tape: Rc<[Expression]>,
        start: usize,
        end: usize,
        env: Rc<Environment>,
    },
}

impl Produced {
    pub fn ion_type(&self) -> IonType {
        match self {
            Produced::Scalar { value, .. } => value.ion_type(),
            Produced::Container { ion_type, .. } => *ion_type,
        }
    }

    pub fn annotations(&self) -> &[SymbolToken] {
        match self {
            Produced::Scalar { annotations, .. } | Produced::Container { annotations, .. } => annotations,
        }
    }

    pub fn annotations_mut(&mut self) -> &mut Vec<SymbolToken> {
        match self {
            Produced::Scalar { annotations, .. } | Produced::Container { annotations, .. } => annotations,
        }
    }
}

/// An event a frame reports to whoever pulled it.
#[derive(Debug)]
pub(crate) enum Step {
    Value(Produced),
    FieldName(SymbolToken),
    End,
}

/// The result of advancing a frame once.
#[derive(Debug)]
pub(crate) enum Transition {
    /// Report an event to the puller.
    Emit(Step),
    /// Step the given frame and call back with its event.
    Pull(FrameId),
    /// Only the frame's own state changed; step it again.
    Continue,
}

/// State shared by every frame of one evaluation.
pub struct Session {
    pub(crate) frames: Vec<ExpansionFrame>,
    free: Vec<FrameId>,
    steps: usize,
    step_limit: usize,
    pub(crate) table: Rc<dyn MacroTable>,
    pub(crate) side_effect: Option<Produced>,
    pub(crate) side_effect_frame: FrameId,
    system_bodies: HashMap<SystemMacro, Rc<[Expression]>>,
    pub(crate) empty_env: Rc<Environment>,
    pub(crate) empty_tape: Rc<[Expression]>,
    /// Frames from the root of the current `produce_next` down to the frame being stepped.
    path: Vec<FrameId>,
    /// Scratch worklist for `close`.
    closing: Vec<FrameId>,
}

impl Session {
    pub fn new(table: Rc<dyn MacroTable>, options: &EvaluatorOptions) -> Self {
        let empty_env = Environment::empty();
        let empty_tape: Rc<[Expression]> = Rc::new([]);
        let mut session = Self {
            frames: Vec::with_capacity(options.initial_frame_capacity),
            free: Vec::new(),
            steps: 0,
            step_limit: options.step_limit,
            table,
            side_effect: None,
            side_effect_frame: 0,
            system_bodies: HashMap::new(),
            empty_env,
            empty_tape,
            path: Vec::new(),
            closing: Vec::new(),
        };
        let side_effect = session.get_expander(ExpansionKind::SideEffect, session.empty_env.clone(), 0, 0);
        session.frames[side_effect].keep_alive = true;
        session.side_effect_frame = side_effect;
        session
    }

    fn blank_frame(&self) -> ExpansionFrame {
        ExpansionFrame {
            kind: ExpansionKind::Uninitialized,
            env: Rc::clone(&self.empty_env),
            tape: Rc::clone(&self.empty_tape),
            cursor: 0,
            end: 0,
            child: None,
            state: FrameState::None,
            reached_end: false,
            keep_alive: false,
        }
    }

    /// Returns every frame except the side-effect frame to the pool and clears the step counter.
    pub fn reset(&mut self) {
        self.free.clear();
        for id in 0..self.frames.len() {
            if id == self.side_effect_frame {
                self.frames[id].reached_end = false;
                self.frames[id].state = FrameState::None;
                continue;
            }
            self.frames[id] = self.blank_frame();
            self.free.push(id);
        }
        self.steps = 0;
        self.side_effect = None;
        debug!(pooled = self.free.len(), "reset expansion session");
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }

    /// Number of frames ever allocated, pooled or live.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn live_frames(&self) -> usize {
        self.frames.len() - self.free.len()
    }

    pub(crate) fn increment_step_counter(&mut self) -> IonResult<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            warn!(limit = self.step_limit, "macro expansion exceeded the step limit");
            return Err(IonError::StepLimitExceeded {
                limit: self.step_limit,
                ctx: ErrorContext::with_help(
                    "the expansion may be unbounded; raise evaluator.step_limit if it is not",
                ),
            });
        }
        Ok(())
    }

    // ========================================================================
    // FRAME POOL
    // ========================================================================

    /// Takes a frame from the pool (or grows the pool) and initialises it.
    pub(crate) fn get_expander(&mut self, kind: ExpansionKind, env: Rc<Environment>, start: usize, end: usize) -> FrameId {
        let tape = Rc::clone(&self.empty_tape);
        self.get_stream_expander(kind, env, tape, start, end)
    }

    pub(crate) fn get_stream_expander(
        &mut self,
        kind: ExpansionKind,
        env: Rc<Environment>,
        tape: Rc<[Expression]>,
        start: usize,
        end: usize,
    ) -> FrameId {
        let frame = ExpansionFrame {
            kind,
            env,
            tape,
            cursor: start,
            end,
            child: None,
            state: FrameState::None,
            reached_end: false,
            keep_alive: false,
        };
        match self.free.pop() {
            Some(id) => {
                self.frames[id] = frame;
                id
            }
            None => {
                self.frames.push(frame);
                trace!(pool = self.frames.len(), "grew expansion frame pool");
                self.frames.len() - 1
            }
        }
    }

    /// Detaches the frames `id` delegates to: its child and any stream held in its state.
    fn take_delegates(&mut self, id: FrameId) -> [Option<FrameId>; 2] {
        let frame = &mut self.frames[id];
        let source = match std::mem::take(&mut frame.state) {
            FrameState::Source(source) | FrameState::Running { source, .. } => Some(source),
            FrameState::Gathering(gathering) => gathering.source,
            _ => None,
        };
        [frame.child.take(), source]
    }

    /// Closes a frame and everything it delegates to, returning them to the pool.
    ///
    /// A `keep_alive` frame is reset but stays allocated.
    pub(crate) fn close(&mut self, id: FrameId) {
        let mut pending = std::mem::take(&mut self.closing);
        pending.push(id);
        while let Some(id) = pending.pop() {
            if self.frames[id].kind == ExpansionKind::Uninitialized {
                continue;
            }
            pending.extend(self.take_delegates(id).into_iter().flatten());
            if self.frames[id].keep_alive {
                self.frames[id].reached_end = false;
                continue;
            }
            self.frames[id] = self.blank_frame();
            self.free.push(id);
        }
        self.closing = pending;
    }

    /// Replaces `this` with `donor`: closes whatever `this` still delegates to, moves `donor`'s
    /// live state into `this`, and retires `donor` without closing its delegates.
    pub(crate) fn tail_call(&mut self, this: FrameId, donor: FrameId) {
        for delegate in self.take_delegates(this).into_iter().flatten() {
            self.close(delegate);
        }
        let blank = self.blank_frame();
        let mut moved = std::mem::replace(&mut self.frames[donor], blank);
        moved.keep_alive = self.frames[this].keep_alive;
        self.frames[this] = moved;
        self.free.push(donor);
    }

    /// Stores `produced` in the side-effect slot and yields it through the shared frame.
    pub(crate) fn yield_side_effect(&mut self, produced: Produced) -> IonResult<Transition> {
        self.side_effect = Some(produced);
        let frame = self.side_effect_frame;
        let transition = self.step(frame, None)?;
        self.close(frame);
        Ok(transition)
    }

    /// The body of a template-backed system macro, built on first use.
    pub(crate) fn system_body(&mut self, system: SystemMacro) -> IonResult<Rc<[Expression]>> {
        if let Some(body) = self.system_bodies.get(&system) {
            return Ok(Rc::clone(body));
        }
        let body = system.template_body().ok_or_else(|| {
            err_msg!(Internal, "system macro '{}' has no template body", system)
        })?;
        self.system_bodies.insert(system, Rc::clone(&body));
        Ok(body)
    }

    /// Advances `root` until it yields a value, a field name, or the end of its expansion.
    ///
    /// Every frame stepped on the way counts against the step limit.
    pub(crate) fn produce_next(&mut self, root: FrameId) -> IonResult<Step> {
        self.path.clear();
        self.path.push(root);
        let mut input = None;
        loop {
            self.increment_step_counter()?;
            let Some(&top) = self.path.last() else {
                return Err(err_msg!(Internal, "expansion path is empty"));
            };
            match self.step(top, input.take())? {
                Transition::Pull(source) => self.path.push(source),
                Transition::Continue => {}
                Transition::Emit(step) => {
                    self.path.pop();
                    if self.path.is_empty() {
                        return Ok(step);
                    }
                    input = Some(step);
                }
            }
        }
    }
}
