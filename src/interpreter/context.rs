//! Evaluation contexts.
//!
//! A [`Context`] is one frame of name bindings linked to the frame it was
//! opened from. Frames opened inside an object resolve instance members after
//! their own variables. Every chain shares one [`ThreadState`] carrying the
//! evaluation settings, the atomic-section flag and the quantifier deadline.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::diagnostics::Span;
use crate::settings::{EvaluationSettings, Settings};
use crate::syntax::Name;
use crate::typechecker::types::Type;

use super::pattern::Bindings;
use super::updatable::UpdatableValue;
use super::value::{ObjectRef, Value};

/// Debugger and coverage callbacks, invoked before each node is evaluated
pub trait EvalHooks: Send + Sync + fmt::Debug {
    fn visited(&self, _span: &Span) {}

    fn check_breakpoint(&self, _span: &Span, _ctx: &Context<'_>) {}
}

/// Time source for `time` and for quantifier deadlines
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    /// Value of the `time` expression
    fn time(&self) -> u64;
}

/// Wall clock; `time` counts milliseconds since creation
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn time(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// State shared by all frames of one evaluation thread
#[derive(Debug)]
pub struct ThreadState {
    pub id: u64,
    settings: EvaluationSettings,
    quantifier_timeout: Option<Duration>,
    hooks: Option<Arc<dyn EvalHooks>>,
    clock: Arc<dyn Clock>,
    atomic_depth: AtomicUsize,
    pending: Mutex<Vec<UpdatableValue>>,
    deadline: Mutex<Option<Instant>>,
}

impl ThreadState {
    pub fn new(settings: &Settings) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            settings: settings.evaluation.clone(),
            quantifier_timeout: settings.quantifier_timeout(),
            hooks: None,
            clock: Arc::new(SystemClock::new()),
            atomic_depth: AtomicUsize::new(0),
            pending: Mutex::new(Vec::new()),
            deadline: Mutex::new(None),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn EvalHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &EvaluationSettings {
        &self.settings
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn in_atomic(&self) -> bool {
        self.atomic_depth.load(Ordering::SeqCst) > 0
    }

    /// Defer listener notifications until the returned guard drops
    pub fn begin_atomic(&self) -> AtomicSection<'_> {
        self.atomic_depth.fetch_add(1, Ordering::SeqCst);
        AtomicSection { thread: self }
    }

    pub(crate) fn defer_notification(&self, cell: UpdatableValue) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cell);
    }

    fn flush_notifications(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let mut seen = BTreeSet::new();
        for cell in pending {
            if seen.insert(cell.id()) {
                cell.notify_current();
            }
        }
    }

    /// Arm the quantifier deadline unless an enclosing search already did
    pub fn start_deadline(&self) -> DeadlineGuard<'_> {
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        let owner = deadline.is_none() && self.quantifier_timeout.is_some();
        if owner {
            *deadline = self.quantifier_timeout.map(|t| self.clock.now() + t);
        }
        DeadlineGuard { thread: self, owner }
    }

    pub fn deadline_passed(&self) -> bool {
        match *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(deadline) => self.clock.now() >= deadline,
            None => false,
        }
    }
}

/// Ends an atomic section on drop
#[must_use]
pub struct AtomicSection<'t> {
    thread: &'t ThreadState,
}

impl Drop for AtomicSection<'_> {
    fn drop(&mut self) {
        if self.thread.atomic_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.thread.flush_notifications();
        }
    }
}

/// Disarms the quantifier deadline on drop if it armed it
#[must_use]
pub struct DeadlineGuard<'t> {
    thread: &'t ThreadState,
    owner: bool,
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        if self.owner {
            *self.thread.deadline.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}

/// What a frame is attached to
#[derive(Debug, Clone)]
pub enum ContextKind {
    Root,
    Plain,
    /// Frame of an instance member; members of the object are in scope
    Object(ObjectRef),
    /// Frame of a static member of the named class
    Static(String),
}

/// One frame of the evaluation chain
#[derive(Debug)]
pub struct Context<'a> {
    pub title: String,
    pub span: Span,
    pub kind: ContextKind,
    vars: HashMap<String, Value>,
    old: HashMap<String, Value>,
    outer: Option<&'a Context<'a>>,
    thread: Arc<ThreadState>,
}

impl<'a> Context<'a> {
    /// A root frame for a new thread
    pub fn new(title: impl Into<String>, thread: Arc<ThreadState>) -> Self {
        Self {
            title: title.into(),
            span: Span::default(),
            kind: ContextKind::Root,
            vars: HashMap::new(),
            old: HashMap::new(),
            outer: None,
            thread,
        }
    }

    /// A root frame with default hooks and clock
    pub fn with_settings(title: impl Into<String>, settings: &Settings) -> Self {
        Self::new(title, Arc::new(ThreadState::new(settings)))
    }

    fn frame(&self, title: String, kind: ContextKind) -> Context<'_> {
        Context {
            title,
            span: self.span.clone(),
            kind,
            vars: HashMap::new(),
            old: HashMap::new(),
            outer: Some(self),
            thread: Arc::clone(&self.thread),
        }
    }

    pub fn child(&self, title: impl Into<String>) -> Context<'_> {
        self.frame(title.into(), ContextKind::Plain)
    }

    pub fn object_child(&self, title: impl Into<String>, object: ObjectRef) -> Context<'_> {
        self.frame(title.into(), ContextKind::Object(object))
    }

    pub fn static_child(&self, title: impl Into<String>, class: impl Into<String>) -> Context<'_> {
        self.frame(title.into(), ContextKind::Static(class.into()))
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn define_all(&mut self, bindings: Bindings) {
        for (name, value) in bindings {
            self.vars.insert(name, value);
        }
    }

    /// Bind a type parameter of a polymorphic call
    pub fn define_type_param(&mut self, name: &str, ty: Type) {
        self.vars.insert(format!("@{}", name), Value::Parameter(ty));
    }

    pub fn lookup_type_param(&self, name: &str) -> Option<Type> {
        match self.lookup(&format!("@{}", name)) {
            Some(Value::Parameter(ty)) => Some(ty),
            _ => None,
        }
    }

    /// Resolve a name through the chain; object members are visible from
    /// frames attached to the object
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut ctx = Some(self);
        while let Some(frame) = ctx {
            if let Some(value) = frame.vars.get(name) {
                return Some(value.clone());
            }
            if let ContextKind::Object(object) = &frame.kind {
                if let Some(value) = object.member(name) {
                    return Some(value);
                }
            }
            ctx = frame.outer;
        }
        None
    }

    /// Resolve a possibly qualified name; `M`x` is tried before `x`
    pub fn lookup_name(&self, name: &Name) -> Option<Value> {
        if name.module.is_some() {
            if let Some(value) = self.lookup(&name.to_string()) {
                return Some(value);
            }
        }
        self.lookup(&name.ident)
    }

    /// The pre-state value of `name`, for `name~` in postconditions
    pub fn lookup_old(&self, name: &str) -> Option<Value> {
        let mut ctx = Some(self);
        while let Some(frame) = ctx {
            if let Some(value) = frame.old.get(name) {
                return Some(value.clone());
            }
            ctx = frame.outer;
        }
        None
    }

    pub fn set_old(&mut self, name: impl Into<String>, value: Value) {
        self.old.insert(name.into(), value);
    }

    /// The nearest enclosing object
    pub fn self_object(&self) -> Option<ObjectRef> {
        let mut ctx = Some(self);
        while let Some(frame) = ctx {
            if let ContextKind::Object(object) = &frame.kind {
                return Some(Arc::clone(object));
            }
            ctx = frame.outer;
        }
        None
    }

    /// The first frame of the chain
    pub fn root(&self) -> &Context<'a> {
        let mut ctx = self;
        while let Some(outer) = ctx.outer {
            ctx = outer;
        }
        ctx
    }

    /// Every plain variable in scope, innermost binding first; used to
    /// capture the free variables of a closure
    pub fn flatten(&self) -> Bindings {
        let mut seen = BTreeSet::new();
        let mut out = Bindings::new();
        let mut ctx = Some(self);
        while let Some(frame) = ctx {
            if matches!(frame.kind, ContextKind::Root) {
                break;
            }
            let mut names: Vec<&String> = frame.vars.keys().collect();
            names.sort();
            for name in names {
                if seen.insert(name.clone()) {
                    out.push(name.clone(), frame.vars[name].clone());
                }
            }
            ctx = frame.outer;
        }
        out
    }

    /// Run the per-node hooks
    pub fn observe(&self, span: &Span) {
        if let Some(hooks) = &self.thread.hooks {
            hooks.visited(span);
            hooks.check_breakpoint(span, self);
        }
    }

    pub fn thread(&self) -> &Arc<ThreadState> {
        &self.thread
    }

    pub fn settings(&self) -> &EvaluationSettings {
        self.thread.settings()
    }

    /// Depth of the chain, counting this frame
    pub fn depth(&self) -> usize {
        1 + self.outer.map_or(0, |outer| outer.depth())
    }
}
