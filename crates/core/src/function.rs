//! The function registry: a read-only, host-populated lookup from name to
//! a registered callable, plus the per-call-site context buffer it owns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::environment::Environment;
use crate::expr::Node;
use crate::numeric::Scalar;

/// A function the host makes available to parsed expressions.
///
/// `invoke` receives the argument subtrees unevaluated — it is responsible
/// for calling [`crate::eval::eval`] on whichever arguments it needs, in
/// whatever order and however many times it wishes (this is what lets a
/// host implement things like short-circuiting `assert(cond, msg)` or
/// `print` variadics without the engine knowing about them). `context` is a
/// zero-initialized scratch buffer of `ctxsz` bytes that persists across
/// calls at the same call site in the tree; `cleanup` runs exactly once,
/// when the owning [`Node::Func`] is dropped.
pub type InvokeFn = fn(args: &[Node], context: &mut [u8], env: &mut Environment) -> Scalar;

/// Runs once when a `Func` node's context buffer is about to be freed.
pub type CleanupFn = fn(context: &mut [u8]);

/// A function registered by the host.
pub struct FunctionDescriptor {
    pub name: String,
    pub invoke: InvokeFn,
    /// Size in bytes of the persistent per-call-site context buffer.
    pub ctxsz: usize,
    pub cleanup: Option<CleanupFn>,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("ctxsz", &self.ctxsz)
            .field("cleanup", &self.cleanup.is_some())
            .finish_non_exhaustive()
    }
}

/// A freshly allocated, zero-filled context buffer owned by a `Func` node,
/// with interior mutability so `invoke` can mutate it while the tree is
/// only borrowed immutably during evaluation.
pub struct FuncContext {
    descriptor: Rc<FunctionDescriptor>,
    buf: RefCell<Box<[u8]>>,
}

impl FuncContext {
    #[must_use]
    pub fn new(descriptor: Rc<FunctionDescriptor>) -> Self {
        let buf = vec![0_u8; descriptor.ctxsz].into_boxed_slice();
        Self {
            descriptor,
            buf: RefCell::new(buf),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &Rc<FunctionDescriptor> {
        &self.descriptor
    }

    pub fn invoke(&self, args: &[Node], env: &mut Environment) -> Scalar {
        let mut buf = self.buf.borrow_mut();
        (self.descriptor.invoke)(args, &mut buf, env)
    }
}

impl fmt::Debug for FuncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncContext")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Drop for FuncContext {
    fn drop(&mut self) {
        if let Some(cleanup) = self.descriptor.cleanup {
            cleanup(&mut self.buf.borrow_mut());
        }
    }
}

/// The read-only function table consulted by the parser when an identifier
/// is followed by `(`.
#[derive(Default)]
pub struct FunctionRegistry {
    by_name: AHashMap<String, Rc<FunctionDescriptor>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Rc<FunctionDescriptor>> {
        self.by_name.get(name).cloned()
    }
}

/// Builds a [`FunctionRegistry`] before parsing begins. Registration is not
/// possible once the registry is built — it stays read-only for the rest of
/// the pipeline, so it can never change mid-parse or mid-evaluation.
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    by_name: AHashMap<String, Rc<FunctionDescriptor>>,
}

impl FunctionRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under `name`, overwriting any prior
    /// registration of the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        invoke: InvokeFn,
        ctxsz: usize,
        cleanup: Option<CleanupFn>,
    ) -> &mut Self {
        let name = name.into();
        self.by_name.insert(
            name.clone(),
            Rc::new(FunctionDescriptor {
                name,
                invoke,
                ctxsz,
                cleanup,
            }),
        );
        self
    }

    #[must_use]
    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry { by_name: self.by_name }
    }
}
