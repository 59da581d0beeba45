//! Compiler and clocked simulator for the GATE hardware description
//! language. A *package* of textual chip definitions is parsed, typechecked,
//! and lowered into a [Kernel]: an executable that performs one clock tick
//! per invocation over caller-owned byte buffers. The only primitive is the
//! builtin `Nand` gate; everything else is composed from it, plus `Register`
//! latches that carry one-bit state from tick to tick.
//!
//! ```
//! use gatec::compile;
//!
//! let source: String = "
//! chip And(a, b) res {
//!     tmp := Nand(a, b)
//!     return Nand(tmp, tmp)
//! }
//! "
//! .into();
//!
//! let kernel = compile(source, "And").unwrap();
//!
//! let mut reg_buf = vec![0; kernel.buffer_size()];
//! let mut out = [0u8; 1];
//! kernel.run(&mut reg_buf, &[1, 1], &mut out);
//! assert_eq!(out, [1]);
//! ```
//!
//! Register state lives in the `reg_buf` byte slice: zero it before the
//! first tick, then hand the same buffer back on every later tick. Each
//! tick's outputs depend only on the inputs and the pre-tick register
//! values; writes scheduled with `<-` become visible on the next tick.

#![deny(clippy::all)]

pub mod ast;
mod consts;
pub mod error;
mod lower;
mod machine;
mod parse;
mod typecheck;
mod util;

pub use machine::{Circuit, Kernel};
pub use util::Span;

use crate::ast::typed;
use error::{CompileError, WithSource};
use std::fmt::Debug;

/// Compile a package and produce a runnable [Kernel] for the named
/// entrypoint chip. This is the whole pipeline in one call; use [Compiler]
/// directly if you need the intermediate representation (e.g. for pretty
/// printing).
pub fn compile(
    source: String,
    entrypoint: &str,
) -> Result<Kernel, WithSource<CompileError>> {
    Compiler::check(source, "main")?.into_kernel(entrypoint)
}

/// Struct used to compile a package. `T` represents the current type of the
/// program. It starts as nothing, and as the compiler executes, the program
/// gets transformed. Stages can only be called in pipeline order, which the
/// type parameter enforces.
#[derive(Debug)]
pub struct Compiler<T: Debug> {
    // These are deliberately private, to prevent direct construction
    source: String,
    package_name: String,
    ast: T,
}

impl Compiler<()> {
    /// Run the front half of the pipeline: parse the source text and
    /// typecheck it into the fully-resolved IR. `package_name` is a display
    /// name carried along for diagnostics.
    pub fn check(
        source: String,
        package_name: &str,
    ) -> Result<Compiler<typed::Package>, WithSource<CompileError>> {
        Ok(Self {
            source,
            package_name: package_name.into(),
            ast: (),
        }
        .debug()
        .parse()?
        .debug()
        .typecheck()?
        .debug())
    }
}

impl Compiler<typed::Package> {
    /// The typed AST of the checked package. [typed::Package] implements
    /// `Display`, printing valid source text.
    pub fn package(&self) -> &typed::Package {
        &self.ast
    }

    /// Finish the pipeline: lower the package and wrap the executable form
    /// in a [Kernel]. Fails if `entrypoint` doesn't name a chip.
    pub fn into_kernel(
        self,
        entrypoint: &str,
    ) -> Result<Kernel, WithSource<CompileError>> {
        Ok(Kernel::new(self.lower(entrypoint)?.debug().ast))
    }
}

impl<T: Debug> Compiler<T> {
    /// Print out the current state of this compiler, if debug mode is
    /// enabled. Takes in self and returns the same value, so that this can
    /// be used in the function call chain.
    fn debug(self) -> Self {
        crate::debug!(println!("{:?}", &self));
        self
    }
}
