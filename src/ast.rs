//! All the different types that can appear in the GATE Abstract Syntax Trees.
//! There is very little functionality implemented here, just basic types.
//!
//! The compiler works over three layers, each in its own submodule:
//! - [source]: exactly what was parsed; identifiers are still strings and
//!   every node carries its source [Span].
//! - [typed]: names are resolved to value indices, every binding has a fixed
//!   [Type], and all cross-type adaptations are explicit cast nodes. This
//!   layer is printable back to valid source text.
//! - [exec]: the executable form; registers and call sites are annotated
//!   with their offsets into the persistent register buffer.

use crate::util::Span;
use std::fmt::{self, Display, Formatter};

/// A generic AST node container. This holds the AST node data itself, as well
/// as some metadata (e.g. source span).
#[derive(Clone, Debug, PartialEq)]
pub struct Node<T, M>(pub T, pub M);

impl<T, M> Node<T, M> {
    /// Get the data for this node.
    pub fn value(&self) -> &T {
        &self.0
    }

    /// Get the metadata for this node.
    pub fn metadata(&self) -> &M {
        &self.1
    }
}

/// An alias for the node type that we use most commonly throughout the
/// compiler. Pairs each AST node with the original source that created it.
pub(crate) type SpanNode<T> = Node<T, Span>;

/// The type of a value in a chip body. Chip inputs and outputs are restricted
/// to `Wire` and `Slice`s of `Wire`; `Register` types only arise from the
/// `Register(..)` constructor, and `Tuple` only as a chip's output type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// One logical bit. Occupies one byte at the buffer level.
    Wire,
    /// One bit of clocked state.
    Register,
    /// A fixed-length contiguous bundle. The length is part of the type.
    Slice { element: Box<Type>, size: usize },
    /// The shape of a chip's output: ordered, named, arity >= 1.
    Tuple(TupleType),
}

impl Type {
    pub fn wire_slice(size: usize) -> Self {
        Self::Slice {
            element: Box::new(Self::Wire),
            size,
        }
    }

    pub fn register_slice(size: usize) -> Self {
        Self::Slice {
            element: Box::new(Self::Register),
            size,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire => write!(f, "Wire"),
            Self::Register => write!(f, "Register"),
            Self::Slice { element, size } => {
                write!(f, "{}[{}]", element, size)
            }
            Self::Tuple(tuple) => {
                write!(f, "(")?;
                for (i, (name, ty)) in tuple.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The output type of a chip: an ordered list of named elements, each `Wire`
/// or `Slice<Wire, N>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleType {
    pub elements: Vec<(String, Type)>,
}

/// All types unique to the freshly-parsed AST live here. No name resolution
/// has happened yet: identifiers are plain strings.
pub mod source {
    use super::*;

    /// A parsed and unresolved package.
    #[derive(Clone, Debug, PartialEq)]
    pub struct Package {
        /// Display name, used in diagnostics only
        pub name: String,
        pub chips: Vec<SpanNode<Chip>>,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Chip {
        pub name: SpanNode<String>,
        pub params: Vec<SpanNode<Param>>,
        /// The declared output list; arity >= 1 is enforced by the grammar
        pub outputs: Vec<SpanNode<Param>>,
        pub body: Vec<SpanNode<Stmt>>,
    }

    /// A named input or output. `width` of `None` means a single wire,
    /// `Some(n)` means a slice of `n` wires.
    #[derive(Clone, Debug, PartialEq)]
    pub struct Param {
        pub name: String,
        pub width: Option<usize>,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum Stmt {
        /// `a, b := expr`
        Assign {
            targets: Vec<SpanNode<String>>,
            rhs: SpanNode<Expr>,
        },
        /// `r <- expr`
        RegWrite {
            reg: SpanNode<String>,
            rhs: SpanNode<Expr>,
        },
        /// `return expr, expr`
        Return(Vec<SpanNode<Expr>>),
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum Expr {
        /// A bare identifier
        Ref(String),
        /// `Chip(args...)`
        Call {
            chip: String,
            args: Vec<SpanNode<Expr>>,
        },
        /// `Register()` / `Register(n)`
        NewRegister { width: Option<usize> },
        /// `<- r`
        RegRead(String),
        /// `x[i]` or `x[lo:hi]`; `x[i]` is parsed as `x[i:i+1]`
        SliceIdx {
            value: String,
            begin: usize,
            end: usize,
        },
        /// `[a, b, c]`
        SliceJoin(Vec<SpanNode<Expr>>),
    }
}

/// All types unique to the typed AST live here. Every name has been resolved
/// to an index into the owning chip's value table, every binding has its
/// final type, and the only cross-type adaptations left are explicit casts.
///
/// This layer deliberately carries no spans: all diagnostics are emitted
/// while it is being built, and an executable program can no longer fail.
pub mod typed {
    use super::*;

    /// Index of a binding within its chip's value table.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ValueId(pub usize);

    /// Index of a chip within its package.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ChipId(pub usize);

    #[derive(Clone, Debug, PartialEq)]
    pub struct Package {
        pub name: String,
        pub chips: Vec<Chip>,
    }

    impl Package {
        /// Look up a chip by name.
        pub fn chip_id(&self, name: &str) -> Option<ChipId> {
            self.chips
                .iter()
                .position(|chip| chip.name == name)
                .map(ChipId)
        }

        pub fn chip(&self, id: ChipId) -> &Chip {
            &self.chips[id.0]
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Chip {
        pub name: String,
        /// True only for the implicit `Nand`, which has no body
        pub builtin: bool,
        /// Every binding in the chip, parameters first, then assignment
        /// targets in order of appearance
        pub values: Vec<Value>,
        /// Indices of the parameter bindings, in declared order
        pub params: Vec<ValueId>,
        pub output: TupleType,
        pub body: Vec<Stmt>,
    }

    impl Chip {
        pub fn value(&self, id: ValueId) -> &Value {
            &self.values[id.0]
        }
    }

    /// A named SSA binding local to a chip body. Its type is fixed at
    /// creation.
    #[derive(Clone, Debug, PartialEq)]
    pub struct Value {
        pub ident: String,
        pub ty: Type,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum Stmt {
        Assign { targets: Vec<ValueId>, rhs: Expr },
        RegWrite { reg: ValueId, rhs: Expr },
        Return(Vec<Expr>),
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum Expr {
        Ref(ValueId),
        Call {
            chip: ChipId,
            args: Vec<Expr>,
        },
        /// `Register` for a scalar, `Slice<Register, n>` for `Register(n)`
        NewRegister {
            ty: Type,
        },
        RegRead(ValueId),
        SliceIdx {
            value: ValueId,
            begin: usize,
            end: usize,
        },
        /// All values have been cast to `element`
        SliceJoin {
            element: Type,
            values: Vec<Expr>,
        },
        SliceToWire(Box<Expr>),
        TupleToWire(Box<Expr>),
    }
}

/// The executable form of a package, produced by lowering the typed AST.
/// Value indices become frame slot indices, every register-creation
/// expression knows its byte offset in the persistent buffer, and every call
/// site knows the offset of its callee's register frame.
pub mod exec {
    pub use super::typed::ChipId;

    /// Shape of one entrypoint input or output at the flat-buffer level.
    #[derive(Copy, Clone, Debug, PartialEq)]
    pub enum IoShape {
        /// One byte
        Wire,
        /// `n` contiguous bytes
        Slice(usize),
    }

    impl IoShape {
        pub fn width(self) -> usize {
            match self {
                Self::Wire => 1,
                Self::Slice(size) => size,
            }
        }
    }

    #[derive(Clone, Debug)]
    pub struct Program {
        pub chips: Vec<Chip>,
        pub entry: ChipId,
        /// Bytes of persistent register state the entrypoint transitively
        /// needs
        pub buffer_size: usize,
        pub inputs: Vec<IoShape>,
        pub outputs: Vec<IoShape>,
    }

    impl Program {
        pub fn input_width(&self) -> usize {
            self.inputs.iter().map(|shape| shape.width()).sum()
        }

        pub fn output_width(&self) -> usize {
            self.outputs.iter().map(|shape| shape.width()).sum()
        }
    }

    #[derive(Clone, Debug)]
    pub struct Chip {
        pub name: String,
        pub builtin: bool,
        /// Total number of value slots in a call frame (parameters included)
        pub slots: usize,
        /// Number of parameters; they occupy the first slots of the frame
        pub params: usize,
        pub body: Vec<Stmt>,
    }

    #[derive(Clone, Debug)]
    pub enum Stmt {
        Assign { targets: Vec<usize>, rhs: Expr },
        RegWrite { reg: usize, rhs: Expr },
        Return(Vec<Expr>),
    }

    #[derive(Clone, Debug)]
    pub enum Expr {
        Slot(usize),
        Call {
            chip: ChipId,
            /// Offset of the callee's register frame, relative to the
            /// caller's frame base
            frame: usize,
            args: Vec<Expr>,
        },
        NewRegister {
            /// Offset relative to the owning chip's frame base
            offset: usize,
            width: usize,
            scalar: bool,
        },
        RegRead(usize),
        SliceIdx {
            slot: usize,
            begin: usize,
            end: usize,
        },
        SliceJoin(Vec<Expr>),
        SliceToWire(Box<Expr>),
        TupleToWire(Box<Expr>),
    }
}

// ===== Pretty printing =====
//
// The typed AST prints back to valid source text. Casts are invisible in the
// source language, so they print as their inner expression; reparsing the
// output therefore re-derives the same typed AST.

impl Display for typed::Package {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for chip in &self.chips {
            if chip.builtin {
                continue;
            }
            write_chip(f, self, chip)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_chip(
    f: &mut Formatter<'_>,
    pkg: &typed::Package,
    chip: &typed::Chip,
) -> fmt::Result {
    write!(f, "chip {}(", chip.name)?;
    for (i, param) in chip.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        let value = chip.value(*param);
        write!(f, "{}", value.ident)?;
        if let Type::Slice { size, .. } = value.ty {
            write!(f, "[{}]", size)?;
        }
    }
    write!(f, ") ")?;
    for (i, (name, ty)) in chip.output.elements.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", name)?;
        if let Type::Slice { size, .. } = ty {
            write!(f, "[{}]", size)?;
        }
    }
    writeln!(f, " {{")?;
    for stmt in &chip.body {
        write!(f, "    ")?;
        write_stmt(f, pkg, chip, stmt)?;
        writeln!(f)?;
    }
    writeln!(f, "}}")
}

fn write_stmt(
    f: &mut Formatter<'_>,
    pkg: &typed::Package,
    chip: &typed::Chip,
    stmt: &typed::Stmt,
) -> fmt::Result {
    match stmt {
        typed::Stmt::Assign { targets, rhs } => {
            for (i, target) in targets.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", chip.value(*target).ident)?;
            }
            write!(f, " := ")?;
            write_expr(f, pkg, chip, rhs)
        }
        typed::Stmt::RegWrite { reg, rhs } => {
            write!(f, "{} <- ", chip.value(*reg).ident)?;
            write_expr(f, pkg, chip, rhs)
        }
        typed::Stmt::Return(results) => {
            write!(f, "return ")?;
            for (i, result) in results.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, pkg, chip, result)?;
            }
            Ok(())
        }
    }
}

fn write_expr(
    f: &mut Formatter<'_>,
    pkg: &typed::Package,
    chip: &typed::Chip,
    expr: &typed::Expr,
) -> fmt::Result {
    match expr {
        typed::Expr::Ref(value) => write!(f, "{}", chip.value(*value).ident),
        typed::Expr::Call { chip: callee, args } => {
            write!(f, "{}(", pkg.chip(*callee).name)?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, pkg, chip, arg)?;
            }
            write!(f, ")")
        }
        typed::Expr::NewRegister { ty } => match ty {
            Type::Slice { size, .. } => write!(f, "Register({})", size),
            _ => write!(f, "Register()"),
        },
        typed::Expr::RegRead(value) => {
            write!(f, "<- {}", chip.value(*value).ident)
        }
        typed::Expr::SliceIdx { value, begin, end } => {
            write!(f, "{}[{}:{}]", chip.value(*value).ident, begin, end)
        }
        typed::Expr::SliceJoin { values, .. } => {
            write!(f, "[")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, pkg, chip, value)?;
            }
            write!(f, "]")
        }
        // Casts don't exist in the source language
        typed::Expr::SliceToWire(inner) | typed::Expr::TupleToWire(inner) => {
            write_expr(f, pkg, chip, inner)
        }
    }
}
