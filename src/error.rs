//! All error-related types. Every compile error carries a [Span] pointing at
//! the offending source, and is reported through [WithSource] so it can be
//! rendered with the source line attached.

use crate::util::{self, Span};
use serde::Serialize;
use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;

/// A trait for any error that originates in source code. [SourceError]s rely
/// on having source code present in order to display themselves.
pub trait SourceError: 'static + Send + Sync + Debug + Serialize {
    /// A simple type label for this error, e.g. `"Syntax"` or `"Type"`.
    fn type_label(&self) -> &'static str;

    /// Format this error into a simple message. `spanned_src` is the slice of
    /// the source code that corresponds to this error's [Span]. This needs to
    /// be provided by the caller in order to create a proper error message.
    fn fmt_msg(&self, f: &mut Formatter<'_>, spanned_src: &str) -> fmt::Result;
}

/// Coarse classification of a [CompileError], for callers that dispatch on
/// the kind of failure rather than the exact variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    /// The source text could not be tokenized/parsed
    Parse,
    /// The program is well-formed text but breaks a naming or arity rule
    Semantic,
    /// No legal adaptation exists between the types involved
    Type,
    /// The compile request itself is invalid (e.g. unknown entrypoint)
    Build,
}

/// An error that occurs during compilation of a package. The error will be
/// due to a flaw in the package. This indicates a user error, _not_ an
/// internal compiler error. Compiler bugs will always cause a panic.
#[derive(Clone, Debug, Serialize)]
pub enum CompileError {
    /// Failed to parse the package because of a syntax error. `expected` is
    /// the name of the type of element that was expected where the error
    /// occurred.
    Syntax { expected: &'static str },
    /// Declared two chips with the same name (or redefined `Nand`)
    DuplicateChip { original: Span },
    /// Assigned the same local name twice within one chip body
    DuplicateBinding { original: Span },
    /// Referenced a value name with no earlier binding
    UnknownBinding,
    /// Called a chip that isn't declared earlier in the package
    UnknownChip { name: String },
    /// Wrote to a register name with no earlier binding
    UninitializedRegister,
    /// Read from or wrote to a value that isn't register-typed
    NotARegister,
    /// Indexed a value that isn't slice-typed
    NotASlice,
    /// Slice bounds are empty or exceed the sliced value's size
    SliceOutOfRange { size: usize },
    /// Declared a slice or register bundle of width zero
    EmptySlice,
    /// Wrong number of values on an assignment, call, or return
    ArityMismatch { expected: usize, actual: usize },
    /// No adaptation exists between the two types
    NoCast { from: String, to: String },
    /// An element of a slice literal doesn't match the first element's type
    JoinElementMismatch { expected: String, actual: String },
    /// A register write's value width doesn't match the register's width
    RegisterWidthMismatch { expected: usize, actual: usize },
    /// A chip body with no return statement
    MissingReturn,
    /// A return statement that isn't the final statement of the body
    MisplacedReturn,
    /// The requested entrypoint doesn't name a chip in the package
    UnknownEntrypoint { name: String },
}

impl CompileError {
    /// Which coarse class of failure this is. See [ErrorCategory].
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Syntax { .. } => ErrorCategory::Parse,
            Self::DuplicateChip { .. }
            | Self::DuplicateBinding { .. }
            | Self::UnknownBinding
            | Self::UnknownChip { .. }
            | Self::UninitializedRegister
            | Self::SliceOutOfRange { .. }
            | Self::EmptySlice
            | Self::ArityMismatch { .. }
            | Self::MissingReturn
            | Self::MisplacedReturn => ErrorCategory::Semantic,
            Self::NotARegister
            | Self::NotASlice
            | Self::NoCast { .. }
            | Self::JoinElementMismatch { .. }
            | Self::RegisterWidthMismatch { .. } => ErrorCategory::Type,
            Self::UnknownEntrypoint { .. } => ErrorCategory::Build,
        }
    }
}

impl SourceError for CompileError {
    fn type_label(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Parse => "Syntax",
            ErrorCategory::Semantic => "Validation",
            ErrorCategory::Type => "Type",
            ErrorCategory::Build => "Build",
        }
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>, spanned_src: &str) -> fmt::Result {
        match self {
            // the source span for syntax errors is just the remaining source,
            // so not very helpful
            Self::Syntax { expected } => write!(f, "Expected {}", expected),
            Self::DuplicateChip { original } => write!(
                f,
                "Duplicate declaration of chip `{}`, \
                    originally declared on line {}",
                spanned_src, original.start_line,
            ),
            Self::DuplicateBinding { original } => write!(
                f,
                "Duplicate assignment to local `{}`, \
                    originally bound on line {}",
                spanned_src, original.start_line,
            ),
            Self::UnknownBinding => {
                write!(f, "Reference to unknown value `{}`", spanned_src)
            }
            Self::UnknownChip { name } => {
                write!(f, "Call to unknown chip `{}`", name)
            }
            Self::UninitializedRegister => write!(
                f,
                "Register `{}` was not initialized before this write",
                spanned_src
            ),
            Self::NotARegister => {
                write!(f, "`{}` is not a register", spanned_src)
            }
            Self::NotASlice => write!(f, "`{}` cannot be sliced", spanned_src),
            Self::SliceOutOfRange { size } => write!(
                f,
                "Slice range out of bounds for `{}` (size is {})",
                spanned_src, size
            ),
            Self::EmptySlice => {
                write!(f, "Slice width must be at least 1 in `{}`", spanned_src)
            }
            Self::ArityMismatch { expected, actual } => write!(
                f,
                "Expected {} value(s) here, but got {}",
                expected, actual
            ),
            Self::NoCast { from, to } => write!(
                f,
                "No conversion from `{}` to `{}` for `{}`",
                from, to, spanned_src
            ),
            Self::JoinElementMismatch { expected, actual } => write!(
                f,
                "Mismatched element in slice literal: expected `{}`, got `{}`",
                expected, actual
            ),
            Self::RegisterWidthMismatch { expected, actual } => write!(
                f,
                "Cannot store {} wire(s) into register `{}` of width {}",
                actual, spanned_src, expected
            ),
            Self::MissingReturn => {
                write!(f, "Chip `{}` has no return statement", spanned_src)
            }
            Self::MisplacedReturn => {
                write!(f, "Return must be the final statement of a chip body")
            }
            Self::UnknownEntrypoint { name } => {
                write!(f, "No chip named `{}` in this package", name)
            }
        }
    }
}

/// A wrapper around a [SourceError], that holds some extra data:
/// - The [Span] of the source code that caused the error
/// - The offending chunk of source code itself
///
/// This type on its own can be formatted, without any external data.
#[derive(Clone, Debug, Error, Serialize)]
pub struct SourceErrorWrapper<E: SourceError> {
    error: E,
    span: Span,
    spanned_source: String,
}

impl<E: SourceError> SourceErrorWrapper<E> {
    pub fn new(error: E, span: Span, src: &str) -> Self {
        Self {
            error,
            span,
            spanned_source: span.get_source_slice(src).into(),
        }
    }
}

impl<E: SourceError> Display for SourceErrorWrapper<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error at {}:{}: ",
            self.error.type_label(),
            self.span.start_line,
            self.span.start_col,
        )?;
        self.error.fmt_msg(f, &self.spanned_source)?;
        Ok(())
    }
}

/// A wrapper around a collection of errors. This holds the errors as well as
/// the source code, and can be used to render associated source code with
/// each error.
#[derive(Clone, Debug, Error, Serialize)]
pub struct WithSource<E: SourceError> {
    errors: Vec<SourceErrorWrapper<E>>,
    #[serde(skip)]
    source_code: String,
}

impl<E: SourceError> WithSource<E> {
    /// Wrap a collection of errors with its source code.
    pub(crate) fn new(
        errors: impl IntoIterator<Item = SourceErrorWrapper<E>>,
        source: String,
    ) -> Self {
        Self {
            errors: errors.into_iter().collect(),
            source_code: source,
        }
    }

    /// Get a reference to the errors wrapped by this type.
    pub fn errors(&self) -> &[SourceErrorWrapper<E>] {
        &self.errors
    }
}

impl<E: SourceError> Display for WithSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Write each error, separated by a newline
        for (i, error) in self.errors.iter().enumerate() {
            // Prefix with a newline for all errors but the first
            if i > 0 {
                writeln!(f)?; // just a newline
            }

            write!(f, "{}", error)?;
            if f.alternate() {
                util::fmt_src_highlights(f, &error.span, &self.source_code)?;
            }
        }
        Ok(())
    }
}
