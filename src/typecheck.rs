//! Typechecking: the unresolved [source](crate::ast::source) AST to the
//! [typed](crate::ast::typed) IR.
//!
//! This pass resolves every identifier against a per-chip symbol table,
//! fixes the type of every binding (assignment targets adopt the component
//! types of their right-hand side), and makes every cross-type adaptation
//! explicit. The only adaptations that exist are `Slice<Wire,1> -> Wire`,
//! one-element-tuple -> `Wire`, and identity; anything else is a type error.

use crate::{
    ast::{
        source,
        typed::{self, ChipId, ValueId},
        SpanNode, TupleType, Type,
    },
    consts::NAND_CHIP_NAME,
    error::{CompileError, SourceErrorWrapper, WithSource},
    util::Span,
    Compiler,
};
use std::collections::HashMap;

/// The builtin NAND gate: `Nand(a: Wire, b: Wire) -> (res: Wire)`. Added
/// before any user chip so calls to it resolve; it has no body.
fn nand_chip() -> typed::Chip {
    typed::Chip {
        name: NAND_CHIP_NAME.into(),
        builtin: true,
        values: vec![
            typed::Value {
                ident: "a".into(),
                ty: Type::Wire,
            },
            typed::Value {
                ident: "b".into(),
                ty: Type::Wire,
            },
        ],
        params: vec![ValueId(0), ValueId(1)],
        output: TupleType {
            elements: vec![("res".into(), Type::Wire)],
        },
        body: vec![],
    }
}

/// The type declared by a parameter or output: a single wire, or a slice of
/// wires of the given width.
fn param_type(param: &SpanNode<source::Param>) -> Result<Type, Error> {
    match param.value().width {
        None => Ok(Type::Wire),
        Some(0) => Err((CompileError::EmptySlice, *param.metadata())),
        Some(width) => Ok(Type::wire_slice(width)),
    }
}

type Error = (CompileError, Span);

/// Typechecking state for a single chip body.
struct ChipChecker<'a> {
    /// Chips checked so far; calls resolve against this
    pkg: &'a typed::Package,
    values: Vec<typed::Value>,
    /// name -> (binding, span where it was introduced)
    symbols: HashMap<String, (ValueId, Span)>,
}

impl<'a> ChipChecker<'a> {
    fn check(
        pkg: &'a typed::Package,
        chip: &source::Chip,
    ) -> Result<typed::Chip, Error> {
        let mut checker = Self {
            pkg,
            values: Vec::new(),
            symbols: HashMap::new(),
        };

        // Parameters populate the symbol table first
        let mut params = Vec::with_capacity(chip.params.len());
        for param in &chip.params {
            let ty = param_type(param)?;
            params.push(checker.define(
                param.value().name.clone(),
                ty,
                *param.metadata(),
            )?);
        }

        let mut output_elements = Vec::with_capacity(chip.outputs.len());
        for output in &chip.outputs {
            let ty = param_type(output)?;
            output_elements.push((output.value().name.clone(), ty));
        }
        let output = TupleType {
            elements: output_elements,
        };

        // Exactly one return, and it has to be the last statement
        match chip.body.iter().position(|stmt| {
            matches!(stmt.value(), source::Stmt::Return(_))
        }) {
            None => {
                return Err((
                    CompileError::MissingReturn,
                    *chip.name.metadata(),
                ))
            }
            Some(at) if at + 1 != chip.body.len() => {
                return Err((
                    CompileError::MisplacedReturn,
                    *chip.body[at].metadata(),
                ))
            }
            Some(_) => {}
        }

        let mut body = Vec::with_capacity(chip.body.len());
        for stmt in &chip.body {
            body.push(checker.check_stmt(stmt, &output)?);
        }

        Ok(typed::Chip {
            name: chip.name.value().clone(),
            builtin: false,
            values: checker.values,
            params,
            output,
            body,
        })
    }

    /// Introduce a new binding, failing if the name is already taken.
    fn define(
        &mut self,
        ident: String,
        ty: Type,
        span: Span,
    ) -> Result<ValueId, Error> {
        if let Some((_, original)) = self.symbols.get(&ident) {
            return Err((
                CompileError::DuplicateBinding {
                    original: *original,
                },
                span,
            ));
        }
        let id = ValueId(self.values.len());
        self.values.push(typed::Value { ident: ident.clone(), ty });
        self.symbols.insert(ident, (id, span));
        Ok(id)
    }

    /// Resolve a name to a binding introduced earlier in the body.
    fn resolve(&self, ident: &str, span: Span) -> Result<ValueId, Error> {
        self.symbols
            .get(ident)
            .map(|(id, _)| *id)
            .ok_or((CompileError::UnknownBinding, span))
    }

    fn value_type(&self, id: ValueId) -> &Type {
        &self.values[id.0].ty
    }

    fn check_stmt(
        &mut self,
        stmt: &SpanNode<source::Stmt>,
        output: &TupleType,
    ) -> Result<typed::Stmt, Error> {
        let stmt_span = *stmt.metadata();
        match stmt.value() {
            source::Stmt::Assign { targets, rhs } => {
                // The RHS is resolved first: targets only come into scope
                // after this statement
                let (rhs, rhs_ty) = self.check_expr(rhs)?;

                // Targets adopt the component types of the RHS
                let target_types: Vec<Type> = match rhs_ty {
                    Type::Tuple(tuple) => {
                        if targets.len() != tuple.elements.len() {
                            return Err((
                                CompileError::ArityMismatch {
                                    expected: tuple.elements.len(),
                                    actual: targets.len(),
                                },
                                stmt_span,
                            ));
                        }
                        tuple.elements.into_iter().map(|(_, ty)| ty).collect()
                    }
                    ty => {
                        if targets.len() != 1 {
                            return Err((
                                CompileError::ArityMismatch {
                                    expected: 1,
                                    actual: targets.len(),
                                },
                                stmt_span,
                            ));
                        }
                        vec![ty]
                    }
                };

                let mut target_ids = Vec::with_capacity(targets.len());
                for (target, ty) in targets.iter().zip(target_types) {
                    target_ids.push(self.define(
                        target.value().clone(),
                        ty,
                        *target.metadata(),
                    )?);
                }
                Ok(typed::Stmt::Assign {
                    targets: target_ids,
                    rhs,
                })
            }

            source::Stmt::RegWrite { reg, rhs } => {
                let reg_span = *reg.metadata();
                let rhs_span = *rhs.metadata();
                let reg_id = match self.symbols.get(reg.value()) {
                    Some((id, _)) => *id,
                    None => {
                        return Err((
                            CompileError::UninitializedRegister,
                            reg_span,
                        ))
                    }
                };
                let (rhs, rhs_ty) = self.check_expr(rhs)?;
                let rhs = match self.value_type(reg_id).clone() {
                    Type::Register => {
                        self.adapt(rhs, &rhs_ty, &Type::Wire, rhs_span)?
                    }
                    Type::Slice { element, size }
                        if *element == Type::Register =>
                    {
                        match rhs_ty {
                            Type::Slice {
                                element: ref elem,
                                size: actual,
                            } if **elem == Type::Wire && actual == size => rhs,
                            Type::Slice { size: actual, .. } => {
                                return Err((
                                    CompileError::RegisterWidthMismatch {
                                        expected: size,
                                        actual,
                                    },
                                    rhs_span,
                                ))
                            }
                            Type::Wire => {
                                return Err((
                                    CompileError::RegisterWidthMismatch {
                                        expected: size,
                                        actual: 1,
                                    },
                                    rhs_span,
                                ))
                            }
                            other => {
                                return Err(no_cast(
                                    &other,
                                    &Type::wire_slice(size),
                                    rhs_span,
                                ))
                            }
                        }
                    }
                    _ => {
                        return Err((CompileError::NotARegister, reg_span))
                    }
                };
                Ok(typed::Stmt::RegWrite { reg: reg_id, rhs })
            }

            source::Stmt::Return(results) => {
                if results.len() != output.elements.len() {
                    return Err((
                        CompileError::ArityMismatch {
                            expected: output.elements.len(),
                            actual: results.len(),
                        },
                        stmt_span,
                    ));
                }
                let mut typed_results = Vec::with_capacity(results.len());
                for (result, (_, want)) in
                    results.iter().zip(&output.elements)
                {
                    let result_span = *result.metadata();
                    let (expr, ty) = self.check_expr(result)?;
                    typed_results
                        .push(self.adapt(expr, &ty, want, result_span)?);
                }
                Ok(typed::Stmt::Return(typed_results))
            }
        }
    }

    fn check_expr(
        &self,
        expr: &SpanNode<source::Expr>,
    ) -> Result<(typed::Expr, Type), Error> {
        let span = *expr.metadata();
        match expr.value() {
            source::Expr::Ref(ident) => {
                let id = self.resolve(ident, span)?;
                Ok((typed::Expr::Ref(id), self.value_type(id).clone()))
            }

            source::Expr::Call { chip, args } => {
                let chip_id: ChipId = self.pkg.chip_id(chip).ok_or_else(|| {
                    (
                        CompileError::UnknownChip {
                            name: chip.clone(),
                        },
                        span,
                    )
                })?;
                let callee = self.pkg.chip(chip_id);
                if args.len() != callee.params.len() {
                    return Err((
                        CompileError::ArityMismatch {
                            expected: callee.params.len(),
                            actual: args.len(),
                        },
                        span,
                    ));
                }

                let param_types: Vec<Type> = callee
                    .params
                    .iter()
                    .map(|param| callee.value(*param).ty.clone())
                    .collect();
                let output = callee.output.clone();

                let mut typed_args = Vec::with_capacity(args.len());
                for (arg, want) in args.iter().zip(&param_types) {
                    let arg_span = *arg.metadata();
                    let (typed_arg, ty) = self.check_expr(arg)?;
                    typed_args
                        .push(self.adapt(typed_arg, &ty, want, arg_span)?);
                }
                Ok((
                    typed::Expr::Call {
                        chip: chip_id,
                        args: typed_args,
                    },
                    Type::Tuple(output),
                ))
            }

            source::Expr::NewRegister { width } => {
                let ty = match width {
                    None => Type::Register,
                    Some(0) => {
                        return Err((CompileError::EmptySlice, span))
                    }
                    Some(width) => Type::register_slice(*width),
                };
                Ok((typed::Expr::NewRegister { ty: ty.clone() }, ty))
            }

            source::Expr::RegRead(ident) => {
                let id = self.resolve(ident, span)?;
                let ty = match self.value_type(id) {
                    Type::Register => Type::Wire,
                    Type::Slice { element, size }
                        if **element == Type::Register =>
                    {
                        Type::wire_slice(*size)
                    }
                    _ => return Err((CompileError::NotARegister, span)),
                };
                Ok((typed::Expr::RegRead(id), ty))
            }

            source::Expr::SliceIdx { value, begin, end } => {
                let id = self.resolve(value, span)?;
                let (element, size) = match self.value_type(id) {
                    Type::Slice { element, size } => {
                        (element.as_ref().clone(), *size)
                    }
                    _ => return Err((CompileError::NotASlice, span)),
                };
                if *begin >= *end || *end > size {
                    return Err((
                        CompileError::SliceOutOfRange { size },
                        span,
                    ));
                }
                Ok((
                    typed::Expr::SliceIdx {
                        value: id,
                        begin: *begin,
                        end: *end,
                    },
                    Type::Slice {
                        element: Box::new(element),
                        size: end - begin,
                    },
                ))
            }

            source::Expr::SliceJoin(elements) => {
                // Every element is adapted to the scalar form of the first
                // element's type; in practice that is always Wire, since
                // register handles and wide slices have no scalar form.
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    let element_span = *element.metadata();
                    let (value, ty) = self.check_expr(element)?;
                    let value = self
                        .adapt(value, &ty, &Type::Wire, element_span)
                        .map_err(|_| {
                            (
                                CompileError::JoinElementMismatch {
                                    expected: Type::Wire.to_string(),
                                    actual: ty.to_string(),
                                },
                                element_span,
                            )
                        })?;
                    values.push(value);
                }
                let size = values.len();
                Ok((
                    typed::Expr::SliceJoin {
                        element: Type::Wire,
                        values,
                    },
                    Type::wire_slice(size),
                ))
            }
        }
    }

    /// Wrap `expr` with the unique cast that adapts it from type `from` to
    /// type `to`. Identity adaptations are elided; if no adaptation exists,
    /// this is a type error.
    fn adapt(
        &self,
        expr: typed::Expr,
        from: &Type,
        to: &Type,
        span: Span,
    ) -> Result<typed::Expr, Error> {
        if from == to {
            return Ok(expr);
        }
        if *to == Type::Wire {
            match from {
                Type::Slice { element, size }
                    if **element == Type::Wire && *size == 1 =>
                {
                    return Ok(typed::Expr::SliceToWire(Box::new(expr)))
                }
                Type::Tuple(tuple)
                    if tuple.elements.len() == 1
                        && tuple.elements[0].1 == Type::Wire =>
                {
                    return Ok(typed::Expr::TupleToWire(Box::new(expr)))
                }
                _ => {}
            }
        }
        Err(no_cast(from, to, span))
    }
}

fn no_cast(from: &Type, to: &Type, span: Span) -> Error {
    (
        CompileError::NoCast {
            from: from.to_string(),
            to: to.to_string(),
        },
        span,
    )
}

/// Check a whole package. Chips are checked in declaration order and can only
/// call chips declared before them, which keeps the call graph acyclic by
/// construction. A chip whose body fails to check still contributes its
/// declared signature, so later chips produce their own errors instead of a
/// cascade of unknown-chip noise.
fn check_package(
    src_pkg: &source::Package,
) -> Result<typed::Package, Vec<Error>> {
    let mut errors: Vec<Error> = Vec::new();
    let mut pkg = typed::Package {
        name: src_pkg.name.clone(),
        chips: vec![nand_chip()],
    };
    let mut declared: HashMap<&str, Span> = HashMap::new();
    declared.insert(NAND_CHIP_NAME, Span::default());

    for chip_node in &src_pkg.chips {
        let chip = chip_node.value();
        let name: &str = chip.name.value();
        if let Some(original) = declared.get(name) {
            errors.push((
                CompileError::DuplicateChip {
                    original: *original,
                },
                *chip.name.metadata(),
            ));
            continue;
        }
        declared.insert(name, *chip.name.metadata());

        match ChipChecker::check(&pkg, chip) {
            Ok(typed_chip) => pkg.chips.push(typed_chip),
            Err(error) => {
                errors.push(error);
                // Keep the declared signature around so later chips can
                // still resolve calls to this one
                pkg.chips.push(signature_only(chip));
            }
        }
    }

    if errors.is_empty() {
        Ok(pkg)
    } else {
        Err(errors)
    }
}

/// A body-less stand-in for a chip whose body failed to check.
fn signature_only(chip: &source::Chip) -> typed::Chip {
    let mut values = Vec::new();
    let mut params = Vec::new();
    for param in &chip.params {
        params.push(ValueId(values.len()));
        values.push(typed::Value {
            ident: param.value().name.clone(),
            ty: param_type(param).unwrap_or(Type::Wire),
        });
    }
    let output = TupleType {
        elements: chip
            .outputs
            .iter()
            .map(|output| {
                (
                    output.value().name.clone(),
                    param_type(output).unwrap_or(Type::Wire),
                )
            })
            .collect(),
    };
    typed::Chip {
        name: chip.name.value().clone(),
        builtin: false,
        values,
        params,
        output,
        body: vec![],
    }
}

impl Compiler<source::Package> {
    /// Resolve names and types, and insert explicit casts. If any errors
    /// occur, `Err` is returned with all the independent errors collected.
    pub(crate) fn typecheck(
        self,
    ) -> Result<Compiler<typed::Package>, WithSource<CompileError>> {
        match check_package(&self.ast) {
            Ok(pkg) => Ok(Compiler {
                source: self.source,
                package_name: self.package_name,
                ast: pkg,
            }),
            Err(errors) => {
                let errors: Vec<_> = errors
                    .into_iter()
                    .map(|(error, span)| {
                        SourceErrorWrapper::new(error, span, &self.source)
                    })
                    .collect();
                Err(WithSource::new(errors, self.source))
            }
        }
    }
}
