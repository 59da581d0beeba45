//! Lowering: the [typed](crate::ast::typed) IR to the executable
//! [exec](crate::ast::exec) form.
//!
//! This stage assigns every register its byte offset in the persistent
//! register buffer and every call site the offset of its callee's frame.
//! Offsets are assigned by a pre-order walk of each chip body (statements in
//! order, a node before its children), so the assignment depends only on the
//! shape of the AST. That makes it stable across runs, which is what lets
//! latched state in a caller-provided buffer survive from tick to tick.
//!
//! A chip's *own* register size is the total width of the `Register(..)`
//! expressions in its body; its *effective* size adds the effective size of
//! every callee, once per call site. Chips can only call chips declared
//! before them, so effective sizes are computed in declaration order.

use crate::{
    ast::{
        exec,
        typed::{self, ChipId},
        Type,
    },
    error::{CompileError, SourceErrorWrapper, WithSource},
    util::Span,
    Compiler,
};

/// Walks one chip body, handing out register-buffer offsets.
struct ChipLowerer<'a> {
    /// Effective sizes of the chips lowered so far, indexed by [ChipId].
    /// Calls always resolve to earlier chips, so the callee is present.
    sizes: &'a [usize],
    /// Next free byte in this chip's register frame
    cursor: usize,
}

impl<'a> ChipLowerer<'a> {
    fn lower_stmt(&mut self, stmt: &typed::Stmt) -> exec::Stmt {
        match stmt {
            typed::Stmt::Assign { targets, rhs } => exec::Stmt::Assign {
                targets: targets.iter().map(|target| target.0).collect(),
                rhs: self.lower_expr(rhs),
            },
            typed::Stmt::RegWrite { reg, rhs } => exec::Stmt::RegWrite {
                reg: reg.0,
                rhs: self.lower_expr(rhs),
            },
            typed::Stmt::Return(results) => exec::Stmt::Return(
                results
                    .iter()
                    .map(|result| self.lower_expr(result))
                    .collect(),
            ),
        }
    }

    fn lower_expr(&mut self, expr: &typed::Expr) -> exec::Expr {
        match expr {
            typed::Expr::Ref(value) => exec::Expr::Slot(value.0),
            typed::Expr::Call { chip, args } => {
                // Pre-order: the call site reserves the callee's whole frame
                // before the arguments are walked
                let frame = self.cursor;
                self.cursor += self.sizes[chip.0];
                let args =
                    args.iter().map(|arg| self.lower_expr(arg)).collect();
                exec::Expr::Call {
                    chip: *chip,
                    frame,
                    args,
                }
            }
            typed::Expr::NewRegister { ty } => {
                let (width, scalar) = match ty {
                    Type::Register => (1, true),
                    Type::Slice { size, .. } => (*size, false),
                    // Register constructors only produce register types
                    _ => unreachable!(),
                };
                let offset = self.cursor;
                self.cursor += width;
                exec::Expr::NewRegister {
                    offset,
                    width,
                    scalar,
                }
            }
            typed::Expr::RegRead(value) => exec::Expr::RegRead(value.0),
            typed::Expr::SliceIdx { value, begin, end } => {
                exec::Expr::SliceIdx {
                    slot: value.0,
                    begin: *begin,
                    end: *end,
                }
            }
            typed::Expr::SliceJoin { values, .. } => exec::Expr::SliceJoin(
                values.iter().map(|value| self.lower_expr(value)).collect(),
            ),
            typed::Expr::SliceToWire(inner) => {
                exec::Expr::SliceToWire(Box::new(self.lower_expr(inner)))
            }
            typed::Expr::TupleToWire(inner) => {
                exec::Expr::TupleToWire(Box::new(self.lower_expr(inner)))
            }
        }
    }
}

/// The buffer-level shape of an entrypoint input or output. Parameters and
/// outputs are restricted to wires and wire slices by the grammar.
fn shape_of(ty: &Type) -> exec::IoShape {
    match ty {
        Type::Wire => exec::IoShape::Wire,
        Type::Slice { size, .. } => exec::IoShape::Slice(*size),
        _ => unreachable!(),
    }
}

fn lower_package(
    pkg: &typed::Package,
    entrypoint: &str,
) -> Result<exec::Program, (CompileError, Span)> {
    let entry: ChipId = pkg.chip_id(entrypoint).ok_or((
        CompileError::UnknownEntrypoint {
            name: entrypoint.into(),
        },
        Span::default(),
    ))?;

    let mut chips = Vec::with_capacity(pkg.chips.len());
    let mut sizes: Vec<usize> = Vec::with_capacity(pkg.chips.len());
    for chip in &pkg.chips {
        let mut lowerer = ChipLowerer {
            sizes: &sizes,
            cursor: 0,
        };
        let body: Vec<_> = chip
            .body
            .iter()
            .map(|stmt| lowerer.lower_stmt(stmt))
            .collect();
        let effective_size = lowerer.cursor;
        chips.push(exec::Chip {
            name: chip.name.clone(),
            builtin: chip.builtin,
            slots: chip.values.len(),
            params: chip.params.len(),
            body,
        });
        sizes.push(effective_size);
    }

    let entry_chip = pkg.chip(entry);
    let inputs = entry_chip
        .params
        .iter()
        .map(|param| shape_of(&entry_chip.value(*param).ty))
        .collect();
    let outputs = entry_chip
        .output
        .elements
        .iter()
        .map(|(_, ty)| shape_of(ty))
        .collect();

    Ok(exec::Program {
        chips,
        entry,
        buffer_size: sizes[entry.0],
        inputs,
        outputs,
    })
}

impl Compiler<typed::Package> {
    /// Lower the typed package to its executable form, resolving the
    /// entrypoint chip.
    pub(crate) fn lower(
        self,
        entrypoint: &str,
    ) -> Result<Compiler<exec::Program>, WithSource<CompileError>> {
        match lower_package(&self.ast, entrypoint) {
            Ok(program) => Ok(Compiler {
                source: self.source,
                package_name: self.package_name,
                ast: program,
            }),
            Err((error, span)) => Err(WithSource::new(
                vec![SourceErrorWrapper::new(error, span, &self.source)],
                self.source,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(src: &str, entrypoint: &str) -> exec::Program {
        Compiler::check(src.into(), "test_pkg")
            .unwrap()
            .lower(entrypoint)
            .unwrap()
            .ast
    }

    const NESTED: &str = "chip Cell(a) res {
    q := Register()
    q <- a
    return <- q
}

chip Pair(a) res {
    x := Cell(a)
    y := Cell(x)
    s := Register(2)
    s <- [x, y]
    t := s[0:1]
    return <- t
}";

    #[test]
    fn test_effective_sizes() {
        // Cell holds one register byte of its own
        assert_eq!(lower(NESTED, "Cell").buffer_size, 1);
        // Pair: two Cell frames plus its own two-byte register
        assert_eq!(lower(NESTED, "Pair").buffer_size, 4);
    }

    #[test]
    fn test_deterministic_offsets() {
        let program = lower(NESTED, "Pair");
        let pair = &program.chips[2];
        match &pair.body[0] {
            exec::Stmt::Assign { rhs, .. } => match rhs {
                exec::Expr::Call { frame, .. } => assert_eq!(*frame, 0),
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
        match &pair.body[1] {
            exec::Stmt::Assign { rhs, .. } => match rhs {
                exec::Expr::Call { frame, .. } => assert_eq!(*frame, 1),
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
        match &pair.body[2] {
            exec::Stmt::Assign { rhs, .. } => match rhs {
                exec::Expr::NewRegister { offset, width, scalar } => {
                    assert_eq!((*offset, *width, *scalar), (2, 2, false));
                }
                other => panic!("expected register, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_shapes() {
        let program = lower(
            "chip F(a[4], b) lo[2], hi {\n    return a[0:2], b\n}",
            "F",
        );
        assert_eq!(
            program.inputs,
            vec![exec::IoShape::Slice(4), exec::IoShape::Wire]
        );
        assert_eq!(
            program.outputs,
            vec![exec::IoShape::Slice(2), exec::IoShape::Wire]
        );
        assert_eq!(program.input_width(), 5);
        assert_eq!(program.output_width(), 3);
        assert_eq!(program.buffer_size, 0);
    }

    #[test]
    fn test_unknown_entrypoint() {
        let error = Compiler::check(
            "chip F(a) res {\n    return a\n}".into(),
            "test_pkg",
        )
        .unwrap()
        .lower("Missing")
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Build error at 0:0: No chip named `Missing` in this package",
        );
    }
}
