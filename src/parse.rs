//! Parsing: source text to the unresolved [source](crate::ast::source) AST.
//!
//! Tokens are whitespace-separated and whitespace is otherwise insignificant.
//! Statement disambiguation between `x := ...` and `x <- ...` is speculative:
//! the assignment form is tried first and the parser backtracks to the
//! register-write form if it fails. `alt` restores both the input position
//! and the line/column state on backtrack, since the whole cursor is copied.

use crate::{
    ast::{
        source::{Chip, Expr, Package, Param, Stmt},
        Node, SpanNode,
    },
    consts::{CHIP_KEYWORD, REGISTER_KEYWORD, RETURN_KEYWORD},
    error::{CompileError, SourceErrorWrapper, WithSource},
    util::{RawSpan, Span},
    Compiler,
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{digit1, multispace0},
    combinator::{cut, map, map_res, not, opt},
    error::{context, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{pair, preceded, terminated},
    IResult, Offset, Slice,
};

type ParseResult<'a, T> = IResult<RawSpan<'a>, T, VerboseError<RawSpan<'a>>>;

/// A trait for parsing into AST nodes. Any AST node that can be parsed from
/// the source should implement this trait.
trait Parse<'a>: Sized {
    /// Attempt to parse the input into the AST node. This does NOT parse any
    /// surrounding whitespace, just the minimum amount of the input to
    /// complete the node.
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self>;

    /// Attempt to parse the input into the AST node, and include source span
    /// metadata as well.
    fn parse_node(input: RawSpan<'a>) -> ParseResult<'a, SpanNode<Self>> {
        let new_input = input; // need to copy so we can compare old pos vs new
        let (i, value) = Self::parse(new_input)?;

        let index = input.offset(&i);
        let raw_span = input.slice(..index);

        Ok((i, Node(value, Span::from_raw_span(&raw_span))))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Consume any leading whitespace (including newlines), then run the parser.
fn sp<'a, O, F>(parser: F) -> impl FnMut(RawSpan<'a>) -> ParseResult<'a, O>
where
    F: FnMut(RawSpan<'a>) -> ParseResult<'a, O>,
{
    preceded(multispace0, parser)
}

/// Parse a keyword, making sure it isn't just the prefix of a longer
/// identifier (`Register1` is an identifier, not the `Register` keyword).
fn keyword<'a>(
    word: &'static str,
) -> impl FnMut(RawSpan<'a>) -> ParseResult<'a, RawSpan<'a>> {
    terminated(tag(word), not(take_while1(is_ident_char)))
}

// Identifiers: start with a letter or underscore, continue with letters,
// digits, or underscores. Deliberately without a context label: the callers
// know better what the identifier would have been (a chip name, a statement,
// an output), so the label is attached there.
impl<'a> Parse<'a> for String {
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self> {
        map_res(take_while1(is_ident_char), |s: RawSpan| {
            let frag = *s.fragment();
            // take_while1 can't tell the first char apart from the rest, so
            // reject leading digits here
            if frag.starts_with(|c: char| c.is_ascii_digit()) {
                Err(())
            } else {
                Ok(frag.to_string())
            }
        })(input)
    }
}

// Unsigned base-10 integers (slice bounds and register widths)
impl<'a> Parse<'a> for usize {
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self> {
        context(
            "number",
            map_res(digit1, |s: RawSpan| {
                s.fragment().parse::<usize>().map_err(|_| ())
            }),
        )(input)
    }
}

// A parameter or output declaration: `name` or `name[width]`
impl<'a> Parse<'a> for Param {
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self> {
        let (i, name) = String::parse(input)?;
        let (i, width) = opt(preceded(
            sp(tag("[")),
            cut(terminated(sp(usize::parse), sp(context("`]`", tag("]"))))),
        ))(i)?;
        Ok((i, Param { name, width }))
    }
}

impl<'a> Parse<'a> for Expr {
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self> {
        context(
            "expression",
            alt((
                reg_read_expr,
                slice_join_expr,
                new_register_expr,
                call_expr,
                slice_idx_expr,
                // has to go last, everything else starting with an
                // identifier has been ruled out by now
                map(String::parse, Expr::Ref),
            )),
        )(input)
    }
}

impl<'a> Parse<'a> for Stmt {
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self> {
        context(
            "statement",
            alt((return_stmt, assign_stmt, reg_write_stmt)),
        )(input)
    }
}

impl<'a> Parse<'a> for Chip {
    fn parse(input: RawSpan<'a>) -> ParseResult<'a, Self> {
        let (i, _) = context("chip declaration", keyword(CHIP_KEYWORD))(input)?;
        // Once we've seen the `chip` keyword there is no backtracking out
        let (i, name) = cut(sp(context("chip name", String::parse_node)))(i)?;
        let (i, _) = cut(sp(context("`(`", tag("("))))(i)?;
        let (i, params) =
            cut(separated_list0(sp(tag(",")), sp(Param::parse_node)))(i)?;
        let (i, _) = cut(sp(context("`)`", tag(")"))))(i)?;
        let (i, outputs) = cut(separated_list1(
            sp(tag(",")),
            sp(context("output list", Param::parse_node)),
        ))(i)?;
        let (i, body) = cut(chip_body)(i)?;
        Ok((
            i,
            Chip {
                name,
                params,
                outputs,
                body,
            },
        ))
    }
}

// ===== Expressions =====

/// `<- r`: read the register bound to `r`
fn reg_read_expr(input: RawSpan) -> ParseResult<'_, Expr> {
    map(
        preceded(tag("<-"), cut(sp(context("register name", String::parse)))),
        Expr::RegRead,
    )(input)
}

/// `[e, e, ...]`: join the elements into one slice
fn slice_join_expr(input: RawSpan) -> ParseResult<'_, Expr> {
    map(
        preceded(
            tag("["),
            cut(terminated(expr_list, sp(context("`]`", tag("]"))))),
        ),
        Expr::SliceJoin,
    )(input)
}

/// `Register()` / `Register(n)`: create a fresh scalar or slice register
fn new_register_expr(input: RawSpan) -> ParseResult<'_, Expr> {
    let (i, _) = keyword(REGISTER_KEYWORD)(input)?;
    let (i, width) = cut(preceded(
        sp(context("`(`", tag("("))),
        terminated(opt(sp(usize::parse)), sp(context("`)`", tag(")")))),
    ))(i)?;
    Ok((i, Expr::NewRegister { width }))
}

/// `Chip(args...)`
fn call_expr(input: RawSpan) -> ParseResult<'_, Expr> {
    let (i, chip) = String::parse(input)?;
    // No cut yet: a bare `(` decides this is a call, anything before that
    // backtracks to the other identifier-led expressions
    let (i, _) = sp(tag("("))(i)?;
    let (i, args) = cut(terminated(
        separated_list0(sp(tag(",")), sp(Expr::parse_node)),
        sp(context("`)`", tag(")"))),
    ))(i)?;
    Ok((i, Expr::Call { chip, args }))
}

/// `x[i]` or `x[lo:hi]`. The single-index form is sugar for `x[i:i+1]`.
fn slice_idx_expr(input: RawSpan) -> ParseResult<'_, Expr> {
    let (i, value) = String::parse(input)?;
    let (i, _) = sp(tag("["))(i)?;
    let (i, (begin, end)) = cut(terminated(
        pair(
            sp(usize::parse),
            opt(preceded(sp(tag(":")), sp(usize::parse))),
        ),
        sp(context("`]`", tag("]"))),
    ))(i)?;
    let end = end.unwrap_or(begin + 1);
    Ok((i, Expr::SliceIdx { value, begin, end }))
}

/// One or more comma-separated expressions
fn expr_list(input: RawSpan) -> ParseResult<'_, Vec<SpanNode<Expr>>> {
    separated_list1(sp(tag(",")), sp(Expr::parse_node))(input)
}

// ===== Statements =====

/// `return e, e, ...`
fn return_stmt(input: RawSpan) -> ParseResult<'_, Stmt> {
    map(preceded(keyword(RETURN_KEYWORD), cut(expr_list)), Stmt::Return)(input)
}

/// `a, b := e`. Tried before [reg_write_stmt]; failing to find `:=` is the
/// signal to backtrack.
fn assign_stmt(input: RawSpan) -> ParseResult<'_, Stmt> {
    let (i, targets) =
        separated_list1(sp(tag(",")), sp(String::parse_node))(input)?;
    let (i, _) = sp(tag(":="))(i)?;
    let (i, rhs) = sp(Expr::parse_node)(i)?;
    Ok((i, Stmt::Assign { targets, rhs }))
}

/// `r <- e`: schedule a register write for end-of-tick
fn reg_write_stmt(input: RawSpan) -> ParseResult<'_, Stmt> {
    let (i, reg) = String::parse_node(input)?;
    let (i, _) = sp(tag("<-"))(i)?;
    let (i, rhs) = cut(sp(Expr::parse_node))(i)?;
    Ok((i, Stmt::RegWrite { reg, rhs }))
}

/// `{ stmt* }`
fn chip_body(input: RawSpan) -> ParseResult<'_, Vec<SpanNode<Stmt>>> {
    preceded(
        sp(context("`{`", tag("{"))),
        terminated(
            many0(sp(Stmt::parse_node)),
            // If a statement failed to parse, this is where it surfaces
            sp(context("statement or `}`", tag("}"))),
        ),
    )(input)
}

// ===== Package =====

/// Parse chip declarations up to the end of input.
fn package_body(input: RawSpan) -> ParseResult<'_, Vec<SpanNode<Chip>>> {
    let (i, chips) = many0(sp(Chip::parse_node))(input)?;
    let (i, _) = multispace0(i)?;
    if i.fragment().is_empty() {
        Ok((i, chips))
    } else {
        // Trailing garbage that isn't a chip declaration
        Err(nom::Err::Failure(VerboseError {
            errors: vec![(i, VerboseErrorKind::Context("chip declaration"))],
        }))
    }
}

/// Parse a full package from source text.
fn parse(
    input: &str,
    package_name: &str,
) -> Result<Package, Vec<SourceErrorWrapper<CompileError>>> {
    match package_body(RawSpan::new(input)) {
        Ok((_, chips)) => Ok(Package {
            name: package_name.into(),
            chips,
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            // Grab the first error in the chain that is a Context, which
            // means we labelled it ourselves. Everything else is generated by
            // nom which means it's useless.
            let (raw_span, context) = e
                .errors
                .iter()
                .filter_map(|err| match err {
                    (span, VerboseErrorKind::Context(context)) => {
                        Some((span, *context))
                    }
                    _ => None,
                })
                .next()
                // This indicates we're missing a context() call somewhere
                .expect("No context errors available");

            Err(vec![SourceErrorWrapper::new(
                CompileError::Syntax { expected: context },
                // the actual fragment here is just the remaining source, so
                // it's not useful - just use the position from it
                Span::from_position(raw_span),
                input,
            )])
        }
        // only possible in streaming mode
        Err(nom::Err::Incomplete(_needed)) => unreachable!(),
    }
}

impl Compiler<()> {
    /// Parses source code from the given input, into an abstract syntax tree.
    pub(crate) fn parse(
        self,
    ) -> Result<Compiler<Package>, WithSource<CompileError>> {
        match parse(&self.source, &self.package_name) {
            Ok(package) => Ok(Compiler {
                source: self.source,
                package_name: self.package_name,
                ast: package,
            }),
            Err(errors) => Err(WithSource::new(errors, self.source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Package {
        parse(src, "test_pkg").unwrap()
    }

    fn parse_err(src: &str) -> String {
        let errors = parse(src, "test_pkg").unwrap_err();
        assert_eq!(errors.len(), 1);
        errors[0].to_string()
    }

    /// Helper to make it a bit terser to create spans for tests
    fn span(
        offset: usize,
        length: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Span {
        Span {
            offset,
            length,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    #[test]
    fn test_parse_simple_chip() {
        let pkg = parse_ok("chip Buf(a) res {\n    return a\n}");
        assert_eq!(pkg.name, "test_pkg");
        assert_eq!(pkg.chips.len(), 1);

        let chip = pkg.chips[0].value();
        assert_eq!(chip.name, Node("Buf".into(), span(5, 3, 0, 5, 0, 8)));
        assert_eq!(
            chip.params,
            vec![Node(
                Param {
                    name: "a".into(),
                    width: None
                },
                span(9, 1, 0, 9, 0, 10)
            )]
        );
        assert_eq!(
            chip.outputs,
            vec![Node(
                Param {
                    name: "res".into(),
                    width: None
                },
                span(12, 3, 0, 12, 0, 15)
            )]
        );
        assert_eq!(
            chip.body,
            vec![Node(
                Stmt::Return(vec![Node(
                    Expr::Ref("a".into()),
                    span(29, 1, 1, 11, 1, 12)
                )]),
                span(22, 8, 1, 4, 1, 12)
            )]
        );
    }

    #[test]
    fn test_parse_slice_params() {
        let pkg = parse_ok("chip F(a[4], b) lo[2], hi {\n    return a\n}");
        let chip = pkg.chips[0].value();
        assert_eq!(chip.params[0].value().width, Some(4));
        assert_eq!(chip.params[1].value().width, None);
        assert_eq!(chip.outputs[0].value().width, Some(2));
        assert_eq!(chip.outputs[1].value().width, None);
    }

    #[test]
    fn test_parse_statement_forms() {
        let pkg = parse_ok(
            "chip P(a) res {
    r := Register()
    s := Register(4)
    r <- a
    return <- r
}",
        );
        let body = &pkg.chips[0].value().body;
        assert_eq!(body.len(), 4);
        match body[0].value() {
            Stmt::Assign { targets, rhs } => {
                assert_eq!(*targets[0].value(), String::from("r"));
                assert_eq!(*rhs.value(), Expr::NewRegister { width: None });
            }
            other => panic!("expected assign, got {:?}", other),
        }
        match body[1].value() {
            Stmt::Assign { rhs, .. } => {
                assert_eq!(*rhs.value(), Expr::NewRegister { width: Some(4) });
            }
            other => panic!("expected assign, got {:?}", other),
        }
        // The speculative fallback: `r <- a` is not an assignment
        match body[2].value() {
            Stmt::RegWrite { reg, rhs } => {
                assert_eq!(*reg.value(), String::from("r"));
                assert_eq!(*rhs.value(), Expr::Ref("a".into()));
            }
            other => panic!("expected register write, got {:?}", other),
        }
        match body[3].value() {
            Stmt::Return(results) => {
                assert_eq!(*results[0].value(), Expr::RegRead("r".into()));
            }
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multi_assign() {
        let pkg = parse_ok(
            "chip P(a) x, y {\n    s, c := Half(a, a)\n    return s, c\n}",
        );
        match pkg.chips[0].value().body[0].value() {
            Stmt::Assign { targets, rhs } => {
                let names: Vec<_> =
                    targets.iter().map(|t| t.value().clone()).collect();
                assert_eq!(names, vec!["s".to_string(), "c".to_string()]);
                match rhs.value() {
                    Expr::Call { chip, args } => {
                        assert_eq!(chip, "Half");
                        assert_eq!(args.len(), 2);
                    }
                    other => panic!("expected call, got {:?}", other),
                }
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_slice_index_sugar() {
        let pkg = parse_ok(
            "chip F(a[4]) res {\n    return And(a[1], [a[0:2], a[2:4]])\n}",
        );
        let body = &pkg.chips[0].value().body;
        match body[0].value() {
            Stmt::Return(results) => match results[0].value() {
                Expr::Call { args, .. } => {
                    assert_eq!(
                        *args[0].value(),
                        Expr::SliceIdx {
                            value: "a".into(),
                            begin: 1,
                            end: 2
                        }
                    );
                    match args[1].value() {
                        Expr::SliceJoin(elements) => {
                            assert_eq!(
                                *elements[0].value(),
                                Expr::SliceIdx {
                                    value: "a".into(),
                                    begin: 0,
                                    end: 2
                                }
                            );
                        }
                        other => panic!("expected join, got {:?}", other),
                    }
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_register_ident_prefix() {
        // `Register1` is an identifier, not the keyword
        let pkg = parse_ok("chip F(Register1) res {\n    return Register1\n}");
        match pkg.chips[0].value().body[0].value() {
            Stmt::Return(results) => {
                assert_eq!(*results[0].value(), Expr::Ref("Register1".into()));
            }
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_insignificant_whitespace() {
        // Same package, hostile formatting
        let a = parse_ok("chip F(a,b) res{return Nand(a,b)}");
        let b = parse_ok(
            "chip F ( a , b )\n    res\n{\n    return Nand ( a , b )\n}",
        );
        // Spans differ, names and shapes must not
        assert_eq!(a.chips.len(), b.chips.len());
        assert_eq!(
            a.chips[0].value().name.value(),
            b.chips[0].value().name.value()
        );
        assert_eq!(
            a.chips[0].value().body.len(),
            b.chips[0].value().body.len()
        );
    }

    #[test]
    fn test_parse_error_positions() {
        assert_eq!(
            parse_err("chip And (a, b) wire {\nreturn \n}"),
            "Syntax error at 2:0: Expected expression",
        );
        assert_eq!(
            parse_err("chip F(a) { return a }"),
            "Syntax error at 0:10: Expected output list",
        );
        assert_eq!(
            parse_err("blorp"),
            "Syntax error at 0:0: Expected chip declaration",
        );
        assert_eq!(
            parse_err("chip F(a) res {\n    x ;= a\n    return x\n}"),
            "Syntax error at 1:4: Expected statement or `}`",
        );
        // End of input mid-chip
        assert_eq!(
            parse_err("chip F(a) res {\n    return a"),
            "Syntax error at 1:12: Expected statement or `}`",
        );
    }
}
