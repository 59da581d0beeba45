//! End-to-end tests: compile a package and tick the kernel against known
//! input/output vectors, including clocked chips whose state persists in the
//! caller-owned register buffer.

use gatec::{compile, Circuit, Compiler, Kernel};

const GATES: &str = "
chip And(a, b) res {
    tmp := Nand(a, b)
    res := Nand(tmp, tmp)
    return res
}

chip And3(a, b, c) res {
    tmp := And(a, b)
    res := And(tmp, c)
    return res
}

chip And4Way(a[4], b[4]) res[4] {
    return [
        And(a[0], b[0]),
        And(a[1], b[1]),
        And(a[2], b[2]),
        And(a[3], b[3])
    ]
}

chip StrangeAnd2Way(a[2], b[2]) res[2] {
    t := And4Way([a[0], a[1], a[0], a[1]], [b[0], b[1], b[0], b[1]])
    return t[0:2]
}
";

const CLOCKED: &str = "
chip Prev(a) res {
    r := Register()
    r <- a
    return <- r
}

chip PrevSlice4(a[4]) res[4] {
    r := Register(4)
    r <- a
    return <- r
}

chip PrevSlice8(a[8]) res[8] {
    lo := PrevSlice4(a[0:4])
    hi := PrevSlice4(a[4:8])
    return [lo[0], lo[1], lo[2], lo[3], hi[0], hi[1], hi[2], hi[3]]
}
";

fn kernel(src: &str, entrypoint: &str) -> Kernel {
    compile(src.into(), entrypoint).unwrap()
}

/// Run one tick of a chip with no latched state and return its outputs.
/// Asserts that the (empty or zeroed) register buffer is left untouched.
fn run_combinational(kernel: &Kernel, input: &[u8]) -> Vec<u8> {
    let mut reg_buf = vec![0; kernel.buffer_size()];
    let mut output = vec![0; kernel.output_width()];
    kernel.run(&mut reg_buf, input, &mut output);
    assert!(reg_buf.iter().all(|&byte| byte == 0));
    output
}

#[test]
fn test_and() {
    let kernel = kernel(GATES, "And");
    assert_eq!(run_combinational(&kernel, &[0, 0]), [0]);
    assert_eq!(run_combinational(&kernel, &[0, 1]), [0]);
    assert_eq!(run_combinational(&kernel, &[1, 0]), [0]);
    assert_eq!(run_combinational(&kernel, &[1, 1]), [1]);
}

#[test]
fn test_and3() {
    let kernel = kernel(GATES, "And3");
    for x in 0..8u8 {
        let a = x & 1;
        let b = (x >> 1) & 1;
        let c = (x >> 2) & 1;
        assert_eq!(
            run_combinational(&kernel, &[a, b, c]),
            [a & b & c],
            "inputs ({}, {}, {})",
            a,
            b,
            c
        );
    }
}

#[test]
fn test_and4way() {
    let kernel = kernel(GATES, "And4Way");
    assert_eq!(kernel.input_width(), 8);
    assert_eq!(kernel.output_width(), 4);
    assert_eq!(
        run_combinational(&kernel, &[1, 0, 1, 1, 1, 1, 0, 1]),
        [1, 0, 0, 1]
    );
}

#[test]
fn test_strange_and2way() {
    let kernel = kernel(GATES, "StrangeAnd2Way");
    assert_eq!(run_combinational(&kernel, &[1, 0, 1, 1]), [1, 0]);
}

#[test]
fn test_combinational_chips_need_no_buffer() {
    for entrypoint in &["And", "And3", "And4Way", "StrangeAnd2Way"] {
        assert_eq!(kernel(GATES, entrypoint).buffer_size(), 0);
    }
}

#[test]
fn test_inputs_sanitized_to_low_bit() {
    let kernel = kernel(GATES, "And");
    assert_eq!(run_combinational(&kernel, &[3, 1]), [1]);
    assert_eq!(run_combinational(&kernel, &[2, 1]), [0]);
}

#[test]
fn test_register_one_tick_delay() {
    let kernel = kernel(CLOCKED, "Prev");
    assert_eq!(kernel.buffer_size(), 1);

    let mut reg_buf = vec![0; kernel.buffer_size()];
    let mut output = [0u8; 1];
    let inputs = [1, 0, 1, 1];
    let expected = [0, 1, 0, 1];
    for (input, expected) in inputs.iter().zip(&expected) {
        kernel.run(&mut reg_buf, &[*input], &mut output);
        assert_eq!(output[0], *expected);
    }
}

#[test]
fn test_prev_slice8() {
    let kernel = kernel(CLOCKED, "PrevSlice8");
    // Two 4-wide register frames
    assert_eq!(kernel.buffer_size(), 8);

    let mut reg_buf = vec![0; kernel.buffer_size()];
    let mut output = [0u8; 8];

    kernel.run(&mut reg_buf, &[1, 0, 1, 0, 0, 1, 1, 1], &mut output);
    assert_eq!(output, [0, 0, 0, 0, 0, 0, 0, 0]);

    kernel.run(&mut reg_buf, &[1, 0, 0, 1, 0, 0, 1, 1], &mut output);
    assert_eq!(output, [1, 0, 1, 0, 0, 1, 1, 1]);

    kernel.run(&mut reg_buf, &[1, 1, 1, 0, 0, 1, 0, 0], &mut output);
    assert_eq!(output, [1, 0, 0, 1, 0, 0, 1, 1]);
}

#[test]
fn test_fresh_buffer_resets_state() {
    let kernel = kernel(CLOCKED, "Prev");
    let mut output = [0u8; 1];

    let mut reg_buf = vec![0; kernel.buffer_size()];
    kernel.run(&mut reg_buf, &[1], &mut output);
    kernel.run(&mut reg_buf, &[1], &mut output);
    assert_eq!(output[0], 1);

    // A new zeroed buffer starts a new history
    let mut reg_buf = vec![0; kernel.buffer_size()];
    kernel.run(&mut reg_buf, &[0], &mut output);
    assert_eq!(output[0], 0);
}

#[test]
fn test_kernels_are_independent() {
    // One kernel, two register buffers: two independent instances
    let kernel = kernel(CLOCKED, "Prev");
    let mut buf_a = vec![0; kernel.buffer_size()];
    let mut buf_b = vec![0; kernel.buffer_size()];
    let mut output = [0u8; 1];

    kernel.run(&mut buf_a, &[1], &mut output);
    kernel.run(&mut buf_b, &[0], &mut output);

    kernel.run(&mut buf_a, &[0], &mut output);
    assert_eq!(output[0], 1);
    kernel.run(&mut buf_b, &[0], &mut output);
    assert_eq!(output[0], 0);
}

#[test]
fn test_circuit_wrapper() {
    let mut circuit = Circuit::new(kernel(CLOCKED, "Prev"));
    assert_eq!(circuit.num_inputs(), 1);
    assert_eq!(circuit.num_outputs(), 1);

    circuit.set_input(0, true);
    circuit.tick();
    assert!(!circuit.output(0));
    circuit.set_input(0, false);
    circuit.tick();
    assert!(circuit.output(0));
}

#[test]
fn test_print_roundtrip() {
    for src in &[GATES, CLOCKED] {
        let checked = Compiler::check((*src).into(), "gates").unwrap();
        let printed = checked.package().to_string();
        let reparsed = Compiler::check(printed.clone(), "gates")
            .unwrap_or_else(|error| {
                panic!("printed source failed to parse:\n{}\n{}", printed, error)
            });
        // Reparsing the pretty-printed source re-derives the same typed
        // AST, casts included
        assert_eq!(checked.package(), reparsed.package());
    }
}
