//! End-to-end compile-and-evaluate scenarios.

use bitvec::prelude::*;
use num_bigint::BigInt;
use qcl::{Circuit, Op};
use qcl_compiler::{Compiler, Params};

fn compile(data: &str) -> Circuit {
    compile_sized(data, &[])
}

fn compile_sized(data: &str, input_sizes: &[Vec<u64>]) -> Circuit {
    Compiler::new(Params::default())
        .compile("test.qcl", data, input_sizes)
        .unwrap()
}

fn eval(circuit: &Circuit, inputs: &[i64]) -> Vec<BigInt> {
    let inputs: Vec<BigInt> = inputs.iter().map(|v| BigInt::from(*v)).collect();
    let bits = circuit.inputs.join(&inputs).unwrap();
    let out = circuit.eval(&bits).unwrap();
    circuit.outputs.split(&out)
}

fn eval1(circuit: &Circuit, inputs: &[i64]) -> BigInt {
    let mut out = eval(circuit, inputs);
    assert_eq!(out.len(), 1);
    out.pop().unwrap()
}

#[test]
fn and_identity() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint8) uint8 {\n\
         \treturn a & b\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[0xF0, 0x0F]), BigInt::from(0));
    assert_eq!(eval1(&circuit, &[0xFF, 0x5A]), BigInt::from(0x5A));
}

#[test]
fn addition_with_carry() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint4) uint5 {\n\
         \treturn a + b\n\
         }\n",
    );
    assert_eq!(circuit.outputs.size(), 5);
    assert_eq!(eval1(&circuit, &[15, 1]), BigInt::from(16));
    assert_eq!(eval1(&circuit, &[7, 8]), BigInt::from(15));

    assert!(circuit.stats[Op::And] >= 4, "{}", circuit.stats);
    assert!(circuit.stats[Op::Xor] >= 4, "{}", circuit.stats);
}

#[test]
fn copy_into_array_slice() {
    let circuit = compile(
        "package main\n\
         func main(seed uint4) ([6]uint4, int32) {\n\
         \tvar dst [6]uint4\n\
         \tvar src [3]uint4\n\
         \tsrc[0] = 1\n\
         \tsrc[1] = 2\n\
         \tsrc[2] = 3\n\
         \tn := copy(dst[2:5], src)\n\
         \treturn dst, n\n\
         }\n",
    );
    let out = eval(&circuit, &[0]);
    // dst = [0, 0, 1, 2, 3, 0], elements packed LSB first.
    let expected = BigInt::from((1 << 8) | (2 << 12) | (3 << 16));
    assert_eq!(out[0], expected);
    // copy returns the number of elements copied.
    assert_eq!(out[1], BigInt::from(3));
}

#[test]
fn copy_truncates_longer_source() {
    let circuit = compile(
        "package main\n\
         func main(seed uint4) ([2]uint4, int32) {\n\
         \tvar dst [2]uint4\n\
         \tvar src [3]uint4\n\
         \tsrc[0] = 7\n\
         \tsrc[1] = 5\n\
         \tsrc[2] = 3\n\
         \tn := copy(dst, src)\n\
         \treturn dst, n\n\
         }\n",
    );
    let out = eval(&circuit, &[0]);
    assert_eq!(out[0], BigInt::from(7 | (5 << 4)));
    assert_eq!(out[1], BigInt::from(2));
}

#[test]
fn native_hamming() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint4) uint4 {\n\
         \treturn native(\"hamming\", a, b)\n\
         }\n",
    );
    // 0b1101 ^ 0b0111 = 0b1010, two set bits.
    assert_eq!(eval1(&circuit, &[0b1101, 0b0111]), BigInt::from(2));
    assert_eq!(eval1(&circuit, &[0b1101, 0b0000]), BigInt::from(3));
    assert_eq!(eval1(&circuit, &[0b1111, 0b0000]), BigInt::from(4));
    assert_eq!(eval1(&circuit, &[0b1010, 0b1010]), BigInt::from(0));
}

#[test]
fn phi_after_branch() {
    let circuit = compile(
        "package main\n\
         func main(c bool, a, b uint8) uint8 {\n\
         \tvar x uint8\n\
         \tif c {\n\
         \t\tx = a\n\
         \t} else {\n\
         \t\tx = b\n\
         \t}\n\
         \treturn x\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[1, 7, 9]), BigInt::from(7));
    assert_eq!(eval1(&circuit, &[0, 7, 9]), BigInt::from(9));
}

#[test]
fn phi_count_is_minimal() {
    let mut compiler = Compiler::new(Params::default());
    let program = compiler
        .program(
            "test.qcl",
            "package main\n\
             func main(c bool, a, b uint8) uint8 {\n\
             \tvar x uint8\n\
             \tif c {\n\
             \t\tx = a\n\
             \t} else {\n\
             \t\tx = b\n\
             \t}\n\
             \treturn x\n\
             }\n",
            &[],
        )
        .unwrap();
    let phis = program
        .steps
        .iter()
        .filter(|s| s.instr.op == qcl_compiler::ssa::InstrOp::Phi)
        .count();
    assert_eq!(phis, 1);
}

#[test]
fn millionaires_problem() {
    let circuit = compile_sized(
        "package main\n\
         func main(a, b uint) bool {\n\
         \treturn a < b\n\
         }\n",
        &[vec![20], vec![20]],
    );
    assert_eq!(circuit.inputs.size(), 40);
    assert_eq!(eval1(&circuit, &[1_000_000, 999_999]), BigInt::from(0));
    assert_eq!(eval1(&circuit, &[999_999, 1_000_000]), BigInt::from(1));
}

#[test]
fn early_return_merges_at_return_block() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint8) uint8 {\n\
         \tif a < b {\n\
         \t\treturn b\n\
         \t}\n\
         \treturn a\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[3, 200]), BigInt::from(200));
    assert_eq!(eval1(&circuit, &[200, 3]), BigInt::from(200));
}

#[test]
fn unrolled_for_loop() {
    let circuit = compile(
        "package main\n\
         func main(a uint8) uint16 {\n\
         \tvar s uint16 = 0\n\
         \tfor i := 0; i < 4; i++ {\n\
         \t\ts = s + a\n\
         \t}\n\
         \treturn s\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[50]), BigInt::from(200));
}

#[test]
fn arithmetic_grid() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint8) uint16 {\n\
         \treturn a * b\n\
         }\n",
    );
    for (a, b) in [(0, 0), (3, 7), (15, 15), (255, 255), (200, 3)] {
        assert_eq!(eval1(&circuit, &[a, b]), BigInt::from(a * b), "{a} * {b}");
    }

    let circuit = compile(
        "package main\n\
         func main(a, b uint8) (uint8, uint8) {\n\
         \treturn a / b, a % b\n\
         }\n",
    );
    for (a, b) in [(7, 3), (255, 16), (1, 255), (100, 10)] {
        let out = eval(&circuit, &[a, b]);
        assert_eq!(out[0], BigInt::from(a / b), "{a} / {b}");
        assert_eq!(out[1], BigInt::from(a % b), "{a} % {b}");
    }
}

#[test]
fn signed_comparison_and_negation() {
    let circuit = compile(
        "package main\n\
         func main(a, b int8) bool {\n\
         \treturn -a < b\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[5, -4]), BigInt::from(1));
    assert_eq!(eval1(&circuit, &[-5, 4]), BigInt::from(0));
}

#[test]
fn shifts_are_free() {
    let circuit = compile(
        "package main\n\
         func main(a uint8) uint8 {\n\
         \treturn a << 2\n\
         }\n",
    );
    // Constant shifts rewire; no gates at all.
    assert_eq!(circuit.stats.count(), 0);
    assert_eq!(eval1(&circuit, &[0b0110_0001]), BigInt::from(0b1000_0100));

    let circuit = compile(
        "package main\n\
         func main(a int8) int8 {\n\
         \treturn a >> 2\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[-8]), BigInt::from(-2));
}

#[test]
fn imported_function_inlines() {
    let circuit = compile(
        "package main\n\
         import \"math\"\n\
         func main(a, b uint8) uint8 {\n\
         \treturn math.MaxUint(a, b)\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[3, 200]), BigInt::from(200));
    assert_eq!(eval1(&circuit, &[201, 200]), BigInt::from(201));
}

#[test]
fn multi_value_return_through_sort() {
    let circuit = compile(
        "package main\n\
         import \"sort\"\n\
         func main(a, b uint8) (uint8, uint8) {\n\
         \treturn sort.Sort2(a, b)\n\
         }\n",
    );
    let out = eval(&circuit, &[9, 4]);
    assert_eq!(out[0], BigInt::from(4));
    assert_eq!(out[1], BigInt::from(9));
}

#[test]
fn bits_ones_count() {
    let circuit = compile(
        "package main\n\
         import \"bits\"\n\
         func main(x uint64) uint8 {\n\
         \treturn bits.OnesCount(x)\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[0]), BigInt::from(0));
    assert_eq!(eval1(&circuit, &[0b1011_0110]), BigInt::from(5));
    assert_eq!(eval1(&circuit, &[i64::MAX]), BigInt::from(63));
}

#[test]
fn native_circuit_file() {
    // out_i = a_i & b_i over two 2-bit inputs.
    const AND2: &str = "\
2 6
2 2 2
1 2

2 1 0 2 4 AND
2 1 1 3 5 AND
";
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("and2.circ"), AND2).unwrap();
    let source = dir.path().join("main.qcl");
    std::fs::write(
        &source,
        "package main\n\
         func main(a, b uint2) uint2 {\n\
         \treturn native(\"and2.circ\", a, b)\n\
         }\n",
    )
    .unwrap();

    let circuit = Compiler::new(Params::default())
        .compile_file(&source, &[])
        .unwrap();
    assert_eq!(eval1(&circuit, &[0b11, 0b01]), BigInt::from(0b01));
}

#[test]
fn native_circuit_size_mismatch_is_fatal() {
    const AND2: &str = "\
2 6
2 2 2
1 2

2 1 0 2 4 AND
2 1 1 3 5 AND
";
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("and2.circ"), AND2).unwrap();
    let source = dir.path().join("main.qcl");
    std::fs::write(
        &source,
        "package main\n\
         func main(a, b uint8) uint8 {\n\
         \treturn native(\"and2.circ\", a, b)\n\
         }\n",
    )
    .unwrap();

    let err = Compiler::new(Params::default())
        .compile_file(&source, &[])
        .unwrap_err();
    assert!(err.to_string().contains("invalid argument"));
}

#[test]
fn string_equality() {
    let circuit = compile(
        "package main\n\
         import \"bytes\"\n\
         func main(seed uint1) bool {\n\
         \treturn bytes.Equal(\"ab\", \"ab\")\n\
         }\n",
    );
    assert_eq!(eval1(&circuit, &[0]), BigInt::from(1));
}

#[test]
fn non_constant_loop_bound_is_a_user_error() {
    let err = Compiler::new(Params::default())
        .compile(
            "test.qcl",
            "package main\n\
             func main(a uint8) uint8 {\n\
             \tvar s uint8 = 0\n\
             \tfor i := 0; i < a; i++ {\n\
             \t\ts = s + 1\n\
             \t}\n\
             \treturn s\n\
             }\n",
            &[],
        )
        .unwrap_err();
    assert!(err.to_string().contains("not compile-time constant"));
}

#[test]
fn dynamic_index_is_a_user_error() {
    let err = Compiler::new(Params::default())
        .compile(
            "test.qcl",
            "package main\n\
             func main(a [4]uint4, i uint2) uint4 {\n\
             \treturn a[i]\n\
             }\n",
            &[],
        )
        .unwrap_err();
    assert!(err.to_string().contains("not constant"));
}

#[test]
fn output_decodes_through_bitvec_image() {
    let circuit = compile(
        "package main\n\
         func main(a uint8) uint8 {\n\
         \treturn a ^ 0xFF\n\
         }\n",
    );
    let bits = circuit.inputs.join(&[BigInt::from(0x0F)]).unwrap();
    let out = circuit.eval(&bits).unwrap();
    assert_eq!(out, {
        let mut expected = bitvec![0; 8];
        for i in 4..8 {
            expected.set(i, true);
        }
        expected
    });
}
