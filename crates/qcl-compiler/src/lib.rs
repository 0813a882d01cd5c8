//! QCL compiler: parser, SSA construction and optimization, circuit
//! lowering, and the garbler side of the streaming runtime.

pub mod ast;
pub mod circuits;
pub mod codegen;
pub mod compile;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod pkg;
pub mod ssa;
pub mod stream;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ahash::{HashMap, HashMapExt};
use bitvec::prelude::*;
use num_bigint::BigInt;
use qcl::timing::Timing;
use qcl::Circuit;
use qcl_p2p::{Conn, FrameKind, Message, ObliviousTransfer};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};

pub use error::{CompileError, Point};

use crate::ast::Package;
use crate::ssa::Program;

/// Compiler options.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub verbose: bool,
    /// Dump the SSA listing after GC insertion.
    pub ssa_out: bool,
    /// Dump the CFG in graphviz dot form.
    pub dot_out: bool,
}

/// A compiler instance: options plus the packages parsed so far.
pub struct Compiler {
    params: Params,
    packages: HashMap<String, Package>,
}

impl Compiler {
    pub fn new(params: Params) -> Compiler {
        Compiler {
            params,
            packages: HashMap::new(),
        }
    }

    /// Compile a source file into an SSA program with liveness and GC
    /// applied.
    pub fn program_file(
        &mut self,
        path: &Path,
        input_sizes: &[Vec<u64>],
    ) -> Result<Program, CompileError> {
        let data = std::fs::read_to_string(path)?;
        self.program(&path.display().to_string(), &data, input_sizes)
    }

    /// Compile source text into an SSA program.
    pub fn program(
        &mut self,
        source: &str,
        data: &str,
        input_sizes: &[Vec<u64>],
    ) -> Result<Program, CompileError> {
        let pkg = self.parse(source, data, Package::default())?;
        let source_dir = Path::new(source)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (mut program, dot) = codegen::compile_package(
            &pkg,
            &self.packages,
            source_dir,
            input_sizes,
            self.params.dot_out,
        )?;
        if let Some(dot) = dot {
            print!("{dot}");
        }
        program.liveness();
        program.gc();
        if self.params.ssa_out {
            print!("{}", program.pp());
        }
        debug!(steps = program.steps.len(), "program ready");
        Ok(program)
    }

    /// Compile source text all the way to an in-memory circuit.
    pub fn compile(
        &mut self,
        source: &str,
        data: &str,
        input_sizes: &[Vec<u64>],
    ) -> Result<Circuit, CompileError> {
        let program = self.program(source, data, input_sizes)?;
        let circuit = compile::compile_circuit(&program)?;
        if self.params.verbose {
            info!(%circuit, "circuit compiled");
        }
        Ok(circuit)
    }

    /// Compile a file into an in-memory circuit.
    pub fn compile_file(
        &mut self,
        path: &Path,
        input_sizes: &[Vec<u64>],
    ) -> Result<Circuit, CompileError> {
        let data = std::fs::read_to_string(path)?;
        self.compile(&path.display().to_string(), &data, input_sizes)
    }

    /// Garbler entry point for one streaming session over an
    /// established connection.
    ///
    /// Protocol: receive the evaluator's input sizes, answer with our
    /// own, compile the program against the combined shape, then
    /// garble and stream it. Returns the program outputs.
    pub fn stream_file<R: Read, W: Write>(
        &mut self,
        conn: &mut Conn<R, W>,
        ot: &mut dyn ObliviousTransfer,
        path: &Path,
        inputs: &[BigInt],
    ) -> Result<(qcl::IO, BitVec), CompileError> {
        let mut timing = Timing::new();

        let own_sizes = qcl::io::value_sizes(inputs);

        let peer_sizes = match conn.recv_expect(FrameKind::InputSizes)? {
            Message::InputSizes(sizes) => sizes,
            _ => unreachable!(),
        };

        // Garbler parameters first, evaluator parameters after; the
        // pair defines the shape the program is compiled with.
        let mut input_sizes: Vec<Vec<u64>> = own_sizes.iter().map(|s| vec![*s]).collect();
        input_sizes.extend(peer_sizes.iter().cloned());

        let program = self.program_file(path, &input_sizes)?;
        timing.sample("Compile", vec![format!("{} steps", program.steps.len())]);

        if program.inputs.len() != own_sizes.len() + peer_sizes.len() {
            return Err(CompileError::user(
                &Point::default(),
                format!(
                    "program expects {} input arguments, parties supplied {}",
                    program.inputs.len(),
                    own_sizes.len() + peer_sizes.len()
                ),
            ));
        }

        // Answer with the compiled widths of every parameter so the
        // evaluator knows its own wire counts exactly.
        conn.send(&Message::InputSizes(
            program
                .inputs
                .iter()
                .map(|arg| vec![u64::from(arg.typ.bits())])
                .collect(),
        ))?;
        conn.flush()?;

        let outputs = program.outputs.clone();
        let rng = ChaCha20Rng::from_entropy();
        let bits = stream::stream_garbler(
            conn,
            ot,
            &program,
            own_sizes.len(),
            inputs,
            rng,
            &mut timing,
        )?;
        if self.params.verbose {
            print!("{}", timing.report());
        }
        Ok((outputs, bits))
    }

    fn parse(
        &mut self,
        source: &str,
        data: &str,
        pkg: Package,
    ) -> Result<Package, CompileError> {
        let pkg = parser::parse(source, data, pkg)?;
        for (alias, name) in pkg.imports.clone() {
            self.parse_pkg(&alias, &name)?;
        }
        Ok(pkg)
    }

    fn parse_pkg(&mut self, alias: &str, name: &str) -> Result<(), CompileError> {
        if self.packages.contains_key(alias) {
            return Ok(());
        }
        if self.params.verbose {
            debug!(alias, name, "loading package");
        }
        let mut pkg = Package::default();
        for (path, data) in pkg::load_package(name)? {
            pkg = parser::parse(&path, &data, pkg)?;
        }
        let imports = pkg.imports.clone();
        self.packages.insert(alias.to_string(), pkg);
        for (alias, name) in imports {
            self.parse_pkg(&alias, &name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(data: &str) -> Circuit {
        Compiler::new(Params::default())
            .compile("test.qcl", data, &[])
            .unwrap()
    }

    #[test]
    fn trivial_program_compiles() {
        let circuit = compile(
            "package main\nfunc main(a, b uint8) uint8 {\nreturn a & b\n}\n",
        );
        assert_eq!(circuit.inputs.size(), 16);
        assert_eq!(circuit.outputs.size(), 8);
        assert_eq!(circuit.stats[qcl::Op::And], 8);
    }

    #[test]
    fn imported_package_functions_inline() {
        let circuit = compile(
            "package main\n\
             import \"math\"\n\
             func main(a, b uint8) uint8 {\n\
             return math.MaxUint(a, b)\n\
             }\n",
        );
        assert!(circuit.gates.len() > 8);
    }

    #[test]
    fn compile_errors_are_user_errors() {
        let err = Compiler::new(Params::default())
            .compile(
                "bad.qcl",
                "package main\nfunc main(a uint8) uint8 {\nreturn b\n}\n",
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, CompileError::User { .. }));
        assert!(err.to_string().contains("undefined"));
    }
}
