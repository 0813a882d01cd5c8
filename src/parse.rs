//! Parsing of on-disk circuit files in the Bristol text format.
//!
//! Parsed circuits are embedded into compiled programs by the
//! `native("file.circ", ...)` builtin. File wire numbering starts at the
//! first primary input; parsing shifts everything by two so the shared
//! constant wires keep their reserved ids.

use std::fs;
use std::path::Path;

use crate::circuit::{Circuit, CircuitError};
use crate::gate::{Gate, Op, Wire};
use crate::io::{IoArg, IO};
use crate::stats::Stats;
use crate::types::Type;

/// True when the argument names an on-disk circuit file rather than a
/// registered intrinsic.
pub fn is_circuit_file(name: &str) -> bool {
    name.ends_with(".circ") || name.ends_with(".bristol")
}

/// Parse a Bristol format circuit file and assign gate levels.
pub fn parse_file(path: &Path) -> Result<Circuit, CircuitError> {
    let data = fs::read_to_string(path)?;
    parse(&path.display().to_string(), &data)
}

/// Parse Bristol format circuit text.
///
/// Header: `<gates> <wires>`, then the input widths (`<n> <bits>...`),
/// then the output widths. Gate lines are `2 1 in0 in1 out OP` or
/// `1 1 in0 out INV`.
pub fn parse(path: &str, data: &str) -> Result<Circuit, CircuitError> {
    let err = |line: usize, msg: String| CircuitError::Parse {
        path: path.to_string(),
        line,
        msg,
    };

    let mut lines = data
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let (lineno, header) = lines
        .next()
        .ok_or_else(|| err(0, "empty circuit file".to_string()))?;
    let header = parse_numbers(header).map_err(|msg| err(lineno + 1, msg))?;
    if header.len() != 2 {
        return Err(err(lineno + 1, "expected '<gates> <wires>'".to_string()));
    }
    let (num_gates, file_wires) = (header[0] as usize, header[1] as usize);

    let (lineno, line) = lines
        .next()
        .ok_or_else(|| err(0, "missing input declaration".to_string()))?;
    let inputs = parse_io_line(line).map_err(|msg| err(lineno + 1, msg))?;

    let (lineno, line) = lines
        .next()
        .ok_or_else(|| err(0, "missing output declaration".to_string()))?;
    let outputs = parse_io_line(line).map_err(|msg| err(lineno + 1, msg))?;

    let mut stats = Stats::new();
    let mut gates = Vec::with_capacity(num_gates);

    for (lineno, line) in lines {
        let gate = parse_gate_line(line).map_err(|msg| err(lineno + 1, msg))?;
        stats.record(gate.op);
        gates.push(gate);
    }
    if gates.len() != num_gates {
        return Err(err(
            0,
            format!("header declares {} gates, found {}", num_gates, gates.len()),
        ));
    }

    let num_wires = file_wires + 2;
    let output_bits = outputs.size() as usize;
    if output_bits > file_wires {
        return Err(err(0, "more output bits than wires".to_string()));
    }
    // Bristol convention: outputs are the last wires of the file.
    let output_wires = (file_wires - output_bits..file_wires)
        .map(|w| Wire(w as u32 + 2))
        .collect();

    let mut circuit = Circuit {
        inputs,
        outputs,
        gates,
        output_wires,
        num_wires,
        stats,
    };
    circuit.assign_levels();
    Ok(circuit)
}

fn parse_numbers(line: &str) -> Result<Vec<u64>, String> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|_| format!("malformed number '{tok}'"))
        })
        .collect()
}

fn parse_io_line(line: &str) -> Result<IO, String> {
    let numbers = parse_numbers(line)?;
    let Some((count, widths)) = numbers.split_first() else {
        return Err("empty I/O declaration".to_string());
    };
    if widths.len() != *count as usize {
        return Err(format!(
            "I/O declaration promises {} arguments, found {}",
            count,
            widths.len()
        ));
    }
    Ok(IO(widths
        .iter()
        .map(|w| IoArg::new("", Type::Uint(*w as u32)))
        .collect()))
}

fn parse_gate_line(line: &str) -> Result<Gate, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let op = match tokens.last() {
        Some(&"XOR") => Op::Xor,
        Some(&"XNOR") => Op::Xnor,
        Some(&"AND") => Op::And,
        Some(&"OR") => Op::Or,
        Some(&"INV") | Some(&"NOT") => Op::Inv,
        Some(other) => return Err(format!("unsupported gate type '{other}'")),
        None => return Err("empty gate line".to_string()),
    };

    let expected = 3 + op.arity() + 1;
    if tokens.len() != expected {
        return Err(format!(
            "expected {} tokens for {} gate, got {}",
            expected,
            op,
            tokens.len()
        ));
    }

    let wire = |tok: &str| -> Result<Wire, String> {
        let id: u32 = tok
            .parse()
            .map_err(|_| format!("malformed wire id '{tok}'"))?;
        Ok(Wire(id + 2))
    };

    Ok(match op {
        Op::Inv => Gate::new(op, wire(tokens[2])?, Wire::INVALID, wire(tokens[3])?),
        _ => Gate::new(op, wire(tokens[2])?, wire(tokens[3])?, wire(tokens[4])?),
    })
}
