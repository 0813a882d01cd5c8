use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bitvec::slice::BitSlice;
use clap::Parser;
use indicatif::HumanCount;
use num_bigint::BigInt;
use qcl::io::{bits_value, parse_value, value_sizes};
use qcl_compiler::{Compiler, Params};
use qcl_garble::stream_evaluator;
use qcl_p2p::{Conn, InsecureOt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// QCL compiler and two-party garbled circuit runner.
#[derive(Parser)]
#[command(name = "garbled")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Stream the garbled circuit between two peers instead of
    /// evaluating locally.
    #[arg(long)]
    stream: bool,

    /// Act as the evaluator: listen for a garbler connection.
    #[arg(long, requires = "stream")]
    listen: bool,

    /// Peer endpoint, host:port.
    #[arg(short = 'e', long = "endpoint")]
    endpoint: Option<String>,

    /// Input values (repeatable, or comma separated).
    #[arg(short = 'i', long = "input", value_delimiter = ',')]
    inputs: Vec<String>,

    /// Evaluator only: exit after one session.
    #[arg(long)]
    once: bool,

    /// Socket read/write timeout in seconds; 0 disables.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Verbose output.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Dump the SSA program listing.
    #[arg(long)]
    ssa: bool,

    /// Dump the CFG in graphviz dot format.
    #[arg(long)]
    dot: bool,

    /// QCL source file (garbler and local modes).
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if cli.stream {
        if cli.listen {
            stream_evaluator_mode(&cli)
        } else {
            stream_garbler_mode(&cli)
        }
    } else {
        local_mode(&cli)
    }
}

fn timeout(cli: &Cli) -> Option<Duration> {
    (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout))
}

fn parse_inputs(cli: &Cli) -> Result<Vec<BigInt>> {
    cli.inputs
        .iter()
        .map(|s| parse_value(s).with_context(|| format!("input '{s}'")))
        .collect()
}

/// Evaluator: accept garbler connections and evaluate streamed
/// circuits.
fn stream_evaluator_mode(cli: &Cli) -> Result<()> {
    let endpoint = cli
        .endpoint
        .as_deref()
        .context("evaluator mode needs -e host:port")?;
    let inputs = parse_inputs(cli)?;
    let sizes = value_sizes(&inputs);

    let listener = TcpListener::bind(endpoint)
        .with_context(|| format!("cannot listen on {endpoint}"))?;
    println!("Listening for connections at {endpoint}");

    loop {
        let (stream, peer) = listener.accept()?;
        println!("New connection from {peer}");

        let mut conn = Conn::from_tcp(stream, timeout(cli))?;
        match stream_evaluator(&mut conn, &mut InsecureOt, &inputs, &sizes) {
            Ok(bits) => {
                println!("Result[0]: 0x{:x} ({} bits)", bits_value(&bits), bits.len());
            }
            Err(err) if cli.once => bail!("session failed: {err}"),
            Err(err) => eprintln!("session failed: {err}"),
        }
        if cli.once {
            return Ok(());
        }
    }
}

/// Garbler: compile the program and stream it to the evaluator.
fn stream_garbler_mode(cli: &Cli) -> Result<()> {
    let endpoint = cli
        .endpoint
        .as_deref()
        .context("garbler mode needs -e host:port")?;
    let file = cli
        .file
        .as_deref()
        .context("streaming mode takes a QCL file")?;
    if file.extension().and_then(|e| e.to_str()) != Some("qcl") {
        bail!("streaming mode takes a single .qcl file");
    }
    let inputs = parse_inputs(cli)?;

    let stream = TcpStream::connect(endpoint)
        .with_context(|| format!("cannot connect to {endpoint}"))?;
    let mut conn = Conn::from_tcp(stream, timeout(cli))?;

    let mut compiler = Compiler::new(Params {
        verbose: cli.verbose,
        ssa_out: cli.ssa,
        dot_out: cli.dot,
    });
    let (outputs, bits) = compiler.stream_file(&mut conn, &mut InsecureOt, file, &inputs)?;

    print_results(&outputs, &bits);
    let (sent, received) = conn.frame_counts();
    info!(sent, received, "connection frames");
    Ok(())
}

/// Local mode: compile and evaluate in cleartext with every input
/// supplied on the command line.
fn local_mode(cli: &Cli) -> Result<()> {
    let file = cli.file.as_deref().context("no input file")?;
    let inputs = parse_inputs(cli)?;
    let sizes: Vec<Vec<u64>> = value_sizes(&inputs).into_iter().map(|s| vec![s]).collect();

    let mut compiler = Compiler::new(Params {
        verbose: cli.verbose,
        ssa_out: cli.ssa,
        dot_out: cli.dot,
    });
    let circuit = compiler.compile_file(file, &sizes)?;

    if cli.verbose {
        println!(
            "circuit: {} gates ({}), {} wires",
            HumanCount(circuit.stats.count()),
            circuit.stats,
            HumanCount(circuit.num_wires as u64)
        );
    }

    let input_bits = circuit.inputs.join(&inputs)?;
    let output_bits = circuit.eval(&input_bits)?;
    print_results(&circuit.outputs, &output_bits);
    Ok(())
}

fn print_results(outputs: &qcl::IO, bits: &BitSlice) {
    if outputs.is_empty() {
        println!("Result[0]: 0x{:x}", bits_value(bits));
        return;
    }
    for (i, value) in outputs.split(bits).iter().enumerate() {
        println!("Result[{i}]: {value}");
    }
}
