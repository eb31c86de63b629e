use std::{
    collections::VecDeque,
    io::{self, stdin, stdout, BufRead, Read, Write},
};

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use lazy_regex::regex;
use path_or_dash::{FileOrStdin, PathOrDash};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use circuit::Topology;
use vm::{Options, StopState, UnknownOpcode, VMInt, VM};

mod guess;
mod path_or_dash;

/// Format of a program file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Format {
    /// Integers separated by commas
    Source,
    /// Json list of integers
    Json,
    /// Yaml list of integers
    Yaml,
}

/// Run a program, printing its output
#[derive(Debug, Clone, Args)]
pub struct Run {
    /// Program to run
    #[arg(default_value = "-")]
    program: PathOrDash,
    /// Format of the program file
    #[arg(long)]
    format: Option<Format>,
    /// Value for the input instructions, can be repeated
    #[arg(long = "input", short, allow_negative_numbers = true)]
    inputs: Vec<VMInt>,
    /// Once the `--input` values are used up, read integers from stdin
    #[arg(long)]
    stdin: bool,
    /// Skip unknown opcodes instead of stopping
    #[arg(long)]
    legacy_opcodes: bool,
}

/// Find the phase setting giving the highest signal from a chain of amplifiers
#[derive(Debug, Clone, Args)]
pub struct Amplify {
    /// Program run by each amplifier
    #[arg(default_value = "-")]
    program: PathOrDash,
    /// Format of the program file
    #[arg(long)]
    format: Option<Format>,
    /// Phases to try in every order, one amplifier each [default: 0,1,2,3,4, or 5,6,7,8,9 with
    /// `--feedback`]
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    phases: Option<Vec<VMInt>>,
    /// Feed the output of the last amplifier back to the first one
    #[arg(long)]
    feedback: bool,
    /// Signal sent to the first amplifier
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    seed: VMInt,
    /// Skip unknown opcodes instead of stopping
    #[arg(long)]
    legacy_opcodes: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Args)]
struct Verbosity {
    /// Log more, can be repeated
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Log less, can be repeated
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "verbose")]
    quiet: u8,
}

impl Verbosity {
    fn level(&self) -> &'static str {
        match (self.verbose, self.quiet) {
            (0, 0) => "warn",
            (0, 1) => "error",
            (0, _) => "off",
            (1, _) => "info",
            (2, _) => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run a program
    Run(Run),
    /// Search the best phases for an amplifier circuit
    Amplify(Amplify),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    verbosity: Verbosity,
    #[command(subcommand)]
    command: Command,
}

pub fn cli(Cli { verbosity, command }: Cli) -> anyhow::Result<()> {
    init_logging(verbosity);
    match command {
        Command::Run(cli) => run(cli),
        Command::Amplify(cli) => amplify(cli),
    }
}

/// `RUST_LOG` takes precedence over the command line flags
fn init_logging(verbosity: Verbosity) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.level()));
    // fails only if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}

fn options(legacy_opcodes: bool) -> Options {
    Options {
        unknown_opcode: if legacy_opcodes {
            UnknownOpcode::Skip
        } else {
            UnknownOpcode::Fail
        },
        ..Options::default()
    }
}

mod parsers {
    use std::str::from_utf8;

    use anyhow::{bail, Context};
    use vm::VMInt;

    use crate::path_or_dash::PathOrDash;

    pub fn source(path: &PathOrDash, input: &[u8]) -> anyhow::Result<Vec<VMInt>> {
        let input = from_utf8(input).context("Source is not valid utf8")?;
        match vm::program::parse(input) {
            Ok(code) => Ok(code),
            Err(errs) => {
                let count = errs.len();
                errors::emit(&path.name(), input, errs).context("Cannot write to stderr")?;
                bail!("Found {count} errors in {path}")
            }
        }
    }

    pub(crate) fn json(input: &[u8]) -> anyhow::Result<Vec<VMInt>> {
        serde_json::from_slice(input).context("Invalid json program")
    }

    pub(crate) fn yaml(input: &[u8]) -> anyhow::Result<Vec<VMInt>> {
        serde_yaml::from_slice(input).context("Invalid yaml program")
    }
}

fn load_program(path: &PathOrDash, format: Option<Format>) -> anyhow::Result<Vec<VMInt>> {
    let content = {
        let mut buf = vec![];
        FileOrStdin::open(path)
            .and_then(|mut f| f.read_to_end(&mut buf))
            .with_context(|| format!("Cannot read {path}"))?;
        buf
    };
    let format = format.unwrap_or_else(|| guess::format(path, &content));
    let code = match format {
        Format::Source => parsers::source(path, &content)?,
        Format::Json => parsers::json(&content)?,
        Format::Yaml => parsers::yaml(&content)?,
    };
    debug!(?format, len = code.len(), "Program loaded");
    Ok(code)
}

/// Integers in a chunk of text, ignoring everything else
fn ints(text: &str) -> anyhow::Result<Vec<VMInt>> {
    regex!(r"-?\d+")
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .parse()
                .with_context(|| format!("`{}` is too large for an intcode value", m.as_str()))
        })
        .collect()
}

/// Values for the input instructions: first the given ones, then the ones read from `reader`
struct Inputs<R> {
    given: VecDeque<VMInt>,
    reader: Option<R>,
    read: VecDeque<VMInt>,
}

impl<R: BufRead> Inputs<R> {
    fn new(given: Vec<VMInt>, reader: Option<R>) -> Self {
        Self {
            given: given.into(),
            reader,
            read: VecDeque::new(),
        }
    }

    fn next(&mut self) -> anyhow::Result<Option<VMInt>> {
        if let Some(value) = self.given.pop_front() {
            return Ok(Some(value));
        }
        let Some(reader) = &mut self.reader else {
            return Ok(None);
        };
        loop {
            if let Some(value) = self.read.pop_front() {
                return Ok(Some(value));
            }
            let mut line = String::new();
            if reader.read_line(&mut line).context("Cannot read input")? == 0 {
                return Ok(None);
            }
            self.read.extend(ints(&line)?);
        }
    }
}

/// Run until the machine halts, writing the outputs separated by commas
fn execute<R: BufRead>(
    vm: &mut VM,
    inputs: &mut Inputs<R>,
    mut out: impl Write,
) -> anyhow::Result<()> {
    let mut count = 0usize;
    loop {
        match vm.run().context("Runtime error")? {
            StopState::NeedInput(need_input) => {
                // a prompt should be visible before blocking on stdin
                out.flush()?;
                need_input.give(inputs.next()?.context("Unexpected end of input")?)
            }
            StopState::HasOutput(value) => {
                if count > 0 {
                    write!(out, ",")?;
                }
                write!(out, "{value}")?;
                count += 1;
            }
            StopState::Halted => break,
        }
    }
    if count > 0 {
        writeln!(out)?;
    }
    out.flush()?;
    info!(pc = vm.pc(), outputs = count, "Halted");
    Ok(())
}

fn run(
    Run {
        program,
        format,
        inputs,
        stdin: read_stdin,
        legacy_opcodes,
    }: Run,
) -> anyhow::Result<()> {
    if read_stdin && program == PathOrDash::Dash {
        bail!("Cannot read stdin more than once")
    }
    let code = load_program(&program, format)?;
    let mut vm =
        VM::with_options(&code, options(legacy_opcodes)).context("Cannot load the program")?;
    let mut inputs = Inputs::new(inputs, read_stdin.then(|| stdin().lock()));
    execute(&mut vm, &mut inputs, stdout().lock())
}

fn amplify(
    Amplify {
        program,
        format,
        phases,
        feedback,
        seed,
        legacy_opcodes,
    }: Amplify,
) -> anyhow::Result<()> {
    let code = load_program(&program, format)?;
    let topology = if feedback {
        Topology::Feedback
    } else {
        Topology::Linear
    };
    let phases = phases.unwrap_or_else(|| match topology {
        Topology::Linear => (0..=4).collect(),
        Topology::Feedback => (5..=9).collect(),
    });
    let best =
        circuit::best_phases_with(&code, &phases, topology, seed, options(legacy_opcodes))
            .context("Phase search failed")?;
    writeln!(
        stdout().lock(),
        "{} -> {}",
        best.phases.iter().format(","),
        best.output
    )?;
    Ok(())
}
