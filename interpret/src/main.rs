use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, FromArgMatches, Parser};

use ippcode::error::Error;

#[derive(Parser, Debug)]
#[command(
    name = "interpret",
    about = "Runs an IPPcode21 program delivered as XML.",
    group(ArgGroup::new("io").args(["source", "input"]).multiple(true).required(true))
)]
struct Cli {
    /// XML source file; read from standard input when absent.
    #[arg(long)]
    source: Option<PathBuf>,
    /// Input fed to READ; inherits standard input when absent.
    #[arg(long)]
    input: Option<PathBuf>,
    /// File the requested stat tokens are written to.
    #[arg(long)]
    stats: Option<PathBuf>,
    #[arg(long, action = clap::ArgAction::Count)]
    insts: u8,
    #[arg(long, action = clap::ArgAction::Count)]
    vars: u8,
    #[arg(long, action = clap::ArgAction::Count)]
    hot: u8,
}

#[derive(Clone, Copy, Debug)]
enum StatToken {
    Insts,
    Vars,
    Hot,
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run() -> Result<i32, Error> {
    let matches = match Cli::command().try_get_matches_from(std::env::args_os()) {
        Ok(m) => m,
        Err(e) => {
            let _ = e.print();
            return Ok(match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 10,
            });
        }
    };

    reject_duplicate_flags(&matches)?;

    let stat_tokens = stat_tokens_in_order(&matches);
    let cli = Cli::from_arg_matches(&matches).map_err(|e| Error::Cli(e.to_string()))?;

    if !stat_tokens.is_empty() && cli.stats.is_none() {
        return Err(Error::Cli(
            "--stats is required when --insts/--vars/--hot is given".to_string(),
        ));
    }

    let xml = read_source(cli.source.as_deref())?;
    let mut input = open_input(cli.input.as_deref())?;
    let mut output = io::stdout().lock();

    let outcome = ippcode::run_str(&xml, &mut *input, &mut output)?;

    if let Some(stats_path) = &cli.stats {
        write_stats(stats_path, &stat_tokens, &outcome.stats)?;
    }

    Ok(outcome.return_code)
}

/// Interleaves the three repeatable stat flags by the order they actually
/// appeared on the command line, since clap tracks each flag's occurrences
/// independently.
fn stat_tokens_in_order(matches: &clap::ArgMatches) -> Vec<StatToken> {
    let mut tokens: Vec<(usize, StatToken)> = Vec::new();
    for (name, token) in [
        ("insts", StatToken::Insts),
        ("vars", StatToken::Vars),
        ("hot", StatToken::Hot),
    ] {
        if let Some(indices) = matches.indices_of(name) {
            tokens.extend(indices.map(|i| (i, token)));
        }
    }
    tokens.sort_by_key(|(i, _)| *i);
    tokens.into_iter().map(|(_, t)| t).collect()
}

/// Rejects `--source`/`--input`/`--stats` if any was given more than once;
/// clap's default `ArgAction::Set` would otherwise silently keep the last
/// occurrence.
fn reject_duplicate_flags(matches: &clap::ArgMatches) -> Result<(), Error> {
    for name in ["source", "input", "stats"] {
        if matches.indices_of(name).map(|i| i.count()).unwrap_or(0) > 1 {
            return Err(Error::Cli(format!("--{} may only be given once", name)));
        }
    }
    Ok(())
}

fn read_source(path: Option<&std::path::Path>) -> Result<String, Error> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| Error::IoMissing {
            path: path.to_path_buf(),
            source: e,
        }),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map_err(|e| Error::IoMissing {
                path: PathBuf::from("<stdin>"),
                source: e,
            })?;
            Ok(buf)
        }
    }
}

fn open_input(path: Option<&std::path::Path>) -> Result<Box<dyn BufRead>, Error> {
    match path {
        Some(path) => {
            let file = File::open(path).map_err(|e| Error::IoMissing {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn write_stats(path: &std::path::Path, tokens: &[StatToken], stats: &ippcode::stats::Stats) -> Result<(), Error> {
    let mut file = File::create(path).map_err(|e| Error::IoWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    for token in tokens {
        let value = match token {
            StatToken::Insts => stats.insts(),
            StatToken::Vars => stats.max_vars() as u64,
            StatToken::Hot => stats.hot() as u64,
        };
        writeln!(file, "{}", value).map_err(|e| Error::IoWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
