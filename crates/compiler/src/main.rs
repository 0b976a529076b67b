//! pcc CLI.
//!
//! `pcc [options] C_FILE [C_FILE...]` compiles the inputs to VM assembly.

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{Shell, generate};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use pcc::CompilerConfig;

#[derive(ClapParser)]
#[command(name = "pcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "pcc - C compiler for the GPIO script VM", long_about = None)]
struct Cli {
    /// Input C source files
    #[arg(value_name = "C_FILE")]
    filenames: Vec<PathBuf>,

    /// Place the output into FILE ("-" for stdout)
    #[arg(short = 'o', value_name = "FILE")]
    out_filename: Option<PathBuf>,

    /// Add comments to the assembly output
    #[arg(short = 'c')]
    comments: bool,

    /// Do not reduce the assembly output
    #[arg(short = 'n')]
    no_reduce: bool,

    /// Dump parsed AST nodes alongside diagnostics
    #[arg(short = 'd')]
    debug: bool,

    /// Generate shell completion scripts and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pcc", &mut io::stdout());
        return;
    }

    if cli.filenames.is_empty() {
        let _ = Cli::command().print_help();
        process::exit(-1);
    }

    let config = CompilerConfig::new()
        .with_reduce(!cli.no_reduce)
        .with_comments(cli.comments)
        .with_debug(cli.debug);

    let mut cc = match pcc::compile_files(&cli.filenames, &config) {
        Ok(cc) => cc,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(-1);
        }
    };

    // warnings from a successful compilation
    for diagnostic in cc.take_diagnostics() {
        eprintln!("{}", diagnostic);
    }

    let out_filename = cli.out_filename.unwrap_or_else(|| {
        // default: stem of the last input file plus ".s"
        let last = cli.filenames.last().expect("inputs are non-empty");
        let stem = last.file_stem().unwrap_or_default();
        PathBuf::from(format!("{}.s", stem.to_string_lossy()))
    });

    let asm = cc.encode_asm(cli.comments);
    if out_filename.as_os_str() == "-" {
        println!("{}", asm);
    } else if let Err(e) = write_output(&out_filename, &asm) {
        eprintln!("{}: {}", out_filename.display(), e);
        process::exit(-1);
    }

    eprintln!(
        "\nVM variables used: {}/150, tags: {}/50.",
        cc.var_count(),
        cc.tag_count()
    );
    if cc.var_count() > 150 || cc.tag_count() > 50 {
        eprintln!("warning: program exceeds the VM limits; the daemon may reject it");
    }
}

fn write_output(path: &PathBuf, asm: &str) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", asm)
}
