//! Resident launcher binary. The host binary's own program image: on first
//! run it is [`fim::bootstrap`]; on every run after that it resolves
//! configuration, composes the filesystem stack, and hands off to the
//! contained application.

use clap::Parser;

use fim::config::FimConfig;
use fim::process::{self, Launcher, OutputPolicy};
use fim::stack::FilesystemStack;

/// The resident launcher. Ordinary invocations forward their full argv to
/// the contained application; `--print-offset` is a maintenance escape
/// hatch that reports the resolved filesystem offset and exits.
#[derive(Parser, Debug)]
#[command(name = "fim", disable_help_subcommand = true)]
struct Cli {
    /// Print the resolved FIM_OFFSET and exit without mounting anything.
    #[arg(long)]
    print_offset: bool,

    /// Arguments forwarded to the contained application's entry point.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    app_args: Vec<String>,
}

fn main() {
    fim::init_logging();

    if !fim::bootstrap::already_bootstrapped() {
        let argv: Vec<String> = std::env::args().skip(1).collect();
        if let Err(e) = fim::bootstrap::run(&argv) {
            eprintln!("fim: bootstrap failed: {e}");
            std::process::exit(1);
        }
        unreachable!("bootstrap::run only returns on error");
    }

    let cli = Cli::parse();

    let config = match FimConfig::resolve() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fim: {e}");
            std::process::exit(1);
        }
    };

    if cli.print_offset {
        println!("{}", config.offset_filesystem);
        return;
    }

    let stack = match FilesystemStack::compose(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fim: failed to compose filesystem: {e}");
            std::process::exit(1);
        }
    };

    let entry_point = config.dir_static().join("boot");
    let child = Launcher::at(entry_point.clone())
        .args(&cli.app_args)
        .stdio(OutputPolicy::Inherit)
        .spawn();

    let exit_code = match child {
        Ok(mut child) => process::wait(&mut child),
        Err(e) => {
            stack.dispose();
            eprintln!("fim: failed to launch '{}': {e}", entry_point.display());
            std::process::exit(1);
        }
    };

    stack.dispose();
    // `wait` only returns `None` on a signal death or wait failure, neither
    // of which has a code to forward; exit 1 covers both the same way a
    // signalled shell command does.
    std::process::exit(exit_code.unwrap_or(1));
}
