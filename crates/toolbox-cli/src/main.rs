//! k8s-diagnostics-toolbox entry point.

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use toolbox_cli::cli::Cli;
use toolbox_cli::{commands, desc};
use toolbox_core::{Config, Toolbox, ToolboxError};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Some(tool) = desc::requested(&args) {
        match desc::description(tool) {
            Some(d) => println!("{}", d),
            None => {
                eprint!("{}", desc::tool_list());
                std::process::exit(1);
            }
        }
        return;
    }

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            eprintln!("Unknown tool.\n");
            eprint!("{}", desc::tool_list());
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    // Logs go to stderr, stdout carries results
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        eprint!("{}", desc::tool_list());
        std::process::exit(1);
    };

    let toolbox = match Config::from_env().and_then(Toolbox::from_config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let pod = commands::pod_of(&command).map(String::from);
    match commands::execute(command, &toolbox) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            if let (ToolboxError::ContainerNotFound(_), Some(pod)) = (&e, &pod) {
                commands::print_suggestions(&toolbox, pod);
            }
            std::process::exit(e.exit_code());
        }
    }
}
