//! Tool descriptions for `<tool> --desc` and the tool list.

use clap::CommandFactory;

use crate::cli::Cli;

/// Tool named on the command line when `--desc` follows it.
pub fn requested(args: &[String]) -> Option<&str> {
    let mut rest = args.iter().skip(1).skip_while(|a| a.starts_with('-'));
    let tool = rest.next()?;
    rest.any(|a| a == "--desc").then_some(tool.as_str())
}

/// One-line description of `tool`.
pub fn description(tool: &str) -> Option<String> {
    Cli::command()
        .find_subcommand(tool)
        .and_then(|c| c.get_about().map(|a| a.to_string()))
}

/// Every tool with its description.
pub fn tool_list() -> String {
    let cmd = Cli::command();
    let mut out =
        String::from("Usage: k8s-diagnostics-toolbox [-v...] <tool> [args...]\n\nTools:\n");
    for sub in cmd.get_subcommands() {
        let about = sub.get_about().map(|a| a.to_string()).unwrap_or_default();
        out.push_str(&format!("  {:<29} {}\n", sub.get_name(), about));
    }
    out.push_str("\nRun '<tool> --help' for the options of a tool.\n");
    out
}
