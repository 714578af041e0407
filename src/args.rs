//! Command-line argument parsing and processing.
//!
//! Hand-rolled parsing into a [`CliAction`]; the binary stays dependency-free
//! on the CLI side. Unknown arguments fall back to help output rather than a
//! bare error.

use crate::theme::Theme;

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon.
    Run { debug_enabled: bool },
    /// Toggle the current theme once and exit.
    Toggle,
    /// Apply a specific theme once and exit.
    SetTheme { theme: Theme },
    /// Show the configured location and the next computed transition.
    Status,
    /// Display help information and exit.
    ShowHelp,
    /// Display version information and exit.
    ShowVersion,
    /// Show help due to unknown arguments and exit.
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse the process arguments (without the program name).
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse an argument list into a structured action.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut command: Option<String> = None;
        let mut unknown_arg_found = false;

        for arg in args {
            match arg.as_ref() {
                "--debug" | "-d" => debug_enabled = true,
                "--help" | "-h" => display_help = true,
                "--version" | "-V" => display_version = true,
                "run" | "toggle" | "light" | "dark" | "status" => {
                    if command.is_some() {
                        unknown_arg_found = true;
                    } else {
                        command = Some(arg.as_ref().to_string());
                    }
                }
                _ => unknown_arg_found = true,
            }
        }

        let action = if display_help {
            CliAction::ShowHelp
        } else if display_version {
            CliAction::ShowVersion
        } else if unknown_arg_found {
            CliAction::ShowHelpDueToError
        } else {
            match command.as_deref() {
                None | Some("run") => CliAction::Run { debug_enabled },
                Some("toggle") => CliAction::Toggle,
                Some("light") => CliAction::SetTheme {
                    theme: Theme::Light,
                },
                Some("dark") => CliAction::SetTheme { theme: Theme::Dark },
                Some("status") => CliAction::Status,
                Some(_) => CliAction::ShowHelpDueToError,
            }
        };

        ParsedArgs { action }
    }
}

/// Display version information.
pub fn display_version_info() {
    println!("nightfall v{}", env!("CARGO_PKG_VERSION"));
}

/// Display help information.
pub fn display_help() {
    println!("nightfall v{}", env!("CARGO_PKG_VERSION"));
    println!("Automatic light/dark appearance switching from sunrise and sunset");
    println!();
    println!("Usage: nightfall [COMMAND] [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  run      Run the daemon (default)");
    println!("  toggle   Toggle the current theme and exit");
    println!("  light    Apply the light theme and exit");
    println!("  dark     Apply the dark theme and exit");
    println!("  status   Show the configured location and next transition");
    println!();
    println!("Options:");
    println!("  -d, --debug    Enable detailed debug output");
    println!("  -h, --help     Print help");
    println!("  -V, --version  Print version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(args: &[&str]) -> CliAction {
        ParsedArgs::parse(args.iter().copied()).action
    }

    #[test]
    fn no_arguments_runs_the_daemon() {
        assert_eq!(
            action(&[]),
            CliAction::Run {
                debug_enabled: false
            }
        );
    }

    #[test]
    fn debug_flag_is_recognized() {
        assert_eq!(
            action(&["--debug"]),
            CliAction::Run {
                debug_enabled: true
            }
        );
        assert_eq!(
            action(&["run", "-d"]),
            CliAction::Run {
                debug_enabled: true
            }
        );
    }

    #[test]
    fn subcommands_parse() {
        assert_eq!(action(&["toggle"]), CliAction::Toggle);
        assert_eq!(
            action(&["light"]),
            CliAction::SetTheme {
                theme: Theme::Light
            }
        );
        assert_eq!(action(&["dark"]), CliAction::SetTheme { theme: Theme::Dark });
        assert_eq!(action(&["status"]), CliAction::Status);
    }

    #[test]
    fn help_wins_over_other_arguments() {
        assert_eq!(action(&["toggle", "--help"]), CliAction::ShowHelp);
    }

    #[test]
    fn unknown_arguments_show_help() {
        assert_eq!(action(&["--frobnicate"]), CliAction::ShowHelpDueToError);
        assert_eq!(action(&["toggle", "dark"]), CliAction::ShowHelpDueToError);
    }
}
