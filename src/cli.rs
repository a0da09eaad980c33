use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::printer::ModelFamily;

// ///////////// //
// CLI interface //
// ///////////// //

/// prig - Detects USB photo printers, registers them with CUPS and keeps printing test images until they are unplugged.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file, instead of /etc/prig/config.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watches for printers and tests them until stopped (the default).
    Run,
    /// Lists the connected supported printers.
    Detect,
    /// Prints one image on an existing queue and waits for the job to finish.
    Print {
        queue: String,
        image: PathBuf,
        /// Option set to print with.
        #[arg(long, value_enum, default_value = "canon")]
        family: ModelFamily,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default() {
        let cli = Cli::parse_from(["prig"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_print_command() {
        let cli = Cli::parse_from(["prig", "-v", "print", "prig_dnp_qw410", "/tmp/card.png", "--family", "dnp"]);

        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Print { queue, image, family }) => {
                assert_eq!(queue, "prig_dnp_qw410");
                assert_eq!(image, PathBuf::from("/tmp/card.png"));
                assert_eq!(family, ModelFamily::Dnp);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
