//! Strata configuration check - Entry point

use std::process::ExitCode;

use strata_check::{help, parse_args, run, Command, EXIT_USAGE, VERSION};
use strata_config::EnvSnapshot;
use strata_telemetry::{init_logging, LogConfig};

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Check(args)) => args,
        Ok(Command::Help) => {
            print!("{}", help());
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("strata-check {VERSION}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Use --help for usage information");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let env = EnvSnapshot::from_process();

    let log_config = match LogConfig::from_env(args.log_service(&env)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{e}");
        return ExitCode::from(EXIT_USAGE);
    }

    let mut stdout = std::io::stdout().lock();
    ExitCode::from(run(&args, env, &mut stdout))
}
