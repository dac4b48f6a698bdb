use std::process::ExitCode;

fn main() -> ExitCode {
    saathi_cli::run()
}
