use std::process::ExitCode;

fn main() -> ExitCode {
    fakturo_cli::run()
}
