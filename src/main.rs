use std::process::ExitCode;

fn main() -> ExitCode {
    nobjc::run_cli()
}
