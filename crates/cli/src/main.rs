use std::process::ExitCode;

fn main() -> ExitCode {
    sge_cli::run()
}
