use std::process::ExitCode;

fn main() -> ExitCode {
    tellr_cli::run()
}
