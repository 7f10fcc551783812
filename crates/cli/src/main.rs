use std::process::ExitCode;

fn main() -> ExitCode {
    tablebook_cli::run()
}
