use std::process::ExitCode;

fn main() -> ExitCode {
    codewiki::cli::run()
}
