mod app;
mod commands;
mod plugins;

use std::process::ExitCode;

fn main() -> ExitCode {
    app::run()
}
