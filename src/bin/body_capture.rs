//! Captures color frames annotated with tracked body joints.

use clap::Parser;
use rgbd_capture::cli::{self, Args};

fn main() {
    cli::init_logging();
    let args = Args::parse();
    let stop = cli::install_stop_handler();

    let result = cli::run_body(&args, &stop);
    std::process::exit(cli::report(&result));
}
