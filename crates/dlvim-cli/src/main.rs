#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use dlvim_cli::CliOpts;

use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("DLVIM_LOG")
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dlvim_cli::evaluate(cli) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
