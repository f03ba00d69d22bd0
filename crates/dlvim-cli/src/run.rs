use std::path::{Path, PathBuf};
use std::sync::Arc;

use dlvim_rpc::TcpDialer;
use dlvim_session::{Editor, SessionController};
use miette::IntoDiagnostic;
use tokio::io::BufReader;

use crate::{CliAction, CliOpts, DlvimConfig, TerminalEditor};

/// Opens the session requested on the command-line, then runs the command
/// loop over the standard input until the session ends.
pub fn evaluate(cli: CliOpts) -> miette::Result<()> {
    let config = match cli.config {
        Some(config) => DlvimConfig::parse(&config)?,
        None => DlvimConfig::default(),
    };

    let cwd = std::env::current_dir().into_diagnostic()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async move {
        let editor = Arc::new(TerminalEditor::stdio());

        let controller = SessionController::new(
            TcpDialer,
            editor.clone() as Arc<dyn Editor>,
            config.into_session_config(),
        );

        let opened = match cli.action {
            CliAction::Start { dir, flags } => controller.start(&dir_or(dir, &cwd), &flags).await,
            CliAction::Debug { dir, flags } => controller.debug(&dir_or(dir, &cwd), &flags).await,
            CliAction::Attach { pid, flags } => controller.attach(&pid, &flags, &cwd).await,
            CliAction::Connect { addr, dir } => controller.connect(&addr, &dir_or(dir, &cwd)).await,
        };

        opened.into_diagnostic()?;

        crate::run_repl(&controller, &*editor, BufReader::new(tokio::io::stdin())).await
    })
}

fn dir_or(dir: Option<PathBuf>, cwd: &Path) -> PathBuf {
    match dir {
        Some(dir) if dir.is_relative() => cwd.join(dir),
        Some(dir) => dir,
        None => cwd.to_path_buf(),
    }
}
