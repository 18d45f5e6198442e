use gsswmm_utils::{diagram, inp::InpSections};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install the log subscriber");
    }

    // the diagram goes next to the model unless an output path is given
    let args: Vec<String> = std::env::args().collect();
    let Some(model) = args.get(1).map(PathBuf::from) else {
        eprintln!("usage: gsswmm_diagram <model.inp> [output.mmd]");
        return ExitCode::from(2);
    };
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| model.with_extension("mmd"));

    let sections = match InpSections::read(&model) {
        Ok(sections) => sections,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::write(&output, diagram::render(&sections)) {
        tracing::error!("cannot write {}: {e}", output.display());
        return ExitCode::FAILURE;
    }
    println!("diagram written to {}", output.display());
    ExitCode::SUCCESS
}
