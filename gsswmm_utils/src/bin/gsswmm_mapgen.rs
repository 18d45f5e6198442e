use gsswmm::config::MAPPING_FILE;
use gsswmm_utils::discover;
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

    // parse model path and (optional) mapping path from command line arguments
    let args: Vec<String> = std::env::args().collect();
    let Some(model) = args.get(1).map(PathBuf::from) else {
        eprintln!("usage: gsswmm_mapgen <model.inp> [output.json]");
        return ExitCode::from(2);
    };
    let output = match args.get(2) {
        Some(path) => PathBuf::from(path),
        None => model
            .parent()
            .map(|dir| dir.join(MAPPING_FILE))
            .unwrap_or_else(|| PathBuf::from(MAPPING_FILE)),
    };

    let mapping = match discover::generate(&model) {
        Ok(mapping) => mapping,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = discover::write(&mapping, &output) {
        tracing::error!("{e}");
        return ExitCode::FAILURE;
    }

    println!("mapping written to {}", output.display());
    println!("inputs ({}):", mapping.inputs().len());
    for d in mapping.inputs() {
        println!(
            "  [{}] {} {} {}",
            d.interface_index, d.object_type_name, d.element_name, d.property_name
        );
    }
    println!("outputs ({}):", mapping.outputs().len());
    for d in mapping.outputs() {
        println!(
            "  [{}] {} {} {}",
            d.interface_index, d.object_type_name, d.element_name, d.property_name
        );
    }
    ExitCode::SUCCESS
}
