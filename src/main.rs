use sharp_mutant::error::EngineError;

/// Entry point for the `sharp-mutant` binary.
fn main() {
    match sharp_mutant::cli::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<EngineError>()
                .map(EngineError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}
