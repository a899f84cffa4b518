use pbd_core::logging;

mod cli;

/// Exit status when the run finished but too few items succeeded.
const EXIT_BELOW_THRESHOLD: i32 = 2;

#[tokio::main]
async fn main() {
    // File log under XDG state; stderr if the state dir is unusable.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    match cli::run_from_args().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_BELOW_THRESHOLD),
        Err(err) => {
            eprintln!("pbd error: {:#}", err);
            std::process::exit(1);
        }
    }
}
