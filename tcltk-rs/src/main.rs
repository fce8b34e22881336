use tcltk::cli;
use tcltk::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TCLTK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tcltk: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    let (config, errors) = Config::from_env();
    for e in &errors {
        eprintln!("tcltk: warning: {e}");
    }

    // Interpreters and the scheduler task stay on this thread.
    let local = tokio::task::LocalSet::new();
    let print_result = args.command.is_some();
    match local.run_until(cli::run(args, &config, &local)).await {
        Ok(result) => {
            if print_result && !result.is_empty() {
                println!("{result}");
            }
        }
        Err(e) => {
            eprintln!("tcltk: {e}");
            std::process::exit(1);
        }
    }
}
