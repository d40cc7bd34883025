use riskbox::cli::commands::{CliArgs, Commands};
use riskbox::cli::handlers::{
    handle_build, handle_config, handle_health, handle_render, handle_run, handle_validate,
    handle_verify_reproducible,
};
use riskbox::util::{init_logging, LoggingConfig};
use riskbox::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("riskbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Render(render_args) => handle_render(render_args),
        Commands::Validate(validate_args) => handle_validate(validate_args),
        Commands::Build(build_args) => handle_build(build_args, args.quiet).await,
        Commands::Run(run_args) => handle_run(run_args).await,
        Commands::VerifyReproducible(repro_args) => {
            handle_verify_reproducible(repro_args, args.quiet).await
        }
        Commands::Health(format_args) => handle_health(format_args).await,
        Commands::Config(format_args) => handle_config(format_args),
    };

    std::process::exit(exit_code);
}
