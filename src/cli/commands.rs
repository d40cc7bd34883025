use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Two-stage container image pipeline for the risk_model service
#[derive(Parser, Debug)]
#[command(
    name = "riskbox",
    about = "Two-stage container image pipeline for the risk_model service",
    version,
    long_about = "riskbox compiles the risk_model binary in a pinned toolchain image and \
                  ships it alone in a minimal runtime image. The pipeline is described by a \
                  riskbox.toml spec (or the built-in default), rendered to a multi-stage \
                  Dockerfile and executed against a Docker-compatible engine."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Render the multi-stage Dockerfile",
        long_about = "Renders the pipeline spec into a Dockerfile with `builder` and \
                      `production` stages without contacting the container engine.\n\n\
                      Examples:\n  \
                      riskbox render\n  \
                      riskbox render /path/to/risk_model -o Dockerfile\n  \
                      riskbox render --format yaml"
    )]
    Render(RenderArgs),

    #[command(about = "Check the pipeline spec against the image rules")]
    Validate(ValidateArgs),

    #[command(
        about = "Build, verify and tag the production image",
        long_about = "Builds the builder stage, then the production stage, then checks the \
                      production image: artifact present and identical to the builder's, \
                      no toolchain, no source tree, trust store present, smaller than the \
                      builder.\n\n\
                      Examples:\n  \
                      riskbox build\n  \
                      riskbox build --tag registry.example.com/risk_model:1.4.2\n  \
                      riskbox build --no-cache --keep-builder --format json"
    )]
    Build(BuildArgs),

    #[command(
        about = "Run the production image in the foreground",
        long_about = "Runs the production image with its entrypoint and exits with the \
                      container's exit code. Ctrl-C is forwarded as SIGTERM.\n\n\
                      Examples:\n  \
                      riskbox run\n  \
                      riskbox run --tag risk_model:1.4.2 -- --help"
    )]
    Run(RunArgs),

    #[command(about = "Build the builder stage twice without cache and compare artifacts")]
    VerifyReproducible(ReproducibleArgs),

    #[command(about = "Check container engine availability")]
    Health(FormatArgs),

    #[command(about = "Show the effective configuration")]
    Config(FormatArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct SourceArgs {
    #[arg(
        value_name = "SOURCE",
        help = "Path to the risk_model source tree (defaults to current directory)"
    )]
    pub source: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        value_name = "FILE",
        help = "Pipeline spec file (.toml, .yaml, .json); defaults to <SOURCE>/riskbox.toml"
    )]
    pub spec: Option<PathBuf>,
}

impl SourceArgs {
    pub fn source_root(&self) -> PathBuf {
        self.source.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "dockerfile",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, help = "Print the .dockerignore for the source tree instead")]
    pub dockerignore: bool,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(short = 't', long, value_name = "TAG", help = "Production image tag")]
    pub tag: Option<String>,

    #[arg(long, help = "Build the builder stage without the layer cache")]
    pub no_cache: bool,

    #[arg(long, help = "Keep the builder image after a successful build")]
    pub keep_builder: bool,

    #[arg(long, help = "Pull newer versions of the base images")]
    pub pull: bool,

    #[arg(long, value_name = "SECONDS", help = "Per-stage build timeout")]
    pub timeout: Option<u64>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Report format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the report to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(short = 't', long, value_name = "TAG", help = "Image to run")]
    pub tag: Option<String>,

    #[arg(long, help = "Keep the stopped container")]
    pub keep: bool,

    #[arg(last = true, value_name = "ARGS", help = "Arguments passed to the entrypoint")]
    pub args: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ReproducibleArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Report format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct FormatArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}
