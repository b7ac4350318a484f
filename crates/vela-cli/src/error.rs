use snafu::Snafu;
use vela_ingest::config::ConfigError;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display(
        "Failed to load cluster configuration from {path}: {source}. \
         Configuration errors are fatal at startup."
    ))]
    Config { path: String, source: ConfigError },

    #[snafu(display("System clock is before the Unix epoch"))]
    Clock,
}
