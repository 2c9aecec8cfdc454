#[derive(thiserror::Error, Debug)]
pub enum CovidCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("TOML error in config file")]
    TomlError(#[from] toml::de::Error),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type CovidCliResult<T> = Result<T, CovidCliError>;
