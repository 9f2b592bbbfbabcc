use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("No tiles to process in {dir}")]
    NoTiles { dir: String },

    #[error("Batch finished with {errors} failed tile(s)")]
    BatchFailures { errors: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Library(#[from] satsr::Error),
}
