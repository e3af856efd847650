use derive_more::{Display, From};

pub type Result<T> = core::result::Result<T, TerrainError>;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum TerrainError {
    /// A [`TerrainConfig`](crate::config::TerrainConfig) field is outside its valid range.
    InvalidConfig(&'static str),
    /// A field buffer does not hold `(segments + 1)³` values.
    FieldSizeMismatch { expected: usize, found: usize },
    #[from]
    Shape(ndarray::ShapeError),
}

impl std::error::Error for TerrainError {}
