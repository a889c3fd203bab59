use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use rand_distr::uniform::Error as UniformError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    /// A parameter vector holds a different amount of tensors than the model declares.
    TensorCountMismatch { got: usize, expected: usize },
    /// A tensor of a parameter vector doesn't have the shape of the model's slot at its position.
    ShapeMismatch {
        index: usize,
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// Two buffers that must agree in length don't.
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// An unsupported or invalid configuration value.
    Config(String),
    /// A dataset partition is empty or its files are missing or corrupt.
    DataUnavailable(String),
    /// A parameter initializer couldn't be built.
    Init(String),
    Io(io::Error),
}

impl MlErr {
    /// Whether this error means the given parameters can't be loaded into the model.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            MlErr::TensorCountMismatch { .. } | MlErr::ShapeMismatch { .. }
        )
    }
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::TensorCountMismatch { got, expected } => write!(
                f,
                "shape mismatch: got {got} tensors, the model declares {expected}"
            ),
            MlErr::ShapeMismatch {
                index,
                name,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch at tensor {index} ({name}): got {got:?}, expected {expected:?}"
            ),
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Config(msg) => write!(f, "invalid configuration: {msg}"),
            MlErr::DataUnavailable(msg) => write!(f, "data unavailable: {msg}"),
            MlErr::Init(msg) => write!(f, "failed to initialize parameters: {msg}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::Init(value.to_string())
    }
}
