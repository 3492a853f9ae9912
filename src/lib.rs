pub mod core;
pub mod elimination;
pub mod error;
pub mod linalg;
pub mod linear;
pub mod logger;
pub mod marginals;

pub use elimination::Factorization;
pub use error::{MarginalsError, MarginalsResult};
pub use logger::{init_logger, init_logger_with_level};
pub use marginals::{JointMarginal, Marginals};
