pub mod matrix;
pub(crate) mod utils;

pub use matrix::{
    LinalgError, cholesky, cholesky_inverse, cholesky_solve, jacobi, jacobi_sort, square,
    symmetric_eigen,
};
