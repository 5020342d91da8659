//! A small finite element pipeline on two-dimensional meshes.
//!
//! Meshes and reference elements are combined into function spaces with boundary conditions.
//! Problems are posed as pointwise weak forms, assembled into sparse systems and solved with a
//! direct solver or Newton's method. Transient problems are advanced with the θ-method.
pub mod assembly;
pub mod connectivity;
pub mod dual;
pub mod element;
pub mod error;
pub mod field;
pub mod form;
pub mod mesh;
pub mod partition;
pub mod quadrature;
pub mod solve;
pub mod space;
pub mod timestep;

pub mod optimize {
    pub use galerkin_optimize::*;
}

pub use galerkin_traits::Real;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
