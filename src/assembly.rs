//! Assembly of residual vectors and Jacobian matrices from weak forms.
use crate::mesh::InvalidTagError;
use crate::quadrature::QuadratureError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod buffers;
pub mod global;
pub mod local;
pub mod operators;

pub use global::{apply_dirichlet_bc_csr, apply_dirichlet_bc_residual, LinearSystem, SystemAssembler};

/// Options controlling how forms are assembled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    /// Total polynomial degree integrated exactly on each cell. Chosen from the element degrees
    /// when unset.
    pub quadrature_degree: Option<usize>,
    /// Compute cell contributions on the rayon thread pool.
    pub parallel: bool,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            quadrature_degree: None,
            parallel: false,
        }
    }
}

/// A vector or matrix whose size disagrees with the DOF map it is used with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMismatchError {
    pub context: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl DimensionMismatchError {
    pub fn new(context: &'static str, expected: usize, actual: usize) -> Self {
        Self {
            context,
            expected,
            actual,
        }
    }

    /// Returns an error unless `actual == expected`.
    pub fn check(context: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::new(context, expected, actual))
        }
    }
}

impl Display for DimensionMismatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dimension mismatch in {}: expected {}, got {}",
            self.context, self.expected, self.actual
        )
    }
}

impl Error for DimensionMismatchError {}

#[derive(Debug)]
pub enum AssemblyError {
    DimensionMismatch(DimensionMismatchError),
    InvalidTag(InvalidTagError),
    Quadrature(QuadratureError),
    /// Evaluating the basis or the form failed on a cell, typically because of a degenerate cell.
    Element { cell: usize, source: eyre::Report },
    /// Another worker of a partitioned assembly failed, so no consistent result exists.
    WorkerFailed { rank: usize },
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch(err) => write!(f, "{}", err),
            Self::InvalidTag(err) => write!(f, "{}", err),
            Self::Quadrature(err) => write!(f, "failed to construct quadrature: {}", err),
            Self::Element { cell, source } => write!(f, "assembly failed on cell {}: {}", cell, source),
            Self::WorkerFailed { rank } => write!(f, "assembly failed on worker {}", rank),
        }
    }
}

impl Error for AssemblyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DimensionMismatch(err) => Some(err),
            Self::InvalidTag(err) => Some(err),
            Self::Quadrature(err) => Some(err),
            Self::Element { source, .. } => Some(&**source),
            Self::WorkerFailed { .. } => None,
        }
    }
}

impl From<DimensionMismatchError> for AssemblyError {
    fn from(err: DimensionMismatchError) -> Self {
        Self::DimensionMismatch(err)
    }
}

impl From<InvalidTagError> for AssemblyError {
    fn from(err: InvalidTagError) -> Self {
        Self::InvalidTag(err)
    }
}

impl From<QuadratureError> for AssemblyError {
    fn from(err: QuadratureError) -> Self {
        Self::Quadrature(err)
    }
}
