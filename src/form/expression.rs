//! Weak forms built at runtime from expression trees.
//!
//! An [`Expr`] is interpreted at every quadrature point. Since interpretation is generic over the
//! [`FormScalar`], expression forms get automatic Jacobians just like compiled forms.
use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Point2, Scalar};
use crate::Real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

/// A known function of space and time.
pub type DataFunction<T> = Arc<dyn Fn(&Point2<T>, T) -> T + Send + Sync>;

/// A pointwise scalar expression in the unknowns, their gradients and known data.
#[derive(Clone)]
pub enum Expr<T: Scalar> {
    Constant(T),
    /// Component of the physical coordinates.
    Coordinate(usize),
    Time,
    Value {
        field: usize,
        component: usize,
    },
    /// `d u_component / d x_direction`.
    Gradient {
        field: usize,
        component: usize,
        direction: usize,
    },
    /// Value of a field in an auxiliary coefficient set.
    Aux {
        set: usize,
        field: usize,
        component: usize,
    },
    Data(DataFunction<T>),
    Neg(Box<Expr<T>>),
    Add(Box<Expr<T>>, Box<Expr<T>>),
    Sub(Box<Expr<T>>, Box<Expr<T>>),
    Mul(Box<Expr<T>>, Box<Expr<T>>),
    Div(Box<Expr<T>>, Box<Expr<T>>),
    Sqrt(Box<Expr<T>>),
    Pow(Box<Expr<T>>, T),
}

impl<T: Scalar + Debug> Debug for Expr<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "{:?}", c),
            Self::Coordinate(i) => write!(f, "x[{}]", i),
            Self::Time => write!(f, "t"),
            Self::Value { field, component } => write!(f, "u{}[{}]", field, component),
            Self::Gradient {
                field,
                component,
                direction,
            } => write!(f, "grad(u{})[{}, {}]", field, component, direction),
            Self::Aux { set, field, component } => write!(f, "aux{}.u{}[{}]", set, field, component),
            Self::Data(_) => write!(f, "data(x, t)"),
            Self::Neg(a) => write!(f, "-({:?})", a),
            Self::Add(a, b) => write!(f, "({:?} + {:?})", a, b),
            Self::Sub(a, b) => write!(f, "({:?} - {:?})", a, b),
            Self::Mul(a, b) => write!(f, "({:?} * {:?})", a, b),
            Self::Div(a, b) => write!(f, "({:?} / {:?})", a, b),
            Self::Sqrt(a) => write!(f, "sqrt({:?})", a),
            Self::Pow(a, p) => write!(f, "({:?})^{:?}", a, p),
        }
    }
}

impl<T: Real> Expr<T> {
    pub fn constant(value: T) -> Self {
        Self::Constant(value)
    }

    pub fn x() -> Self {
        Self::Coordinate(0)
    }

    pub fn y() -> Self {
        Self::Coordinate(1)
    }

    pub fn time() -> Self {
        Self::Time
    }

    /// Value of a scalar field.
    pub fn value(field: usize) -> Self {
        Self::component(field, 0)
    }

    pub fn component(field: usize, component: usize) -> Self {
        Self::Value { field, component }
    }

    /// Partial derivative of a scalar field.
    pub fn grad(field: usize, direction: usize) -> Self {
        Self::grad_component(field, 0, direction)
    }

    pub fn grad_component(field: usize, component: usize, direction: usize) -> Self {
        Self::Gradient {
            field,
            component,
            direction,
        }
    }

    pub fn aux(set: usize, field: usize) -> Self {
        Self::Aux {
            set,
            field,
            component: 0,
        }
    }

    pub fn data(f: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        Self::Data(Arc::new(f))
    }

    pub fn sqrt(self) -> Self {
        Self::Sqrt(Box::new(self))
    }

    pub fn powf(self, exponent: T) -> Self {
        Self::Pow(Box::new(self), exponent)
    }

    /// Whether the expression depends on the unknowns.
    pub fn depends_on_unknowns(&self) -> bool {
        match self {
            Self::Value { .. } | Self::Gradient { .. } => true,
            Self::Constant(_) | Self::Coordinate(_) | Self::Time | Self::Aux { .. } | Self::Data(_) => false,
            Self::Neg(a) | Self::Sqrt(a) | Self::Pow(a, _) => a.depends_on_unknowns(),
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) | Self::Div(a, b) => {
                a.depends_on_unknowns() || b.depends_on_unknowns()
            }
        }
    }

    pub fn eval<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>]) -> S {
        match self {
            Self::Constant(c) => S::from_real(*c),
            Self::Coordinate(i) => S::from_real(ctx.x[*i]),
            Self::Time => S::from_real(ctx.time),
            Self::Value { field, component } => u[*field].value[*component],
            Self::Gradient {
                field,
                component,
                direction,
            } => u[*field].grad[(*component, *direction)],
            Self::Aux { set, field, component } => S::from_real(ctx.aux[set * u.len() + field].value[*component]),
            Self::Data(f) => S::from_real(f(&ctx.x, ctx.time)),
            Self::Neg(a) => -a.eval(ctx, u),
            Self::Add(a, b) => a.eval(ctx, u) + b.eval(ctx, u),
            Self::Sub(a, b) => a.eval(ctx, u) - b.eval(ctx, u),
            Self::Mul(a, b) => a.eval(ctx, u) * b.eval(ctx, u),
            Self::Div(a, b) => a.eval(ctx, u) / b.eval(ctx, u),
            Self::Sqrt(a) => <S as FormScalar<T>>::sqrt(a.eval(ctx, u)),
            Self::Pow(a, p) => <S as FormScalar<T>>::powf(a.eval(ctx, u), *p),
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Real> $trait for Expr<T> {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                Self::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl<T: Real> Neg for Expr<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::Neg(Box::new(self))
    }
}

/// A weak form whose `f0` and `f1` entries are given by expressions. Missing entries are zero.
#[derive(Debug, Clone)]
pub struct ExpressionForm<T: Scalar> {
    num_fields: usize,
    f0: Vec<[Option<Expr<T>>; 2]>,
    f1: Vec<[[Option<Expr<T>>; 2]; 2]>,
    quadrature_degree: Option<usize>,
}

impl<T: Real> ExpressionForm<T> {
    pub fn new(num_fields: usize) -> Self {
        Self {
            num_fields,
            f0: vec![[None, None]; num_fields],
            f1: vec![[[None, None], [None, None]]; num_fields],
            quadrature_degree: None,
        }
    }

    /// Sets the coefficient of component `component` of the test function of `field`.
    pub fn f0(mut self, field: usize, component: usize, expr: Expr<T>) -> Self {
        self.f0[field][component] = Some(expr);
        self
    }

    /// Sets the coefficient of `d v_component / d x_direction` for the test function of `field`.
    pub fn f1(mut self, field: usize, component: usize, direction: usize, expr: Expr<T>) -> Self {
        self.f1[field][component][direction] = Some(expr);
        self
    }

    pub fn with_quadrature_degree(mut self, degree: usize) -> Self {
        self.quadrature_degree = Some(degree);
        self
    }
}

impl<T: Real> WeakForm<T> for ExpressionForm<T> {
    fn num_fields(&self) -> usize {
        self.num_fields
    }

    fn quadrature_degree(&self) -> Option<usize> {
        self.quadrature_degree
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        for (field, coefficients) in f.iter_mut().enumerate() {
            for (i, expr) in self.f0[field].iter().enumerate() {
                if let Some(expr) = expr {
                    coefficients.f0[i] = expr.eval(ctx, u);
                }
            }
            for (i, row) in self.f1[field].iter().enumerate() {
                for (j, expr) in row.iter().enumerate() {
                    if let Some(expr) = expr {
                        coefficients.f1[(i, j)] = expr.eval(ctx, u);
                    }
                }
            }
        }
    }
}
