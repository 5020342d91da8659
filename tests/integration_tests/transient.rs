use galerkin::assembly::operators::HeatForm;
use galerkin::element::LagrangeElement;
use galerkin::field::DiscreteField;
use galerkin::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use galerkin::nalgebra::{Point2, Vector2};
use galerkin::solve::SolverSettings;
use galerkin::space::{FunctionSpaceBuilder, MixedSpace};
use galerkin::timestep::{ThetaSettings, ThetaStepper};
use std::f64::consts::PI;
use std::sync::Arc;

fn mode(x: &Point2<f64>) -> f64 {
    f64::sin(PI * x.x) * f64::sin(PI * x.y)
}

fn heat_space(n: usize) -> Arc<MixedSpace<f64>> {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(n));
    let field = FunctionSpaceBuilder::new(mesh, LagrangeElement::q1())
        .dirichlet("boundary", |_, _| 0.0)
        .build()
        .unwrap();
    Arc::new(MixedSpace::single(field))
}

fn stepper(theta: f64, dt: f64, final_time: f64) -> ThetaStepper<f64, HeatForm<f64>> {
    let space = heat_space(16);
    let initial = DiscreteField::interpolate(space, &[&|x: &Point2<f64>| Vector2::new(mode(x), 0.0)]);
    let settings = ThetaSettings {
        theta,
        dt,
        start_time: 0.0,
        final_time,
    };
    ThetaStepper::new(initial, HeatForm::new(1.0), settings, SolverSettings::default())
}

/// Largest nodal deviation from the decaying eigenmode `exp(-2 pi^2 t) sin(pi x) sin(pi y)`.
fn max_error(u: &DiscreteField<f64>, t: f64) -> f64 {
    let decay = f64::exp(-2.0 * PI * PI * t);
    let nodal = u.nodal_values(0).unwrap();
    u.space()
        .mesh()
        .vertices()
        .iter()
        .zip(&nodal)
        .map(|(x, value)| (value.x - decay * mode(x)).abs())
        .fold(0.0, f64::max)
}

#[test]
fn heat_equation_decays_like_the_exact_eigenmode() {
    let mut backward_euler = stepper(1.0, 0.005, 0.05);
    let steps = backward_euler.collect_all().unwrap();
    assert_eq!(steps.len(), 10);
    let (u, t) = steps.last().unwrap();
    assert_eq!(*t, 0.05);
    let backward_euler_error = max_error(u, *t);
    assert!(backward_euler_error < 0.08, "backward Euler error {}", backward_euler_error);

    let mut crank_nicolson = stepper(0.5, 0.005, 0.05);
    let (u, t) = crank_nicolson.collect_all().unwrap().pop().unwrap();
    let crank_nicolson_error = max_error(&u, t);
    assert!(crank_nicolson_error < 0.015, "Crank-Nicolson error {}", crank_nicolson_error);
    assert!(crank_nicolson_error < backward_euler_error);
}

#[test]
fn final_step_is_shortened_to_hit_final_time() {
    let mut stepper = stepper(1.0, 0.005, 0.012);
    let times: Vec<f64> = stepper
        .collect_all()
        .unwrap()
        .into_iter()
        .map(|(_, t)| t)
        .collect();
    assert_eq!(times.len(), 3);
    assert!((times[0] - 0.005).abs() < 1e-15);
    assert!((times[1] - 0.01).abs() < 1e-15);
    assert_eq!(times[2], 0.012);
    assert_eq!(stepper.time(), 0.012);
    assert!(stepper.next().is_none());
}

#[test]
fn stepper_can_be_cancelled_and_restarted() {
    let mut stepper = stepper(0.5, 0.01, 0.1);
    let (first, t) = stepper.next().unwrap().unwrap();
    assert_eq!(t, 0.01);
    assert_eq!(stepper.steps_taken(), 1);

    stepper.cancel();
    assert!(stepper.next().is_none());
    assert_eq!(stepper.steps_taken(), 1);

    stepper.restart();
    assert_eq!(stepper.time(), 0.0);
    assert_eq!(stepper.steps_taken(), 0);
    let (again, t) = stepper.next().unwrap().unwrap();
    assert_eq!(t, 0.01);
    assert_eq!(first.coefficients(), again.coefficients());
}

#[test]
fn solution_decays_monotonically() {
    let mut stepper = stepper(1.0, 0.02, 0.1);
    let mut previous = stepper.current().coefficients().amax();
    for step in &mut stepper {
        let (u, _) = step.unwrap();
        let current = u.coefficients().amax();
        assert!(current < previous);
        previous = current;
    }
    assert_eq!(stepper.steps_taken(), 5);
}
