use nlobk::dashboard::StatusUpdate;
use nlobk::dipole::{AmplitudeGrid, Dipole};
use nlobk::initial_condition;
use nlobk::interpolation::Interpolator;
use nlobk::solver::{BkSolver, LoContext};
use nlobk::{
    InitialConditionModel, KinematicalConstraint, LoCoupling, NloIntegration, Settings, Stepper,
};
use std::sync::mpsc::{channel, Receiver};

/// LO evolution with fixed coupling on a coarse grid, starting from N = 1 - exp(-r^2).
fn lo_settings() -> Settings {
    let mut settings = Settings::default();
    settings.evolution.stepper = Stepper::Euler;
    settings.evolution.step_size = 0.1;
    settings.kernel.rc_lo = LoCoupling::Fixed;
    settings.kernel.nlo = false;
    settings.grid.min_r = 1e-3;
    settings.grid.r_multiplier = 1.6;
    settings.grid.r_points = 22;
    settings.integration.r_int_points = 50;
    settings.integration.theta_int_points = 50;
    settings.integration.accuracy = 0.01;
    settings.initial_condition.model = InitialConditionModel::GBW;
    settings.initial_condition.qsqr = 4.;
    settings.initial_condition.anomalous_dimension = 1.;
    settings
}

fn interp_n(dipole: &Dipole) -> Interpolator {
    let mut interp = Interpolator::new(dipole.r_values(), dipole.amplitudes_at(0)).unwrap();
    interp.set_freeze(true);
    interp.set_underflow(0.);
    interp.set_overflow(1.);
    interp
}

fn solver(settings: Settings) -> (BkSolver<Dipole>, Receiver<StatusUpdate>) {
    let ic = initial_condition::from_settings(&settings.initial_condition);
    let dipole = Dipole::new(ic, &settings.grid).unwrap();
    let (sender, receiver) = channel();
    (BkSolver::new(settings, dipole, sender), receiver)
}

mod leading_order {
    use super::*;

    #[test]
    fn euler_steps_append_slices() {
        let (mut solver, _log) = solver(lo_settings());
        solver.solve(0.3).unwrap();

        let dipole = solver.dipole();
        let rapidities = dipole.rapidities();
        assert_eq!(rapidities.len(), 4);
        assert!(rapidities.windows(2).all(|w| w[1] > w[0]));
        assert!((rapidities[3] - 0.3).abs() < 1e-12);

        let initial = dipole.amplitudes_at(0);
        let last = dipole.amplitudes_at(3);
        for i in 0..dipole.r_points() {
            assert!(last[i].is_finite());
            assert!((initial[i] - (1. - (-dipole.r_val(i).powi(2)).exp())).abs() < 1e-14);
        }

        // the amplitude grows towards saturation
        let i = (0..dipole.r_points())
            .find(|&i| dipole.r_val(i) > 0.3)
            .unwrap();
        assert!(last[i] > initial[i], "N={} at r={}", last[i], dipole.r_val(i));
        assert!(last[i] < 1.);
    }

    #[test]
    fn last_step_is_truncated() {
        let (mut solver, _log) = solver(lo_settings());
        solver.solve(0.25).unwrap();

        let rapidities = solver.dipole().rapidities();
        assert_eq!(rapidities.len(), 4);
        assert!((rapidities[2] - 0.2).abs() < 1e-12);
        assert!((rapidities[3] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn derivative_is_positive_in_the_dilute_region() {
        let (solver, _log) = solver(lo_settings());
        let dipole = solver.dipole();
        let n: Vec<f64> = dipole.amplitudes_at(0).to_vec();

        let derivatives = solver.evolve(0., &n).unwrap();
        assert_eq!(derivatives.len(), n.len());
        for i in 0..n.len() {
            if dipole.r_val(i) < 1. {
                assert!(derivatives[i] > 0., "dN/dy={} at r={}", derivatives[i], dipole.r_val(i));
            }
        }
    }

    #[test]
    fn saturated_amplitudes_are_frozen() {
        let (solver, _log) = solver(lo_settings());
        let n = vec![1.; solver.dipole().r_points()];
        let derivatives = solver.evolve(0., &n).unwrap();
        assert!(derivatives.iter().all(|&d| d == 0.));
    }

    #[test]
    fn derivative_table_is_reported() {
        let mut settings = lo_settings();
        settings.general.print_derivatives = true;
        let (solver, log) = solver(settings);
        let n = solver.dipole().amplitudes_at(0).to_vec();
        solver.evolve(0., &n).unwrap();
        drop(solver);

        let rows = log
            .iter()
            .filter(|u| matches!(u, StatusUpdate::Derivative { nlo, .. } if *nlo == 0.))
            .count();
        // saturated points are frozen before the table row is written
        let evolved = n.iter().filter(|&&a| a <= 0.99999).count();
        assert!(evolved < n.len());
        assert_eq!(rows, evolved);
    }

    #[test]
    fn adaptive_stepper_agrees_with_euler() {
        let mut settings = lo_settings();
        settings.evolution.stepper = Stepper::Adaptive;
        settings.evolution.abs_tolerance = 1e-3;
        settings.evolution.rel_tolerance = 1e-3;
        let (mut adaptive, _log) = solver(settings);
        adaptive.solve(0.1).unwrap();

        let (mut euler, _log) = solver(lo_settings());
        euler.solve(0.1).unwrap();

        let a = adaptive.dipole().amplitudes_at(1);
        let e = euler.dipole().amplitudes_at(1);
        for i in 0..a.len() {
            assert!((a[i] - e[i]).abs() < 0.02, "r={}: {} vs {}", adaptive.dipole().r_val(i), a[i], e[i]);
        }
    }
}

mod constraints {
    use super::*;

    #[test]
    fn k_minus_evolution_stays_finite() {
        let mut settings = lo_settings();
        settings.kernel.kinematical_constraint = KinematicalConstraint::KMinus;
        let (mut solver, _log) = solver(settings);
        solver.solve(0.2).unwrap();

        let dipole = solver.dipole();
        assert_eq!(dipole.rapidities().len(), 3);
        assert!(dipole.amplitudes_at(2).iter().all(|n| n.is_finite()));
    }

    #[test]
    fn k_plus_evolution_grows_the_amplitude() {
        let mut settings = lo_settings();
        settings.kernel.kinematical_constraint = KinematicalConstraint::KPlus;
        let (mut solver, _log) = solver(settings);
        solver.solve(0.3).unwrap();

        let dipole = solver.dipole();
        assert_eq!(dipole.rapidities().len(), 4);
        let initial = dipole.amplitudes_at(0);
        let last = dipole.amplitudes_at(3);
        assert!(last.iter().all(|n| n.is_finite()));

        // r = 1e-3 * 1.6^10 = 0.11
        let i = 10;
        assert!((dipole.r_val(i) - 0.11).abs() < 1e-3);
        assert!((initial[i] - 0.01202).abs() < 1e-4);
        assert!(last[i] > 1.1 * initial[i], "N={} at r={}", last[i], dipole.r_val(i));
        assert!(last[i] < 0.05);
    }

    #[test]
    fn k_plus_integrand() {
        let (plain, _log) = solver(lo_settings());
        let mut settings = lo_settings();
        settings.kernel.kinematical_constraint = KinematicalConstraint::KPlus;
        let (k_plus, _log) = solver(settings);
        let interp = interp_n(plain.dipole());
        let ctx = LoContext { r: 0.5, rapidity: 0., interp_n: &interp };

        // both daughters smaller than the parent: no shift, the amplitudes
        // combine as in the unconstrained equation
        let (z, theta) = (0.3, 0.5);
        let a = k_plus.lo_integrand(&ctx, z, theta);
        let b = plain.lo_integrand(&ctx, z, theta);
        assert!(a != 0.);
        assert!((a - b).abs() < 1e-6 * b.abs(), "{} vs {}", a, b);

        // a small parent emitting a large dipole needs a momentum fraction above one
        let ctx = LoContext { r: 0.01, rapidity: 0., interp_n: &interp };
        assert_eq!(k_plus.lo_integrand(&ctx, 2., 1.), 0.);
        assert!(plain.lo_integrand(&ctx, 2., 1.) != 0.);
    }

    #[test]
    fn k_minus_needs_rapidity_for_small_daughters() {
        let mut settings = lo_settings();
        settings.kernel.kinematical_constraint = KinematicalConstraint::KMinus;
        let (k_minus, _log) = solver(settings);
        let interp = interp_n(k_minus.dipole());

        // X = 0.277, Y = 0.3 < r: ln(r^2 / X^2) = 1.18 units of rapidity
        let ctx = LoContext { r: 0.5, rapidity: 0., interp_n: &interp };
        assert_eq!(k_minus.lo_integrand(&ctx, 0.3, 0.5), 0.);
        let ctx = LoContext { r: 0.5, rapidity: 1.1, interp_n: &interp };
        assert_eq!(k_minus.lo_integrand(&ctx, 0.3, 0.5), 0.);
        let ctx = LoContext { r: 0.5, rapidity: 1.3, interp_n: &interp };
        assert!(k_minus.lo_integrand(&ctx, 0.3, 0.5) != 0.);
    }

    #[test]
    fn target_constraint_removes_small_daughters() {
        let (plain, _log) = solver(lo_settings());
        let mut settings = lo_settings();
        settings.kernel.target_kinematical_constraint = true;
        let (target, _log) = solver(settings);
        let interp = interp_n(plain.dipole());

        // min(X, Y)^2 = 1e-4: x0 / (Q0^2 min(X, Y)^2) = 100 exceeds one
        let ctx = LoContext { r: 0.02, rapidity: 0., interp_n: &interp };
        assert_eq!(target.lo_integrand(&ctx, 0.01, 1.), 0.);
        assert!(plain.lo_integrand(&ctx, 0.01, 1.) != 0.);

        // min(X, Y)^2 = 0.083: 0.12 is allowed
        let ctx = LoContext { r: 0.3, rapidity: 0., interp_n: &interp };
        let a = target.lo_integrand(&ctx, 0.3, 1.);
        assert!(a > 0.);
        assert_eq!(a, plain.lo_integrand(&ctx, 0.3, 1.));

        // and so is the small one after enough evolution
        let ctx = LoContext { r: 0.02, rapidity: 5., interp_n: &interp };
        assert_eq!(
            target.lo_integrand(&ctx, 0.01, 1.),
            plain.lo_integrand(&ctx, 0.01, 1.)
        );
    }

    #[test]
    fn target_constraint_slows_down_the_evolution() {
        let (plain, _log) = solver(lo_settings());
        let mut settings = lo_settings();
        settings.kernel.target_kinematical_constraint = true;
        let (target, _log) = solver(settings);

        let n = target.dipole().amplitudes_at(0).to_vec();
        let constrained = target.evolve(0., &n).unwrap();
        let unconstrained = plain.evolve(0., &n).unwrap();
        // the smallest dipoles only emit into forbidden configurations
        assert!(constrained[0].abs() < unconstrained[0].abs());
        assert!(constrained.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn incompatible_options_leave_the_grid_untouched() {
        let mut settings = lo_settings();
        settings.kernel.resum_dlog = true;
        settings.kernel.kinematical_constraint = KinematicalConstraint::KMinus;
        let (mut solver, _log) = solver(settings);

        assert!(solver.solve(0.3).is_err());
        assert_eq!(solver.dipole().rapidities().len(), 1);
    }

    #[test]
    fn cannot_evolve_backwards() {
        let (mut solver, _log) = solver(lo_settings());
        assert!(solver.solve(0.).is_err());
        assert!(solver.solve(-1.).is_err());
    }
}

mod checkpoints {
    use super::*;

    #[test]
    fn resume_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bk.checkpoint");
        let path = path.to_str().unwrap();

        let settings = lo_settings();
        let (mut first, _log) = solver(settings.clone());
        first.set_checkpoint_path(path);
        first.solve(0.2).unwrap();

        let ic = initial_condition::from_settings(&settings.initial_condition);
        let dipole = Dipole::load(path, ic).unwrap();
        assert_eq!(dipole.rapidities().len(), 3);

        let (sender, _receiver) = channel();
        let mut resumed = BkSolver::new(settings.clone(), dipole, sender);
        resumed.solve(0.3).unwrap();

        let (mut direct, _log) = solver(settings);
        direct.solve(0.3).unwrap();

        let rapidities = resumed.dipole().rapidities();
        assert_eq!(rapidities.len(), 4);
        assert_eq!(rapidities, direct.dipole().rapidities());
        for (a, b) in resumed
            .dipole()
            .amplitudes_at(3)
            .iter()
            .zip(direct.dipole().amplitudes_at(3))
        {
            assert!((a - b).abs() < 1e-12);
        }
    }
}

mod next_to_leading_order {
    use super::*;

    fn nlo_settings(method: NloIntegration) -> Settings {
        let mut settings = lo_settings();
        settings.kernel.nlo = true;
        settings.kernel.rc_lo = LoCoupling::Parent;
        settings.integration.nlo_method = method;
        settings.integration.mc_calls = 20000;
        settings.integration.mc_seed = Some(7);
        settings
    }

    fn interp_s(dipole: &Dipole) -> Interpolator {
        let s: Vec<f64> = dipole.amplitudes_at(0).iter().map(|n| 1. - n).collect();
        let mut interp = Interpolator::new(dipole.r_values(), &s).unwrap();
        interp.set_freeze(true);
        interp.set_underflow(1.);
        interp.set_overflow(0.);
        interp
    }

    #[test]
    fn vegas_is_reproducible_with_a_seed() {
        let (solver, _log) = solver(nlo_settings(NloIntegration::Vegas));
        let interp = interp_s(solver.dipole());

        let first = solver.rapidity_derivative_nlo(0.5, &interp);
        let second = solver.rapidity_derivative_nlo(0.5, &interp);
        assert!(first.is_finite());
        assert_eq!(first, second);
    }

    #[test]
    fn miser_is_finite() {
        let (solver, _log) = solver(nlo_settings(NloIntegration::Miser));
        let interp = interp_s(solver.dipole());
        assert!(solver.rapidity_derivative_nlo(0.5, &interp).is_finite());
    }

    #[test]
    fn integrand_vanishes_without_scattering() {
        let (solver, _log) = solver(nlo_settings(NloIntegration::Vegas));
        let s = vec![1.; solver.dipole().r_points()];
        let interp = Interpolator::new(solver.dipole().r_values(), &s).unwrap();
        let ctx = nlobk::solver::NloContext { r: 0.5, interp_s: &interp };

        // S = 1 everywhere cancels the real and virtual terms
        for &(z, theta_z, z2, theta_z2) in &[(0.3, 0.5, 0.7, 2.), (1.2, 3., 0.1, 5.)] {
            assert!(solver.nlo_integrand(&ctx, z, theta_z, z2, theta_z2).abs() < 1e-12);
        }
    }

    /// Nested quadrature with few subdivisions per dimension.
    fn coarse_quadrature() -> Settings {
        let mut settings = nlo_settings(NloIntegration::Multiple);
        settings.integration.r_int_points = 4;
        settings.integration.theta_int_points = 3;
        settings.integration.accuracy = 0.1;
        settings
    }

    #[test]
    fn monte_carlo_matches_quadrature() {
        let mut settings = nlo_settings(NloIntegration::Vegas);
        settings.integration.mc_calls = 100000;
        let (vegas, _log) = solver(settings);
        let (quadrature, _log) = solver(coarse_quadrature());

        let interp = interp_s(vegas.dipole());
        let mc = vegas.rapidity_derivative_nlo(0.5, &interp);
        let q = quadrature.rapidity_derivative_nlo(0.5, &interp);
        // about -1.5e-2
        assert!(q < -1e-2 && q > -2e-2, "{:e}", q);
        assert!((mc - q).abs() < 0.1 * q.abs(), "vegas = {:e}, quadrature = {:e}", mc, q);
    }

    #[test]
    fn vegas_without_an_acceptable_pass_gives_zero() {
        let mut settings = nlo_settings(NloIntegration::Vegas);
        settings.integration.vegas_max_relative_error = 0.;
        let (solver, log) = solver(settings);
        let interp = interp_s(solver.dipole());

        assert_eq!(solver.rapidity_derivative_nlo(0.5, &interp), 0.);

        let updates: Vec<StatusUpdate> = log.try_iter().collect();
        let passes: Vec<usize> = updates
            .iter()
            .filter_map(|u| match u {
                StatusUpdate::VegasPass { pass, error, .. } => {
                    assert!(*error > 0.);
                    Some(*pass)
                }
                _ => None,
            })
            .collect();
        assert_eq!(passes, vec![1, 2, 3]);
        assert!(updates
            .iter()
            .any(|u| matches!(u, StatusUpdate::Warning(m) if m.contains("Vegas"))));
    }

    #[test]
    fn vegas_passes_refine_the_estimate() {
        let mut settings = nlo_settings(NloIntegration::Vegas);
        settings.integration.vegas_max_relative_error = 0.;
        let (solver, log) = solver(settings);
        let interp = interp_s(solver.dipole());
        solver.rapidity_derivative_nlo(0.5, &interp);

        let errors: Vec<(f64, usize)> = log
            .try_iter()
            .filter_map(|u| match u {
                StatusUpdate::VegasPass {
                    error, evaluations, ..
                } => Some((error, evaluations)),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(errors.windows(2).all(|w| w[1].0 < w[0].0 && w[1].1 > w[0].1));
    }

    #[test]
    fn nlo_evolution_with_quadrature() {
        let mut settings = coarse_quadrature();
        settings.integration.r_int_points = 2;
        settings.integration.theta_int_points = 2;
        settings.grid.min_r = 1e-2;
        settings.grid.r_multiplier = 2.5;
        settings.grid.r_points = 8;
        let (mut solver, _log) = solver(settings);
        solver.solve(0.3).unwrap();

        let dipole = solver.dipole();
        assert_eq!(dipole.rapidities().len(), 4);
        let initial = dipole.amplitudes_at(0);
        for slice in 1..4 {
            let n = dipole.amplitudes_at(slice);
            assert!(n.iter().all(|a| a.is_finite() && *a < 1.01), "{:?}", n);
        }
        assert!(initial
            .iter()
            .zip(dipole.amplitudes_at(3))
            .any(|(a, b)| a != b));
    }

    #[test]
    fn initial_condition_is_kept_in_the_dipole() {
        let (solver, _log) = solver(nlo_settings(NloIntegration::Vegas));
        let ic = solver.dipole().initial_condition();
        assert_eq!(ic.x0(), 0.01);
        assert!((ic.dipole_amplitude(1.) - (1. - (-1f64).exp())).abs() < 1e-14);
    }
}
