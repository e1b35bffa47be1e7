//! Construction, exact/smoothed evaluation and projections on the 3-bus fixture

mod common;

use gridrisk_algo::{
    DeterministicSubproblem, RecourseValue, RiskAverseProblem, StochasticProblem, TwoStageData,
    TwoStageDcopf,
};
use gridrisk_core::{GridRiskError, GridRiskResult};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_reference_values() {
    let problem = common::problem();
    let params = problem.params();
    assert!(problem.q_ref() > 0.0);
    assert!((problem.q_max() - params.q_fac * problem.q_ref()).abs() < 1e-12);

    let phi0 = problem.dcopf().data().phi0(problem.p_ce()).0;
    assert!((problem.f_ref() - (phi0 + problem.q_ref())).abs() < 1e-12);

    let (t_lo, t_hi) = problem.t_bounds();
    assert!((t_lo + 0.1 * problem.q_ref()).abs() < 1e-12);
    assert_eq!(t_hi, 0.0);
}

#[test]
fn test_summary_lists_reference_values() {
    let problem = common::problem();
    let summary = problem.summary();
    assert_eq!(summary.q_ref, problem.q_ref());
    assert_eq!(summary.num_samples, 50);

    let text = summary.to_string();
    for key in ["Fref", "Qref", "Qmax", "gamma", "num_procs"] {
        assert!(text.contains(key), "missing {} in\n{}", key, text);
    }
}

#[test]
fn test_invalid_parameters_rejected() {
    let mut params = common::test_params();
    params.gamma = 1.5;
    let err = RiskAverseProblem::new(common::three_bus(), params).unwrap_err();
    assert!(matches!(err, GridRiskError::Config(_)));
}

/// Collaborator whose expected recourse cost is identically zero.
#[derive(Debug)]
struct RiskFree(TwoStageDcopf);

impl DeterministicSubproblem for RiskFree {
    fn data(&self) -> &TwoStageData {
        self.0.data()
    }

    fn sample_w(&self, rng: &mut StdRng) -> Vec<f64> {
        self.0.sample_w(rng)
    }

    fn eval_eq(&self, p: &[f64], _num_samples: usize, _seed: Option<u64>) -> GridRiskResult<RecourseValue> {
        Ok(RecourseValue {
            q_value: 0.0,
            gradient: vec![0.0; p.len()],
        })
    }
}

#[test]
fn test_zero_reference_cost_rejected() {
    let err = RiskAverseProblem::new(RiskFree(common::three_bus()), common::test_params()).unwrap_err();
    assert!(matches!(err, GridRiskError::Numerical(_)), "got {:?}", err);
}

#[test]
fn test_exact_evaluation_without_renewables() {
    let problem = common::problem();
    let p_ce = problem.p_ce().to_vec();
    let (t_lo, _) = problem.t_bounds();
    let x: Vec<f64> = p_ce.iter().copied().chain([t_lo]).collect();

    // Losing all wind forces the costliest re-dispatch
    let eval = problem.eval_fg(&x, &[0.0]).unwrap();
    let recourse = problem.dcopf().eval_q(&p_ce, &[0.0]).unwrap();
    let phi0 = problem.dcopf().data().phi0(&p_ce).0;
    assert!((eval.f - (phi0 + recourse.q_value)).abs() < 1e-9);
    assert!(recourse.q_value > problem.q_max());

    let gamma = problem.params().gamma;
    let sigma = recourse.q_value - problem.q_max() - t_lo;
    assert!((eval.g - (sigma + (1.0 - gamma) * t_lo)).abs() < 1e-9);
    assert_eq!(eval.indicator, 0.0);
    assert_eq!(eval.j_g.len(), 3);
    assert!((eval.j_g[2] + gamma).abs() < 1e-12);
    let gphi0 = problem.dcopf().data().phi0(&p_ce).1;
    for i in 0..2 {
        assert!((eval.j_g[i] - recourse.gradient[i]).abs() < 1e-9);
        assert!((eval.g_f[i] - (gphi0[i] + recourse.gradient[i])).abs() < 1e-9);
    }
    assert_eq!(eval.g_f[2], 0.0);
}

#[test]
fn test_exact_evaluation_inactive_hinge() {
    let problem = common::problem();
    let p_ce = problem.p_ce().to_vec();
    let x: Vec<f64> = p_ce.iter().copied().chain([0.0]).collect();

    // Expected wind: the certainty-equivalent dispatch needs no recourse
    let er = problem.dcopf().data().er.clone();
    let eval = problem.eval_fg(&x, &er).unwrap();
    let gamma = problem.params().gamma;
    assert_eq!(eval.indicator, 1.0);
    assert!(eval.g.abs() < 1e-9);
    assert_eq!(&eval.j_g[..2], &[0.0, 0.0]);
    assert!((eval.j_g[2] - (1.0 - gamma)).abs() < 1e-12);
}

#[test]
fn test_smoothed_evaluation_close_to_exact() {
    let mut params = common::test_params();
    params.smax_param = 1e4;
    let problem = common::problem_with(params);
    let p_ce = problem.p_ce().to_vec();
    let (t_lo, _) = problem.t_bounds();
    let x: Vec<f64> = p_ce.iter().copied().chain([t_lo]).collect();

    let er = problem.dcopf().data().er.clone();
    let exact = problem.eval_fg(&x, &er).unwrap();
    let approx = problem.eval_fg_approx(&x).unwrap();

    let t_reg = problem.params().t_reg;
    assert!((approx.f - exact.f - 0.5 * t_reg * t_lo * t_lo).abs() < 1e-9);
    assert!((approx.g - exact.g).abs() <= problem.q_ref() / 1e4 * std::f64::consts::LN_2 + 1e-9);
    assert!((approx.g_f[2] - t_reg * t_lo).abs() < 1e-15);
}

#[test]
fn test_wrong_dimension_rejected() {
    let problem = common::problem();
    let err = problem.eval_fg(&[0.5, 0.5], &[0.6]).unwrap_err();
    assert!(matches!(err, GridRiskError::Dimension { what: "x", expected: 3, got: 2 }));

    let err = problem.eval_fg(&[0.5, 0.5, 0.0], &[0.6, 0.1]).unwrap_err();
    assert!(matches!(err, GridRiskError::Dimension { .. }));
}

#[test]
fn test_projections() {
    let problem = common::problem();
    let (t_lo, t_hi) = problem.t_bounds();

    let x = problem.project_x(&[-1.0, 5.0, t_lo - 1.0]).unwrap();
    assert_eq!(x, vec![0.0, 1.5, t_lo]);
    let x = problem.project_x(&[1.0, 0.5, t_hi + 1.0]).unwrap();
    assert_eq!(x, vec![1.0, 0.5, t_hi]);

    let lam_max = problem.params().lam_max;
    assert_eq!(problem.project_lam(-3.0), 0.0);
    assert_eq!(problem.project_lam(0.25), 0.25);
    assert_eq!(problem.project_lam(lam_max * 2.0), lam_max);
}

#[test]
fn test_driver_interface() {
    let mut problem = common::problem();
    let driver: &mut dyn StochasticProblem = &mut problem;
    assert_eq!(driver.size_x(), 3);
    assert_eq!(driver.size_lam(), 1);

    let x = driver.init_x().unwrap();
    assert_eq!(driver.prop_x(&x).unwrap(), x[2]);

    let mut rng = StdRng::seed_from_u64(3);
    let r = driver.sample_w(&mut rng);
    assert_eq!(r.len(), 1);
    assert!((0.0..=1.0).contains(&r[0]));
    driver.eval_fg(&x, &r).unwrap();
}
