//! Shared 3-bus fixture.
//!
//! ```text
//!   bus 0 (slack) ---- bus 1 (load 0.5)
//!     gen 0      \       gen 1
//!                 \      |
//!                  bus 2 (load 1.0)
//!                    wind: mean 0.6, std 0.2, capacity 1.0
//! ```

#![allow(dead_code)]

use gridrisk_algo::{
    BranchSpec, GeneratorSpec, RenewableSpec, RiskAverseProblem, TwoStageDcopf,
};
use gridrisk_core::RiskParameters;

pub fn three_bus() -> TwoStageDcopf {
    let mut builder = TwoStageDcopf::builder();
    let b0 = builder.bus(0.0);
    let b1 = builder.bus(0.5);
    let b2 = builder.bus(1.0);

    builder
        .slack(b0)
        .generator(GeneratorSpec {
            bus: b0,
            p_min: 0.0,
            p_max: 2.0,
            quadratic: 1.0,
            linear: 1.0,
            adjust_quadratic: 10.0,
            adjust_linear: 0.0,
        })
        .generator(GeneratorSpec {
            bus: b1,
            p_min: 0.0,
            p_max: 1.5,
            quadratic: 2.0,
            linear: 0.5,
            adjust_quadratic: 12.0,
            adjust_linear: 0.0,
        })
        .renewable(RenewableSpec {
            bus: b2,
            mean: 0.6,
            std: 0.2,
            capacity: 1.0,
        });
    for (from, to) in [(b0, b1), (b1, b2), (b0, b2)] {
        builder.branch(BranchSpec {
            from,
            to,
            susceptance: 10.0,
            limit: 2.0,
        });
    }
    builder.build().expect("valid 3-bus fixture")
}

pub fn test_params() -> RiskParameters {
    RiskParameters {
        num_samples: 50,
        num_procs: 2,
        tol: 1e-6,
        debug: true,
        seed: 7,
        ..RiskParameters::default()
    }
}

pub fn problem() -> RiskAverseProblem<TwoStageDcopf> {
    RiskAverseProblem::new(three_bus(), test_params()).expect("construct risk problem")
}

pub fn problem_with(params: RiskParameters) -> RiskAverseProblem<TwoStageDcopf> {
    RiskAverseProblem::new(three_bus(), params).expect("construct risk problem")
}
