//! Concrete two-stage DC-OPF assembled from small element tables.

use super::{DeterministicSubproblem, Dimensions, TwoStageData};
use gridrisk_core::linalg::diag;
use gridrisk_core::{GridRiskError, GridRiskResult};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use sprs::TriMat;

/// Dispatchable generator.
///
/// Costs are `0.5 * quadratic * p^2 + linear * p` per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    pub bus: usize,
    pub p_min: f64,
    pub p_max: f64,
    pub quadratic: f64,
    pub linear: f64,
    /// Stage-2 adjustment cost
    pub adjust_quadratic: f64,
    pub adjust_linear: f64,
}

/// Renewable source with a Gaussian forecast clipped to `[0, capacity]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewableSpec {
    pub bus: usize,
    pub mean: f64,
    pub std: f64,
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub from: usize,
    pub to: usize,
    pub susceptance: f64,
    /// Symmetric flow limit
    pub limit: f64,
}

/// Independent Gaussian renewable forecast.
#[derive(Debug, Clone)]
pub struct RenewableForecast {
    noise: Vec<Normal<f64>>,
    mean: Vec<f64>,
    capacity: Vec<f64>,
}

impl RenewableForecast {
    fn new(specs: &[RenewableSpec]) -> GridRiskResult<Self> {
        let noise = specs
            .iter()
            .map(|s| {
                Normal::new(0.0, s.std).map_err(|e| {
                    GridRiskError::Config(format!("invalid renewable std {}: {}", s.std, e))
                })
            })
            .collect::<GridRiskResult<Vec<_>>>()?;
        Ok(Self {
            noise,
            mean: specs.iter().map(|s| s.mean).collect(),
            capacity: specs.iter().map(|s| s.capacity).collect(),
        })
    }

    pub fn sample(&self, rng: &mut StdRng) -> Vec<f64> {
        self.noise
            .iter()
            .zip(self.mean.iter().zip(&self.capacity))
            .map(|(noise, (&mean, &cap))| (mean + noise.sample(rng)).clamp(0.0, cap))
            .collect()
    }
}

/// Two-stage DC-OPF on an explicit small network.
#[derive(Debug, Clone)]
pub struct TwoStageDcopf {
    data: TwoStageData,
    forecast: RenewableForecast,
}

impl DeterministicSubproblem for TwoStageDcopf {
    fn data(&self) -> &TwoStageData {
        &self.data
    }

    fn sample_w(&self, rng: &mut StdRng) -> Vec<f64> {
        self.forecast.sample(rng)
    }
}

impl TwoStageDcopf {
    pub fn builder() -> TwoStageDcopfBuilder {
        TwoStageDcopfBuilder::default()
    }
}

/// Builder for [`TwoStageDcopf`].
///
/// Buses are numbered in insertion order; bus 0 is the angle reference
/// unless [`slack`](Self::slack) says otherwise.
#[derive(Debug, Clone, Default)]
pub struct TwoStageDcopfBuilder {
    loads: Vec<f64>,
    generators: Vec<GeneratorSpec>,
    renewables: Vec<RenewableSpec>,
    branches: Vec<BranchSpec>,
    slack: usize,
}

impl TwoStageDcopfBuilder {
    /// Add a bus with the given load; returns its index.
    pub fn bus(&mut self, load: f64) -> usize {
        self.loads.push(load);
        self.loads.len() - 1
    }

    pub fn slack(&mut self, bus: usize) -> &mut Self {
        self.slack = bus;
        self
    }

    pub fn generator(&mut self, spec: GeneratorSpec) -> &mut Self {
        self.generators.push(spec);
        self
    }

    pub fn renewable(&mut self, spec: RenewableSpec) -> &mut Self {
        self.renewables.push(spec);
        self
    }

    pub fn branch(&mut self, spec: BranchSpec) -> &mut Self {
        self.branches.push(spec);
        self
    }

    pub fn build(&self) -> GridRiskResult<TwoStageDcopf> {
        let num_bus = self.loads.len();
        if num_bus < 2 {
            return Err(GridRiskError::Config("network needs at least two buses".into()));
        }
        if self.generators.is_empty() {
            return Err(GridRiskError::Config("network needs at least one generator".into()));
        }
        if self.slack >= num_bus {
            return Err(GridRiskError::Config(format!("slack bus {} out of range", self.slack)));
        }
        let check_bus = |bus: usize, what: &str| {
            if bus < num_bus {
                Ok(())
            } else {
                Err(GridRiskError::Config(format!("{} references unknown bus {}", what, bus)))
            }
        };
        for g in &self.generators {
            check_bus(g.bus, "generator")?;
            if g.p_min > g.p_max {
                return Err(GridRiskError::Config(format!(
                    "generator at bus {} has p_min > p_max",
                    g.bus
                )));
            }
        }
        for r in &self.renewables {
            check_bus(r.bus, "renewable")?;
        }
        for br in &self.branches {
            check_bus(br.from, "branch")?;
            check_bus(br.to, "branch")?;
        }

        let num_p = self.generators.len();
        let num_r = self.renewables.len();
        let num_br = self.branches.len();
        let num_w = num_bus - 1;
        let slack = self.slack;
        // Bus index -> angle column, None for the slack bus
        let angle_col = |bus: usize| match bus.cmp(&slack) {
            std::cmp::Ordering::Less => Some(bus),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(bus - 1),
        };

        let mut g = TriMat::new((num_bus, num_p));
        for (k, unit) in self.generators.iter().enumerate() {
            g.add_triplet(unit.bus, k, 1.0);
        }
        let mut r = TriMat::new((num_bus, num_r));
        for (k, ren) in self.renewables.iter().enumerate() {
            r.add_triplet(ren.bus, k, 1.0);
        }

        let mut a = TriMat::new((num_bus, num_w));
        let mut j = TriMat::new((num_br, num_w));
        for (k, br) in self.branches.iter().enumerate() {
            let b = br.susceptance;
            if let Some(cf) = angle_col(br.from) {
                a.add_triplet(br.from, cf, b);
                a.add_triplet(br.to, cf, -b);
                j.add_triplet(k, cf, b);
            }
            if let Some(ct) = angle_col(br.to) {
                a.add_triplet(br.to, ct, b);
                a.add_triplet(br.from, ct, -b);
                j.add_triplet(k, ct, -b);
            }
        }

        let data = TwoStageData {
            dims: Dimensions {
                num_p,
                num_w,
                num_r,
                num_bus,
                num_br,
            },
            h0: diag(&self.generators.iter().map(|g| g.quadratic).collect::<Vec<_>>()),
            g0: self.generators.iter().map(|g| g.linear).collect(),
            h1: diag(&self.generators.iter().map(|g| g.adjust_quadratic).collect::<Vec<_>>()),
            g1: self.generators.iter().map(|g| g.adjust_linear).collect(),
            g: g.to_csr(),
            r: r.to_csr(),
            a: a.to_csr(),
            j: j.to_csr(),
            b: self.loads.clone(),
            p_min: self.generators.iter().map(|g| g.p_min).collect(),
            p_max: self.generators.iter().map(|g| g.p_max).collect(),
            z_min: self.branches.iter().map(|b| -b.limit).collect(),
            z_max: self.branches.iter().map(|b| b.limit).collect(),
            er: self.renewables.iter().map(|r| r.mean).collect(),
        };

        Ok(TwoStageDcopf {
            data,
            forecast: RenewableForecast::new(&self.renewables)?,
        })
    }
}
