//! Globally adaptive Gauss-Kronrod quadrature with interval bisection.

use std::fmt;

const XGK15: [f64; 8] = [
    0.991455371120812639206854697526329,
    0.949107912342758524526189684047851,
    0.864864423359769072789712788640926,
    0.741531185599394439863864773280788,
    0.586087235467691130294144845693013,
    0.405845151377397166906606412076961,
    0.207784955007898467600689403773245,
    0.000000000000000000000000000000000,
];

const WGK15: [f64; 8] = [
    0.022935322010529224963732008058970,
    0.063092092629978553290700663189204,
    0.104790010322250183839876322541518,
    0.140653259715525918745189590510238,
    0.169004726639267902826583426598550,
    0.190350578064785409913256402421014,
    0.204432940075298892414161999234649,
    0.209482141084727828012999174891714,
];

const WG7: [f64; 4] = [
    0.129484966168869693270611432679082,
    0.279705391489276667901467771423780,
    0.381830050505118944950369775488975,
    0.417959183673469387755102040816327,
];

const XGK21: [f64; 11] = [
    0.995657163025808080735527280689003,
    0.973906528517171720077964012084452,
    0.930157491355708226001207180059508,
    0.865063366688984510732096688423493,
    0.780817726586416897063717578345042,
    0.679409568299024406234327365114874,
    0.562757134668604683339000099272694,
    0.433395394129247190799265943165784,
    0.294392862701460198131126603103866,
    0.148874338981631210884826001129720,
    0.000000000000000000000000000000000,
];

const WGK21: [f64; 11] = [
    0.011694638867371874278064396062192,
    0.032558162307964727478818972459390,
    0.054755896574351996031381300244580,
    0.075039674810919952767043140916190,
    0.093125454583697605535065465083366,
    0.109387158802297641899210590325805,
    0.123491976262065851077208868305880,
    0.134709217311473325928054001771707,
    0.142775938577060080797094273138717,
    0.147739104901338491374841515972068,
    0.149445554002916905664936468389821,
];

const WG10: [f64; 5] = [
    0.066671344308688137593568809893332,
    0.149451349150580593145776339657697,
    0.219086362515982043995534934228163,
    0.269266719309996355091226921569469,
    0.295524224714752870173892994651338,
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GaussKronrodRule {
    GK15,
    GK21,
}

impl GaussKronrodRule {
    fn nodes(&self) -> (&'static [f64], &'static [f64], &'static [f64]) {
        match self {
            GaussKronrodRule::GK15 => (&XGK15, &WGK15, &WG7),
            GaussKronrodRule::GK21 => (&XGK21, &WGK21, &WG10),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QuadratureStatus {
    Converged,
    /// The subdivision limit was reached before the tolerance
    MaxSubdivisions,
    /// Roundoff error prevents reaching the tolerance
    RoundOff,
    /// Non-integrable singularity or otherwise bad integrand behavior
    Singularity,
}

impl fmt::Display for QuadratureStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QuadratureStatus::Converged => write!(f, "converged"),
            QuadratureStatus::MaxSubdivisions => write!(f, "maximum number of subdivisions reached"),
            QuadratureStatus::RoundOff => write!(f, "roundoff error detected"),
            QuadratureStatus::Singularity => write!(f, "bad integrand behavior"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct QuadratureResult {
    pub value: f64,
    pub error: f64,
    pub status: QuadratureStatus,
}

impl QuadratureResult {
    pub fn relative_error(&self) -> f64 {
        (self.error / self.value).abs()
    }
}

#[derive(Debug, Copy, Clone)]
struct Segment {
    a: f64,
    b: f64,
    result: f64,
    error: f64,
}

struct RuleEstimate {
    result: f64,
    error: f64,
    result_abs: f64,
    result_asc: f64,
}

/// Adaptive integrator, the equivalent of QUADPACK's QAG.
#[derive(Debug, Copy, Clone)]
pub struct Qag {
    pub rule: GaussKronrodRule,
    pub epsabs: f64,
    pub epsrel: f64,
    pub limit: usize,
}

impl Qag {
    pub fn new(rule: GaussKronrodRule, epsabs: f64, epsrel: f64, limit: usize) -> Qag {
        Qag {
            rule,
            epsabs,
            epsrel,
            limit: limit.max(1),
        }
    }

    fn apply_rule<F: FnMut(f64) -> f64>(&self, f: &mut F, a: f64, b: f64) -> RuleEstimate {
        let (xgk, wgk, wg) = self.rule.nodes();
        let n = xgk.len();

        let center = 0.5 * (a + b);
        let half_length = 0.5 * (b - a);
        let abs_half_length = half_length.abs();
        let f_center = f(center);

        let mut result_gauss = 0.;
        let mut result_kronrod = f_center * wgk[n - 1];
        let mut result_abs = result_kronrod.abs();

        if n % 2 == 0 {
            result_gauss = f_center * wg[n / 2 - 1];
        }

        let mut fv1 = vec![0.; n];
        let mut fv2 = vec![0.; n];

        for j in 0..(n - 1) / 2 {
            let jtw = 2 * j + 1;
            let abscissa = half_length * xgk[jtw];
            let f1 = f(center - abscissa);
            let f2 = f(center + abscissa);
            fv1[jtw] = f1;
            fv2[jtw] = f2;
            result_gauss += wg[j] * (f1 + f2);
            result_kronrod += wgk[jtw] * (f1 + f2);
            result_abs += wgk[jtw] * (f1.abs() + f2.abs());
        }

        for j in 0..n / 2 {
            let jtwm1 = 2 * j;
            let abscissa = half_length * xgk[jtwm1];
            let f1 = f(center - abscissa);
            let f2 = f(center + abscissa);
            fv1[jtwm1] = f1;
            fv2[jtwm1] = f2;
            result_kronrod += wgk[jtwm1] * (f1 + f2);
            result_abs += wgk[jtwm1] * (f1.abs() + f2.abs());
        }

        let mean = result_kronrod * 0.5;
        let mut result_asc = wgk[n - 1] * (f_center - mean).abs();
        for j in 0..n - 1 {
            result_asc += wgk[j] * ((fv1[j] - mean).abs() + (fv2[j] - mean).abs());
        }

        let error = (result_kronrod - result_gauss) * half_length;
        let result_abs = result_abs * abs_half_length;
        let result_asc = result_asc * abs_half_length;

        RuleEstimate {
            result: result_kronrod * half_length,
            error: rescale_error(error, result_abs, result_asc),
            result_abs,
            result_asc,
        }
    }

    /// Integrate `f` over [a, b]. The estimate is returned even when the
    /// tolerance was not reached; the status tells why.
    pub fn integrate<F: FnMut(f64) -> f64>(&self, mut f: F, a: f64, b: f64) -> QuadratureResult {
        let first = self.apply_rule(&mut f, a, b);

        let tolerance = self.epsabs.max(self.epsrel * first.result.abs());
        let round_off = 50. * f64::EPSILON * first.result_abs;

        if first.error <= round_off && first.error > tolerance {
            return QuadratureResult {
                value: first.result,
                error: first.error,
                status: QuadratureStatus::RoundOff,
            };
        } else if (first.error <= tolerance && first.error != first.result_asc) || first.error == 0. {
            return QuadratureResult {
                value: first.result,
                error: first.error,
                status: QuadratureStatus::Converged,
            };
        } else if self.limit == 1 {
            return QuadratureResult {
                value: first.result,
                error: first.error,
                status: QuadratureStatus::MaxSubdivisions,
            };
        }

        let mut segments = Vec::with_capacity(self.limit);
        segments.push(Segment {
            a,
            b,
            result: first.result,
            error: first.error,
        });

        let mut area = first.result;
        let mut errsum = first.error;
        let mut roundoff_type1 = 0;
        let mut roundoff_type2 = 0;
        let mut status = QuadratureStatus::Converged;
        let mut iteration = 1;

        loop {
            let (worst, _) = segments
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |acc, (i, s)| {
                    if s.error > acc.1 {
                        (i, s.error)
                    } else {
                        acc
                    }
                });
            let current = segments[worst];

            let a1 = current.a;
            let b1 = 0.5 * (current.a + current.b);
            let a2 = b1;
            let b2 = current.b;

            let left = self.apply_rule(&mut f, a1, b1);
            let right = self.apply_rule(&mut f, a2, b2);

            let area12 = left.result + right.result;
            let error12 = left.error + right.error;

            errsum += error12 - current.error;
            area += area12 - current.result;

            if left.result_asc != left.error && right.result_asc != right.error {
                let delta = current.result - area12;
                if delta.abs() <= 1.0e-5 * area12.abs() && error12 >= 0.99 * current.error {
                    roundoff_type1 += 1;
                }
                if iteration >= 10 && error12 > current.error {
                    roundoff_type2 += 1;
                }
            }

            let tolerance = self.epsabs.max(self.epsrel * area.abs());

            if errsum > tolerance {
                if roundoff_type1 >= 6 || roundoff_type2 >= 20 {
                    status = QuadratureStatus::RoundOff;
                }
                if subinterval_too_small(a1, a2, b2) {
                    status = QuadratureStatus::Singularity;
                }
            }

            segments[worst] = Segment {
                a: a1,
                b: b1,
                result: left.result,
                error: left.error,
            };
            segments.push(Segment {
                a: a2,
                b: b2,
                result: right.result,
                error: right.error,
            });

            iteration += 1;

            if iteration >= self.limit || status != QuadratureStatus::Converged || errsum <= tolerance {
                break;
            }
        }

        // re-sum to avoid the drift of the running total
        let value: f64 = segments.iter().map(|s| s.result).sum();
        let error: f64 = segments.iter().map(|s| s.error).sum();
        let tolerance = self.epsabs.max(self.epsrel * value.abs());

        if error <= tolerance {
            status = QuadratureStatus::Converged;
        } else if status == QuadratureStatus::Converged {
            status = QuadratureStatus::MaxSubdivisions;
        }

        QuadratureResult {
            value,
            error,
            status,
        }
    }
}

fn rescale_error(err: f64, result_abs: f64, result_asc: f64) -> f64 {
    let mut err = err.abs();

    if result_asc != 0. && err != 0. {
        let scale = (200. * err / result_asc).powf(1.5);
        if scale < 1. {
            err = result_asc * scale;
        } else {
            err = result_asc;
        }
    }

    if result_abs > f64::MIN_POSITIVE / (50. * f64::EPSILON) {
        let min_err = 50. * f64::EPSILON * result_abs;
        if min_err > err {
            err = min_err;
        }
    }

    err
}

fn subinterval_too_small(a1: f64, a2: f64, b2: f64) -> bool {
    let tmp = (1. + 100. * f64::EPSILON) * (a2.abs() + 1000. * f64::MIN_POSITIVE);
    a1.abs() <= tmp && b2.abs() <= tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn polynomial_is_exact() {
        for rule in [GaussKronrodRule::GK15, GaussKronrodRule::GK21] {
            let qag = Qag::new(rule, 0., 1e-10, 10);
            let res = qag.integrate(|x| 3. * x * x - x + 2., -1., 2.);
            assert_eq!(res.status, QuadratureStatus::Converged);
            assert!((res.value - 10.5).abs() < 1e-12);
        }
    }

    #[test]
    fn oscillating_integrand() {
        let qag = Qag::new(GaussKronrodRule::GK21, 0., 1e-8, 200);
        let res = qag.integrate(|x| (20. * x).sin() * x, 0., PI);
        let exact = -PI / 20.;
        assert_eq!(res.status, QuadratureStatus::Converged);
        assert!((res.value - exact).abs() < 1e-8);
    }

    #[test]
    fn integrable_endpoint_singularity() {
        let qag = Qag::new(GaussKronrodRule::GK15, 0., 1e-7, 200);
        let res = qag.integrate(|x| 1. / x.sqrt(), 0., 1.);
        assert!((res.value - 2.).abs() < 1e-6);
    }

    #[test]
    fn subdivision_limit_is_reported() {
        let qag = Qag::new(GaussKronrodRule::GK15, 0., 1e-12, 1);
        let res = qag.integrate(|x| (50. * x).sin(), 0., 10.);
        assert_eq!(res.status, QuadratureStatus::MaxSubdivisions);
    }
}
