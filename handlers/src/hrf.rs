use sim_conf::scenario::HrfModel;

/// length of the response kernel in seconds
pub const HRF_LENGTH_S:f64 = 32.0;

struct GammaDifference {
    delay:f64,
    undershoot:f64,
    dispersion:f64,
    u_dispersion:f64,
    ratio:f64,
}

const GLOVER:GammaDifference = GammaDifference{delay:6.0,undershoot:12.0,dispersion:0.9,u_dispersion:0.9,ratio:0.35};
const SPM:GammaDifference = GammaDifference{delay:6.0,undershoot:16.0,dispersion:1.0,u_dispersion:1.0,ratio:0.167};

/// haemodynamic response sampled every dt seconds, normalized to unit sum. None for HrfModel::None
pub fn hrf_kernel(model:HrfModel,dt:f64) -> Option<Vec<f64>> {
    let p = match model {
        HrfModel::None => return None,
        HrfModel::Glover => &GLOVER,
        HrfModel::Spm => &SPM,
    };
    let n = (HRF_LENGTH_S/dt).ceil() as usize;
    let mut k:Vec<f64> = (0..n).map(|i| {
        let t = i as f64 * dt;
        gamma_pdf(t,p.delay/p.dispersion,p.dispersion) - p.ratio * gamma_pdf(t,p.undershoot/p.u_dispersion,p.u_dispersion)
    }).collect();
    let s:f64 = k.iter().sum();
    if s != 0.0 {
        k.iter_mut().for_each(|v| *v /= s);
    }
    Some(k)
}

fn gamma_pdf(t:f64,shape:f64,scale:f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    ((shape - 1.0)*t.ln() - t/scale - ln_gamma(shape) - shape*scale.ln()).exp()
}

/// Lanczos approximation (g = 7)
fn ln_gamma(x:f64) -> f64 {
    const COEFFS:[f64;9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi/(pi*x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let a = COEFFS[1..].iter().enumerate().fold(COEFFS[0],|acc,(i,c)| acc + c/(x + i as f64 + 1.0));
    0.5*(2.0*std::f64::consts::PI).ln() + (x + 0.5)*t.ln() - t + a.ln()
}
