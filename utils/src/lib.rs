use std::f32::consts::PI;
use ndarray::{Array3, Axis};
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::FftPlanner;

/// names for a series of n_elements frames. The width of the index grows with the series length
/// (m0..m9, m00..m99 ...)
pub fn m_number_formatter(n_elements:usize) -> Vec<String>{
    (0..n_elements).map(|index| m_number(index,n_elements)).collect()
}

pub fn m_number(index:usize,n_total:usize) -> String {
    let w = match n_total {
        0 | 1 => 1,
        n => ((n-1) as f32).log10().floor() as usize + 1
    };
    format!("m{:0width$}",index,width=w)
}

/// unitary fft along a single axis of a volume
pub fn fft3_axis(vol:&mut Array3<Complex32>,axis:usize,inverse:bool) {
    let n = vol.shape()[axis];
    let mut fft_planner = FftPlanner::<f32>::new();
    let fft = match inverse {
        true => fft_planner.plan_fft_inverse(n),
        false => fft_planner.plan_fft_forward(n),
    };
    let norm = (n as f32).sqrt();
    let mut temp = vec![Complex32::new(0.0,0.0);n];
    for mut line in vol.lanes_mut(Axis(axis)) {
        temp.iter_mut().zip(line.iter()).for_each(|(t,l)| *t = *l);
        fft.process(&mut temp);
        // normalize the result
        line.iter_mut().zip(temp.iter()).for_each(|(l,t)| *l = *t/norm);
    }
}

/// unitary 3-D fft without any shift. Index 0 holds the zero frequency.
pub fn fft3(vol:&mut Array3<Complex32>,inverse:bool) {
    for axis in 0..3 {
        fft3_axis(vol,axis,inverse);
    }
}

/// squared l2 norm of a complex volume
pub fn norm_sqr(vol:&Array3<Complex32>) -> f64 {
    vol.iter().map(|c| c.norm_sqr() as f64).sum()
}

pub fn complex_vol_to_magnitude(vol:&Array3<Complex32>) -> Array3<f32> {
    vol.mapv(|c| c.norm())
}

/// mean magnitude over the non-zero voxels. Returns 0 for an all-zero volume.
pub fn mean_signal(vol:&Array3<Complex32>) -> f32 {
    let (sum,count) = vol.iter()
        .filter(|c| c.norm_sqr() > 0.0)
        .fold((0.0f64,0usize),|(s,n),c| (s + c.norm() as f64,n + 1));
    match count {
        0 => 0.0,
        _ => (sum/count as f64) as f32
    }
}

/// splitmix64 finalizer. Derives independent streams from a single run seed.
pub fn mix_seed(seed:u64,stream:u64) -> u64 {
    let mut z = seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn seeded_rng(seed:u64,stream:u64) -> StdRng {
    StdRng::seed_from_u64(mix_seed(seed,stream))
}

/// circular complex gaussian sample with E|n|^2 = sigma^2 (Box-Muller)
pub fn complex_gaussian<R:Rng>(rng:&mut R,sigma:f32) -> Complex32 {
    // u1 in (0,1] keeps ln finite
    let u1 = 1.0 - rng.gen::<f32>();
    let u2 = rng.gen::<f32>();
    let r = (-2.0 * u1.ln()).sqrt() * sigma / 2f32.sqrt();
    let theta = 2.0 * PI * u2;
    Complex32::new(r * theta.cos(),r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m_numbers_pad_to_series_length() {
        assert_eq!(m_number_formatter(3),vec!["m0","m1","m2"]);
        assert_eq!(m_number(7,12),"m07");
        assert_eq!(m_number(0,1),"m0");
    }

    #[test]
    fn fft3_is_unitary_and_invertible() {
        let mut vol = Array3::<Complex32>::zeros((4,6,5));
        vol.indexed_iter_mut().for_each(|((i,j,k),v)| *v = Complex32::new((i+2*j) as f32,k as f32 - 1.0));
        let orig = vol.clone();
        fft3(&mut vol,false);
        assert!((norm_sqr(&vol) - norm_sqr(&orig)).abs() < 1e-2 * norm_sqr(&orig));
        fft3(&mut vol,true);
        vol.iter().zip(orig.iter()).for_each(|(a,b)| assert!((a-b).norm() < 1e-3));
    }

    #[test]
    fn seeded_streams_are_reproducible() {
        let mut a = seeded_rng(42,3);
        let mut b = seeded_rng(42,3);
        let mut c = seeded_rng(42,4);
        let x = complex_gaussian(&mut a,1.0);
        assert_eq!(x,complex_gaussian(&mut b,1.0));
        assert_ne!(x,complex_gaussian(&mut c,1.0));
    }
}
