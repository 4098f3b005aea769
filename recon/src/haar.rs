use std::f32::consts::FRAC_1_SQRT_2;
use ndarray::{s, Array3, Axis};
use num_complex::Complex32;

/// decomposition depth of the wavelet transform
pub const MAX_LEVELS:usize = 3;

fn splits(n:usize) -> bool {
    n >= 2 && n % 2 == 0
}

/// extent of the low-pass block entering each level
fn level_sizes(dims:[usize;3]) -> Vec<[usize;3]> {
    let mut sizes = vec![];
    let mut cur = dims;
    for _ in 0..MAX_LEVELS {
        if !cur.iter().any(|&n| splits(n)) {
            break;
        }
        sizes.push(cur);
        cur = cur.map(|n| match splits(n) { true => n/2, false => n });
    }
    sizes
}

fn lanes(vol:&mut Array3<Complex32>,size:[usize;3],axis:usize,inverse:bool) {
    let n = size[axis];
    let h = n/2;
    let mut block = vol.slice_mut(s![..size[0],..size[1],..size[2]]);
    let mut buf = vec![Complex32::new(0.0,0.0);n];
    for mut lane in block.lanes_mut(Axis(axis)) {
        match inverse {
            false => for i in 0..h {
                buf[i] = (lane[2*i] + lane[2*i+1]) * FRAC_1_SQRT_2;
                buf[h+i] = (lane[2*i] - lane[2*i+1]) * FRAC_1_SQRT_2;
            }
            true => for i in 0..h {
                buf[2*i] = (lane[i] + lane[h+i]) * FRAC_1_SQRT_2;
                buf[2*i+1] = (lane[i] - lane[h+i]) * FRAC_1_SQRT_2;
            }
        }
        lane.iter_mut().zip(buf.iter()).for_each(|(l,b)| *l = *b);
    }
}

/// Orthonormal multi-level haar transform. At each level every axis of even length is split into
/// averages followed by details, and the next level works on the averages only. Odd axes are
/// left alone.
pub fn haar3(vol:&Array3<Complex32>) -> Array3<Complex32> {
    let mut out = vol.clone();
    let dims = [vol.shape()[0],vol.shape()[1],vol.shape()[2]];
    for size in level_sizes(dims) {
        for axis in 0..3 {
            if splits(size[axis]) {
                lanes(&mut out,size,axis,false);
            }
        }
    }
    out
}

pub fn ihaar3(coeffs:&Array3<Complex32>) -> Array3<Complex32> {
    let mut out = coeffs.clone();
    let dims = [coeffs.shape()[0],coeffs.shape()[1],coeffs.shape()[2]];
    for size in level_sizes(dims).into_iter().rev() {
        for axis in (0..3).rev() {
            if splits(size[axis]) {
                lanes(&mut out,size,axis,true);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use utils::norm_sqr;

    fn test_vol(dims:(usize,usize,usize)) -> Array3<Complex32> {
        Array3::from_shape_fn(dims,|(x,y,z)| Complex32::new(((x*7 + y*3 + z) % 5) as f32,(x as f32 - y as f32) * 0.5))
    }

    #[test]
    fn transform_keeps_the_norm() {
        let v = test_vol((8,6,5));
        let c = haar3(&v);
        assert!((norm_sqr(&v) - norm_sqr(&c)).abs() < 1e-3 * norm_sqr(&v));
    }

    #[test]
    fn inverse_recovers_the_volume() {
        let v = test_vol((8,12,4));
        let r = ihaar3(&haar3(&v));
        v.iter().zip(r.iter()).for_each(|(a,b)| assert!((a - b).norm() < 1e-4));
    }

    #[test]
    fn constant_volume_has_one_coefficient() {
        let v = Array3::from_elem((8,8,4),Complex32::new(2.0,0.0));
        let c = haar3(&v);
        assert_eq!(c.iter().filter(|x| x.norm() > 1e-4).count(),1);
        assert!((c[[0,0,0]].norm() - 2.0 * 256f32.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn odd_axes_are_not_transformed() {
        let v = test_vol((1,1,3));
        assert_eq!(haar3(&v),v);
    }
}
