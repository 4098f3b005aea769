use std::f64::consts::PI;
use ndarray::{s, Array3, Array4, Axis, Zip};
use num_complex::Complex32;

/// width of a coil profile in normalized coordinates
const COIL_WIDTH:f64 = 1.2;
/// distance of the coils to the volume center
const COIL_RADIUS:f64 = 1.5;

/// Birdcage-like coil sensitivities, (coils, x, y, z). Coils sit on a ring around z. The maps are
/// normalized so that sum_c |S_c|^2 = 1 in every voxel. A single coil is uniform.
pub fn smaps(dims:[usize;3],n_coils:usize) -> Array4<Complex32> {
    let [nx,ny,nz] = dims;
    let mut maps = Array4::<Complex32>::zeros((n_coils,nx,ny,nz));
    if n_coils == 1 {
        maps.fill(Complex32::new(1.0,0.0));
        return maps;
    }
    for (c,mut map) in maps.outer_iter_mut().enumerate() {
        let angle = 2.0 * PI * c as f64 / n_coils as f64;
        let (cy,cx) = angle.sin_cos();
        map.indexed_iter_mut().for_each(|((x,y,z),v)| {
            let px = (x as f64 + 0.5)/nx as f64 * 2.0 - 1.0;
            let py = (y as f64 + 0.5)/ny as f64 * 2.0 - 1.0;
            let pz = (z as f64 + 0.5)/nz as f64 * 2.0 - 1.0;
            let dx = px - COIL_RADIUS * cx;
            let dy = py - COIL_RADIUS * cy;
            let d2 = dx*dx + dy*dy + 0.25*pz*pz;
            let mag = (-d2/(2.0 * COIL_WIDTH * COIL_WIDTH)).exp();
            let phase = angle + dy.atan2(dx) * 0.5;
            *v = Complex32::new((mag * phase.cos()) as f32,(mag * phase.sin()) as f32);
        });
    }
    let mut sos = Array3::<f32>::zeros((nx,ny,nz));
    for map in maps.outer_iter() {
        Zip::from(&mut sos).and(&map).for_each(|s,m| *s += m.norm_sqr());
    }
    sos.mapv_inplace(f32::sqrt);
    for mut map in maps.outer_iter_mut() {
        Zip::from(&mut map).and(&sos).for_each(|m,s| *m /= *s);
    }
    maps
}

/// sum_c conj(S_c) * coil_images_c
pub fn coil_combine(coil_images:&[Array3<Complex32>],maps:&Array4<Complex32>) -> Array3<Complex32> {
    let shape = maps.shape();
    let mut out = Array3::<Complex32>::zeros((shape[1],shape[2],shape[3]));
    for (img,map) in coil_images.iter().zip(maps.axis_iter(Axis(0))) {
        Zip::from(&mut out).and(img).and(&map).for_each(|o,i,m| *o += m.conj() * *i);
    }
    out
}

/// image seen by one coil
pub fn coil_image(image:&Array3<Complex32>,maps:&Array4<Complex32>,coil:usize) -> Array3<Complex32> {
    let map = maps.slice(s![coil,..,..,..]);
    let mut out = image.clone();
    Zip::from(&mut out).and(&map).for_each(|o,m| *o *= *m);
    out
}
