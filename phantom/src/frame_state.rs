use ndarray::{Array3, Zip};
use num_complex::Complex32;
use sim_conf::sim_conf::GreConfig;
use crate::phantom::Phantom;
use crate::tissue::gre_steady_state;

/// Tissue parameters of the phantom at one instant. Handlers perturb it, the engine turns it into
/// an image.
#[derive(Clone,Debug)]
pub struct FrameState {
    pub pd:Array3<f32>,
    pub t1_ms:Array3<f32>,
    /// 1/ms
    pub r2s:Array3<f32>,
    /// added to the image after contrast
    pub additive:Array3<Complex32>,
}

impl FrameState {

    pub fn from_phantom(phantom:&Phantom) -> Self {
        Self {
            pd:phantom.pd_map(),
            t1_ms:phantom.t1_map(),
            r2s:phantom.r2s_map(),
            additive:Array3::zeros(phantom.labels.raw_dim()),
        }
    }

    pub fn dims(&self) -> [usize;3] {
        let s = self.pd.shape();
        [s[0],s[1],s[2]]
    }

    /// steady state magnetization before T2* decay
    pub fn magnetization(&self,seq:&GreConfig) -> Array3<f32> {
        let mut m = Array3::<f32>::zeros(self.pd.raw_dim());
        Zip::from(&mut m).and(&self.pd).and(&self.t1_ms).for_each(|m,pd,t1| {
            *m = gre_steady_state(*pd,*t1,seq.fa_deg,seq.tr_ms);
        });
        m
    }

    /// image after t_ms of T2* decay
    pub fn image_at(&self,seq:&GreConfig,t_ms:f64) -> Array3<Complex32> {
        let m = self.magnetization(seq);
        self.decay(&m,t_ms)
    }

    /// apply decay to a precomputed magnetization
    pub fn decay(&self,magnetization:&Array3<f32>,t_ms:f64) -> Array3<Complex32> {
        let mut img = self.additive.clone();
        Zip::from(&mut img).and(magnetization).and(&self.r2s).for_each(|img,m,r2s| {
            *img += Complex32::new(m * (-(t_ms as f32) * r2s).exp(),0.0);
        });
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_decays_with_time() {
        let p = Phantom::shepp_logan([8,8,4],[8.0,8.0,4.0]);
        let s = FrameState::from_phantom(&p);
        let seq = GreConfig::default();
        let early = s.image_at(&seq,10.0);
        let late = s.image_at(&seq,40.0);
        let sum = |v:&Array3<Complex32>| v.iter().map(|c| c.re).sum::<f32>();
        assert!(sum(&early) > sum(&late));
        assert!(sum(&late) > 0.0);
    }

    #[test]
    fn additive_term_passes_through() {
        let p = Phantom::shepp_logan([8,8,4],[8.0,8.0,4.0]);
        let mut s = FrameState::from_phantom(&p);
        s.additive[[0,0,0]] = Complex32::new(0.0,2.0);
        let img = s.image_at(&GreConfig::default(),30.0);
        assert_eq!(img[[0,0,0]],Complex32::new(0.0,2.0));
    }
}
