use std::f64::consts::PI;

/// Relaxation properties of one tissue class. Times in ms
#[derive(Clone,Debug,PartialEq)]
pub struct Tissue {
    pub name:String,
    pub pd:f32,
    pub t1_ms:f32,
    pub t2_ms:f32,
    pub t2s_ms:f32,
}

impl Tissue {
    pub fn new(name:&str,pd:f32,t1_ms:f32,t2_ms:f32,t2s_ms:f32) -> Self {
        Self {
            name:name.to_string(),
            pd,
            t1_ms,
            t2_ms,
            t2s_ms,
        }
    }

    /// 1/ms, 0 for tissues without decay
    pub fn r2s(&self) -> f32 {
        match self.t2s_ms > 0.0 {
            true => 1.0/self.t2s_ms,
            false => 0.0
        }
    }
}

pub const BACKGROUND:u8 = 0;

/// Built-in tissue classes at 3T. The position in the table is the label value used in label maps.
pub fn tissue_table() -> Vec<Tissue> {
    vec![
        Tissue::new("background",0.0,0.0,0.0,0.0),
        Tissue::new("csf",0.98,4200.0,1990.0,1000.0),
        Tissue::new("gray_matter",0.85,1820.0,99.0,66.0),
        Tissue::new("white_matter",0.70,1084.0,69.0,53.0),
        Tissue::new("scalp",0.80,324.0,70.0,30.0),
        Tissue::new("marrow",0.12,533.0,50.0,30.0),
        Tissue::new("roi",0.85,1820.0,99.0,66.0),
        Tissue::new("tumor",0.95,1500.0,120.0,80.0),
    ]
}

pub fn label_of(tissues:&[Tissue],name:&str) -> Option<u8> {
    tissues.iter().position(|t| t.name == name).map(|i| i as u8)
}

/// Spoiled gradient echo steady state magnetization (before T2* decay)
pub fn gre_steady_state(pd:f32,t1_ms:f32,fa_deg:f64,tr_ms:f64) -> f32 {
    if t1_ms <= 0.0 || pd == 0.0 {
        return 0.0;
    }
    let fa = fa_deg * PI / 180.0;
    let e1 = (-tr_ms/t1_ms as f64).exp();
    (pd as f64 * fa.sin() * (1.0 - e1)/(1.0 - fa.cos()*e1)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_table_order() {
        let t = tissue_table();
        assert_eq!(label_of(&t,"background"),Some(BACKGROUND));
        assert_eq!(label_of(&t,"roi"),Some(6));
        assert_eq!(label_of(&t,"bone"),None);
    }

    #[test]
    fn steady_state_limits() {
        // 90 degree pulse with TR >> T1 recovers the full proton density
        let s = gre_steady_state(0.8,100.0,90.0,1e6);
        assert!((s - 0.8).abs() < 1e-4);
        assert_eq!(gre_steady_state(0.0,1000.0,15.0,50.0),0.0);
        assert_eq!(gre_steady_state(1.0,0.0,15.0,50.0),0.0);
        // short T1 gives more signal at short TR
        assert!(gre_steady_state(1.0,300.0,30.0,50.0) > gre_steady_state(1.0,3000.0,30.0,50.0));
    }
}
