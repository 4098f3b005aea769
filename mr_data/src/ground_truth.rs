use ndarray::Array3;
use headfile::headfile::{Headfile, HeadfileError};

/// label value of voxels outside the object
pub const BACKGROUND_LABEL:u8 = 0;

#[derive(Clone,Debug,PartialEq)]
pub struct TissueRecord {
    pub name:String,
    pub pd:f32,
    pub t1_ms:f32,
    pub t2_ms:f32,
    pub t2s_ms:f32,
}

/// stimulus event, seconds
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct EventRecord {
    pub onset:f64,
    pub duration:f64,
    pub amplitude:f64,
}

/// Time course a handler drove the simulation with
#[derive(Clone,Debug,PartialEq)]
pub struct Dynamic {
    pub name:String,
    /// sample spacing of values, seconds
    pub dt_s:f64,
    pub values:Vec<f64>,
    pub events:Vec<EventRecord>,
}

impl Dynamic {

    /// linear interpolation, 0 outside the sampled range
    pub fn value(&self,t_s:f64) -> f64 {
        if t_s < 0.0 || self.dt_s <= 0.0 {
            return 0.0;
        }
        let x = t_s/self.dt_s;
        let i = x.floor() as usize;
        match (self.values.get(i),self.values.get(i + 1)) {
            (Some(a),Some(b)) => a + (b - a)*(x - i as f64),
            (Some(a),None) => *a,
            _ => 0.0
        }
    }
}

/// What the simulation was built from, stored next to the k-space so scores can be computed
/// from the measurement alone
#[derive(Clone,Debug,PartialEq)]
pub struct GroundTruth {
    pub phantom:String,
    pub roi_tissue:String,
    /// indexed by label value
    pub tissues:Vec<TissueRecord>,
    pub labels:Array3<u8>,
    pub dynamics:Vec<Dynamic>,
}

impl GroundTruth {

    pub fn roi_label(&self) -> Option<u8> {
        self.tissues.iter().position(|t| t.name == self.roi_tissue).map(|i| i as u8)
    }

    /// voxels of the roi tissue, all false if the roi is not in the table
    pub fn roi_mask(&self) -> Array3<bool> {
        match self.roi_label() {
            Some(l) => self.labels.mapv(|v| v == l),
            None => Array3::from_elem(self.labels.dim(),false),
        }
    }

    /// voxels that are not background
    pub fn object_mask(&self) -> Array3<bool> {
        self.labels.mapv(|v| v != BACKGROUND_LABEL)
    }

    pub fn dynamic(&self,name:&str) -> Option<&Dynamic> {
        self.dynamics.iter().find(|d| d.name == name)
    }

    /// everything but the label map, as key=value text
    pub(crate) fn to_headfile(&self) -> Headfile {
        let mut h = Headfile::new();
        h.insert("phantom",&self.phantom);
        h.insert("roi_tissue",&self.roi_tissue);
        h.insert("n_tissues",self.tissues.len());
        for (i,t) in self.tissues.iter().enumerate() {
            h.insert(format!("tissue_{}_name",i),&t.name);
            h.insert_list(&format!("tissue_{}_params",i),&[t.pd,t.t1_ms,t.t2_ms,t.t2s_ms]);
        }
        h.insert("n_dynamics",self.dynamics.len());
        for (i,d) in self.dynamics.iter().enumerate() {
            h.insert(format!("dynamic_{}_name",i),&d.name);
            h.insert(format!("dynamic_{}_dt_s",i),d.dt_s);
            h.insert_list(&format!("dynamic_{}_values",i),&d.values);
            let onsets:Vec<f64> = d.events.iter().map(|e| e.onset).collect();
            let durations:Vec<f64> = d.events.iter().map(|e| e.duration).collect();
            let amplitudes:Vec<f64> = d.events.iter().map(|e| e.amplitude).collect();
            h.insert_list(&format!("dynamic_{}_event_onsets",i),&onsets);
            h.insert_list(&format!("dynamic_{}_event_durations",i),&durations);
            h.insert_list(&format!("dynamic_{}_event_amplitudes",i),&amplitudes);
        }
        h
    }

    pub(crate) fn from_headfile(h:&Headfile,labels:Array3<u8>) -> Result<Self,HeadfileError> {
        let n_tissues:usize = h.get_parsed("n_tissues")?;
        let mut tissues = Vec::with_capacity(n_tissues);
        for i in 0..n_tissues {
            let key = format!("tissue_{}_params",i);
            let p:Vec<f32> = h.get_list(&key)?;
            if p.len() != 4 {
                return Err(HeadfileError::Parse{field:key,value:format!("{:?}",p)});
            }
            tissues.push(TissueRecord {
                name:h.get(&format!("tissue_{}_name",i))?.to_string(),
                pd:p[0],
                t1_ms:p[1],
                t2_ms:p[2],
                t2s_ms:p[3],
            });
        }
        let n_dynamics:usize = h.get_parsed("n_dynamics")?;
        let mut dynamics = Vec::with_capacity(n_dynamics);
        for i in 0..n_dynamics {
            let onsets:Vec<f64> = h.get_list(&format!("dynamic_{}_event_onsets",i))?;
            let durations:Vec<f64> = h.get_list(&format!("dynamic_{}_event_durations",i))?;
            let amplitudes:Vec<f64> = h.get_list(&format!("dynamic_{}_event_amplitudes",i))?;
            if onsets.len() != durations.len() || onsets.len() != amplitudes.len() {
                let key = format!("dynamic_{}_event_durations",i);
                return Err(HeadfileError::Parse{field:key.clone(),value:h.get(&key)?.to_string()});
            }
            let events = onsets.iter().zip(durations.iter()).zip(amplitudes.iter())
                .map(|((&onset,&duration),&amplitude)| EventRecord{onset,duration,amplitude})
                .collect();
            dynamics.push(Dynamic {
                name:h.get(&format!("dynamic_{}_name",i))?.to_string(),
                dt_s:h.get_parsed(&format!("dynamic_{}_dt_s",i))?,
                values:h.get_list(&format!("dynamic_{}_values",i))?,
                events,
            });
        }
        Ok(Self {
            phantom:h.get("phantom")?.to_string(),
            roi_tissue:h.get("roi_tissue")?.to_string(),
            tissues,
            labels,
            dynamics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth() -> GroundTruth {
        let tissues = vec![
            TissueRecord{name:String::from("background"),pd:0.0,t1_ms:0.0,t2_ms:0.0,t2s_ms:0.0},
            TissueRecord{name:String::from("gray_matter"),pd:0.85,t1_ms:1820.0,t2_ms:99.0,t2s_ms:66.0},
            TissueRecord{name:String::from("roi"),pd:0.85,t1_ms:1820.0,t2_ms:99.0,t2s_ms:66.0},
        ];
        GroundTruth {
            phantom:String::from("shepp_logan"),
            roi_tissue:String::from("roi"),
            tissues,
            labels:Array3::from_shape_fn((3,2,2),|(x,y,_)| match (x,y) {
                (0,_) => 0,
                (1,1) => 2,
                _ => 1,
            }),
            dynamics:vec![Dynamic {
                name:String::from("block_activation"),
                dt_s:0.5,
                values:vec![0.0,0.25,1.0,0.125],
                events:vec![EventRecord{onset:0.5,duration:1.0,amplitude:1.0}],
            }],
        }
    }

    #[test]
    fn masks_follow_the_labels() {
        let t = truth();
        assert_eq!(t.roi_label(),Some(2));
        assert_eq!(t.roi_mask().iter().filter(|m| **m).count(),2);
        assert_eq!(t.object_mask().iter().filter(|m| **m).count(),8);
        let mut other = t.clone();
        other.roi_tissue = String::from("tumor");
        assert!(!other.roi_mask().iter().any(|m| *m));
    }

    #[test]
    fn dynamics_interpolate() {
        let t = truth();
        let d = &t.dynamics[0];
        assert_eq!(d.value(-1.0),0.0);
        assert_eq!(d.value(0.75),0.625);
        assert_eq!(d.value(1.5),0.125);
        assert_eq!(d.value(100.0),0.0);
    }

    #[test]
    fn text_form_reads_back() {
        let t = truth();
        let text = t.to_headfile().to_text();
        let back = GroundTruth::from_headfile(&Headfile::from_text(&text),t.labels.clone()).unwrap();
        assert_eq!(back,t);
    }

    #[test]
    fn missing_entries_are_errors() {
        let mut h = truth().to_headfile();
        h.insert("dynamic_0_event_onsets","0.5 2.0");
        assert!(GroundTruth::from_headfile(&h,Array3::zeros((3,2,2))).is_err());
        assert!(matches!(
            GroundTruth::from_headfile(&Headfile::new(),Array3::zeros((1,1,1))),
            Err(HeadfileError::MissingField(_))
        ));
    }
}
