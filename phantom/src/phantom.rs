use std::path::Path;
use ndarray::{Array3, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use thiserror::Error;
use tracing::info;
use sim_conf::scenario::{PhantomConfig, PhantomKind};
use sim_conf::sim_conf::SimConfig;
use crate::tissue::{self, Tissue, BACKGROUND};

#[derive(Debug,Error)]
pub enum PhantomError {
    #[error("unknown tissue {0}")]
    UnknownTissue(String),
    #[error("label map has shape {found:?}, simulation expects {expected:?}")]
    ShapeMismatch {
        found:Vec<usize>,
        expected:[usize;3],
    },
    #[error("label value {0} has no tissue class")]
    UnknownLabel(f32),
    #[error("the nifti phantom needs a label map path")]
    MissingPath,
    #[error("cannot read label map: {0}")]
    Nifti(#[from] nifti::NiftiError),
}

/// Ground truth volume. Built once per run and shared read only.
#[derive(Clone,Debug)]
pub struct Phantom {
    pub name:String,
    pub sub_id:u32,
    pub fov_mm:[f64;3],
    pub tissues:Vec<Tissue>,
    /// index into tissues, 0 is background
    pub labels:Array3<u8>,
    pub roi_tissue:String,
}

/// ellipsoid in normalized [-1,1] coordinates, rotated by theta (deg) about z
struct Ellipsoid {
    center:[f64;3],
    axes:[f64;3],
    theta:f64,
    tissue:&'static str,
}

const fn ellipsoid(center:[f64;3],axes:[f64;3],theta:f64,tissue:&'static str) -> Ellipsoid {
    Ellipsoid{center,axes,theta,tissue}
}

/// MR flavour of the 3-D Shepp-Logan head. Later entries paint over earlier ones.
const SHEPP_LOGAN:[Ellipsoid;10] = [
    ellipsoid([0.0,0.0,0.0],[0.72,0.95,0.93],0.0,"scalp"),
    ellipsoid([0.0,0.0,0.0],[0.69,0.92,0.90],0.0,"marrow"),
    ellipsoid([0.0,-0.0184,0.0],[0.6624,0.874,0.88],0.0,"csf"),
    ellipsoid([0.0,-0.0184,0.0],[0.6524,0.864,0.87],0.0,"gray_matter"),
    ellipsoid([-0.22,0.0,-0.25],[0.41,0.16,0.21],-72.0,"csf"),
    ellipsoid([0.22,0.0,-0.25],[0.31,0.11,0.22],72.0,"csf"),
    ellipsoid([0.0,0.35,-0.25],[0.21,0.25,0.35],0.0,"white_matter"),
    ellipsoid([0.0,-0.35,0.25],[0.30,0.25,0.45],0.0,"roi"),
    ellipsoid([-0.08,-0.605,-0.25],[0.046,0.023,0.02],0.0,"tumor"),
    ellipsoid([0.06,-0.605,-0.25],[0.046,0.023,0.02],90.0,"tumor"),
];

impl Phantom {

    pub fn build(config:&PhantomConfig,sim:&SimConfig) -> Result<Self,PhantomError> {
        let dims = sim.dims();
        let mut phantom = match config.name {
            PhantomKind::SheppLogan => Self::shepp_logan(dims,sim.fov()),
            PhantomKind::Nifti => {
                let path = config.path.as_ref().ok_or(PhantomError::MissingPath)?;
                Self::from_nifti(path,dims,sim.fov())?
            }
        };
        phantom.sub_id = config.sub_id;
        phantom.roi_tissue = config.roi_tissue.clone();
        for name in config.tissue_ignore.iter() {
            phantom.ignore_tissue(name)?;
        }
        info!("phantom {} ready: {:?} voxels, {} roi voxels",phantom.name,dims,phantom.n_roi_voxels());
        Ok(phantom)
    }

    pub fn shepp_logan(dims:[usize;3],fov_mm:[f64;3]) -> Self {
        let tissues = tissue::tissue_table();
        let mut labels = Array3::<u8>::from_elem((dims[0],dims[1],dims[2]),BACKGROUND);
        for e in SHEPP_LOGAN.iter() {
            // every tissue of the table is present
            let label = tissue::label_of(&tissues,e.tissue).unwrap_or(BACKGROUND);
            let (sin_t,cos_t) = e.theta.to_radians().sin_cos();
            labels.indexed_iter_mut().for_each(|((i,j,k),l)| {
                let p = [normalized(i,dims[0]),normalized(j,dims[1]),normalized(k,dims[2])];
                let dx = p[0] - e.center[0];
                let dy = p[1] - e.center[1];
                let dz = p[2] - e.center[2];
                let xr = dx*cos_t + dy*sin_t;
                let yr = -dx*sin_t + dy*cos_t;
                let r = (xr/e.axes[0]).powi(2) + (yr/e.axes[1]).powi(2) + (dz/e.axes[2]).powi(2);
                if r <= 1.0 {
                    *l = label;
                }
            });
        }
        Self {
            name:String::from("shepp_logan"),
            sub_id:0,
            fov_mm,
            tissues,
            labels,
            roi_tissue:String::from("roi"),
        }
    }

    /// integer label map, labels index the built-in tissue table
    pub fn from_nifti(path:&Path,dims:[usize;3],fov_mm:[f64;3]) -> Result<Self,PhantomError> {
        let obj = ReaderOptions::new().read_file(path)?;
        let vol = obj.into_volume().into_ndarray::<f32>()?;
        let found = vol.shape().to_vec();
        let vol = vol.into_dimensionality::<Ix3>().map_err(|_| PhantomError::ShapeMismatch{found:found.clone(),expected:dims})?;
        if vol.shape() != dims {
            return Err(PhantomError::ShapeMismatch{found,expected:dims});
        }
        let tissues = tissue::tissue_table();
        let n_tissues = tissues.len() as f32;
        if let Some(bad) = vol.iter().find(|v| !(v.round() >= 0.0 && v.round() < n_tissues)) {
            return Err(PhantomError::UnknownLabel(*bad));
        }
        let labels = vol.mapv(|v| v.round() as u8);
        let name = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or(String::from("nifti"));
        Ok(Self {
            name,
            sub_id:0,
            fov_mm,
            tissues,
            labels,
            roi_tissue:String::from("roi"),
        })
    }

    pub fn dims(&self) -> [usize;3] {
        let s = self.labels.shape();
        [s[0],s[1],s[2]]
    }

    pub fn n_voxels(&self) -> usize {
        self.labels.len()
    }

    pub fn tissue_label(&self,name:&str) -> Result<u8,PhantomError> {
        tissue::label_of(&self.tissues,name).ok_or(PhantomError::UnknownTissue(name.to_string()))
    }

    /// replace a tissue by background
    pub fn ignore_tissue(&mut self,name:&str) -> Result<(),PhantomError> {
        let label = self.tissue_label(name)?;
        self.labels.mapv_inplace(|l| if l == label {BACKGROUND} else {l});
        Ok(())
    }

    pub fn roi_mask(&self) -> Array3<bool> {
        match tissue::label_of(&self.tissues,&self.roi_tissue) {
            Some(label) => self.labels.mapv(|l| l == label),
            None => Array3::from_elem(self.labels.raw_dim(),false)
        }
    }

    pub fn n_roi_voxels(&self) -> usize {
        self.roi_mask().iter().filter(|m| **m).count()
    }

    fn tissue_map<F:Fn(&Tissue) -> f32>(&self,f:F) -> Array3<f32> {
        let values:Vec<f32> = self.tissues.iter().map(f).collect();
        self.labels.mapv(|l| values.get(l as usize).copied().unwrap_or(0.0))
    }

    pub fn pd_map(&self) -> Array3<f32> {
        self.tissue_map(|t| t.pd)
    }

    pub fn t1_map(&self) -> Array3<f32> {
        self.tissue_map(|t| t.t1_ms)
    }

    /// 1/ms
    pub fn r2s_map(&self) -> Array3<f32> {
        self.tissue_map(|t| t.r2s())
    }
}

/// voxel center in [-1,1]
fn normalized(i:usize,n:usize) -> f64 {
    (i as f64 + 0.5)/n as f64 * 2.0 - 1.0
}
