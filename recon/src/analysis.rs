use std::f64::consts::SQRT_2;
use std::path::Path;
use ndarray::{Array1, Array3, Zip};
use num_complex::Complex32;
use thiserror::Error;
use tracing::{debug, info};
use headfile::headfile::Headfile;
use mr_data::ground_truth::{Dynamic, GroundTruth};
use mr_data::measurement::MeasurementReader;
use crate::reconstructor::ReconError;

#[derive(Debug,Error)]
pub enum AnalysisError {
    #[error("{found} frames cannot fit a model with {n_regressors} regressors")]
    TooFewFrames {
        found:usize,
        n_regressors:usize,
    },
    #[error("volume has shape {found:?}, label map is {expected:?}")]
    Shape {
        found:Vec<usize>,
        expected:Vec<usize>,
    },
    #[error("no time course named {0:?} in the ground truth")]
    NoDynamic(String),
    #[error("regressor is constant over the frames")]
    FlatRegressor,
    #[error("alpha must be in (0,1), found {0}")]
    Alpha(f64),
}

/// how the detection threshold is set from alpha
#[derive(Clone,Copy,Debug,Default,PartialEq,Eq,clap::ValueEnum)]
pub enum HeightControl {
    /// voxel-wise false positive rate
    #[default]
    Fpr,
    /// Benjamini-Hochberg false discovery rate
    Fdr,
}

impl HeightControl {
    pub fn name(&self) -> &'static str {
        match self {
            HeightControl::Fpr => "fpr",
            HeightControl::Fdr => "fdr",
        }
    }
}

#[derive(Clone,Debug,PartialEq)]
pub struct AnalysisConfig {
    pub alpha:f64,
    pub height_control:HeightControl,
    /// time course to test, the first one stored when None
    pub dynamic:Option<String>,
}

/// complementary error function, fractional error below 1.2e-7
fn erfc(x:f64) -> f64 {
    let z = x.abs();
    let t = 1.0/(1.0 + 0.5*z);
    let poly = -1.26551223 + t*(1.00002368 + t*(0.37409196 + t*(0.09678418 + t*(-0.18628806
        + t*(0.27886807 + t*(-1.13520398 + t*(1.48851587 + t*(-0.82215223 + t*0.17087277))))))));
    let r = t*(-z*z + poly).exp();
    match x >= 0.0 {
        true => r,
        false => 2.0 - r
    }
}

/// upper tail probability of the standard normal
pub fn normal_sf(z:f64) -> f64 {
    0.5*erfc(z/SQRT_2)
}

/// standard normal quantile, rational approximation with relative error below 1.2e-9
fn normal_ppf(p:f64) -> f64 {
    const A:[f64;6] = [-3.969683028665376e+01,2.209460984245205e+02,-2.759285104469687e+02,1.383577518672690e+02,-3.066479806614716e+01,2.506628277459239e+00];
    const B:[f64;5] = [-5.447609879822406e+01,1.615858368580409e+02,-1.556989798598866e+02,6.680131188771972e+01,-1.328068155288572e+01];
    const C:[f64;6] = [-7.784894002430293e-03,-3.223964580411365e-01,-2.400758277161838e+00,-2.549732539343734e+00,4.374664141464968e+00,2.938163982698783e+00];
    const D:[f64;4] = [7.784695709041462e-03,3.224671290700398e-01,2.445134137142996e+00,3.754408661907416e+00];
    const P_LOW:f64 = 0.02425;
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let tail = |q:f64| (((((C[0]*q + C[1])*q + C[2])*q + C[3])*q + C[4])*q + C[5])
        / ((((D[0]*q + D[1])*q + D[2])*q + D[3])*q + 1.0);
    if p < P_LOW {
        tail((-2.0*p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q*q;
        (((((A[0]*r + A[1])*r + A[2])*r + A[3])*r + A[4])*r + A[5])*q
            / (((((B[0]*r + B[1])*r + B[2])*r + B[3])*r + B[4])*r + 1.0)
    } else {
        -tail((-2.0*(1.0 - p).ln()).sqrt())
    }
}

/// z above which the upper tail holds alpha
pub fn normal_isf(alpha:f64) -> f64 {
    -normal_ppf(alpha)
}

/// Mean of the time course over the shots of every frame. Frame f covers shots
/// f*shots_per_frame .. (f+1)*shots_per_frame, one every tr_s.
pub fn frame_regressor(dynamic:&Dynamic,n_frames:usize,shots_per_frame:usize,tr_s:f64) -> Array1<f64> {
    let spf = shots_per_frame.max(1);
    Array1::from_shape_fn(n_frames,|f| {
        (0..spf).map(|k| dynamic.value(((f*spf + k) as f64)*tr_s)).sum::<f64>()/spf as f64
    })
}

/// Voxel-wise least squares fit of |volume| = beta*regressor + intercept, inside mask.
/// Returns the t statistic of beta, 0 outside the mask.
pub fn contrast_map(volumes:&[Array3<Complex32>],regressor:&Array1<f64>,mask:&Array3<bool>) -> Result<Array3<f64>,AnalysisError> {
    let n = volumes.len();
    if n < 3 || regressor.len() != n {
        return Err(AnalysisError::TooFewFrames{found:n.min(regressor.len()),n_regressors:2});
    }
    if let Some(v) = volumes.iter().find(|v| v.shape() != mask.shape()) {
        return Err(AnalysisError::Shape{found:v.shape().to_vec(),expected:mask.shape().to_vec()});
    }
    let nf = n as f64;
    let sr = regressor.sum();
    let srr = regressor.dot(regressor);
    let det = nf*srr - sr*sr;
    if det <= f64::EPSILON*nf*srr.max(1.0) {
        return Err(AnalysisError::FlatRegressor);
    }
    // inverse of [[srr, sr], [sr, n]]
    let (i00,i01,i11) = (nf/det,-sr/det,srr/det);
    let dof = nf - 2.0;

    let mut stat = Array3::<f64>::zeros(mask.dim());
    let mut y = vec![0f64;n];
    Zip::indexed(&mut stat).and(mask).for_each(|idx,t,inside| {
        if !*inside {
            return;
        }
        y.iter_mut().zip(volumes.iter()).for_each(|(y,v)| *y = v[idx].norm() as f64);
        let sy:f64 = y.iter().sum();
        let sry:f64 = y.iter().zip(regressor.iter()).map(|(y,r)| y*r).sum();
        let beta = i00*sry + i01*sy;
        let intercept = i01*sry + i11*sy;
        let rss:f64 = y.iter().zip(regressor.iter()).map(|(y,r)| (y - beta*r - intercept).powi(2)).sum();
        let se = (rss/dof*i00).sqrt().max(f64::MIN_POSITIVE);
        *t = beta/se;
    });
    Ok(stat)
}

/// Statistic threshold for alpha. The fdr threshold is taken over the given values and is
/// infinite when nothing survives.
pub fn height_threshold(values:&[f64],alpha:f64,control:HeightControl) -> Result<f64,AnalysisError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(AnalysisError::Alpha(alpha));
    }
    Ok(match control {
        HeightControl::Fpr => normal_isf(alpha),
        HeightControl::Fdr => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a,b| b.total_cmp(a));
            let m = sorted.len() as f64;
            sorted.iter().enumerate()
                .filter(|(i,z)| normal_sf(**z) < alpha*(*i + 1) as f64/m)
                .last()
                .map(|(_,z)| z - 1e-12)
                .unwrap_or(f64::INFINITY)
        }
    })
}

pub fn threshold_map(stat:&Array3<f64>,threshold:f64) -> Array3<bool> {
    stat.mapv(|s| s > threshold)
}

/// Detection counts over the whole volume
#[derive(Clone,Copy,Debug,Default,PartialEq,Eq)]
pub struct Confusion {
    pub true_pos:usize,
    pub false_pos:usize,
    pub true_neg:usize,
    pub false_neg:usize,
}

impl Confusion {

    pub fn from_maps(detected:&Array3<bool>,truth:&Array3<bool>) -> Self {
        let mut c = Confusion::default();
        Zip::from(detected).and(truth).for_each(|d,t| match (*d,*t) {
            (true,true) => c.true_pos += 1,
            (true,false) => c.false_pos += 1,
            (false,false) => c.true_neg += 1,
            (false,true) => c.false_neg += 1,
        });
        c
    }

    pub fn tpr(&self) -> f64 {
        ratio(self.true_pos,self.true_pos + self.false_neg)
    }

    pub fn fpr(&self) -> f64 {
        ratio(self.false_pos,self.false_pos + self.true_neg)
    }

    pub fn balanced_accuracy(&self) -> f64 {
        (self.tpr() + 1.0 - self.fpr())/2.0
    }
}

fn ratio(a:usize,b:usize) -> f64 {
    match b {
        0 => 0.0,
        _ => a as f64/b as f64
    }
}

#[derive(Clone,Copy,Debug,PartialEq)]
pub struct RocPoint {
    pub threshold:f64,
    pub tpr:f64,
    pub fpr:f64,
}

/// Operating points for every distinct statistic value, strictest first. A voxel is
/// detected at a point when its statistic is >= the threshold.
pub fn roc(stat:&Array3<f64>,truth:&Array3<bool>) -> Vec<RocPoint> {
    let mut pairs:Vec<(f64,bool)> = stat.iter().copied().zip(truth.iter().copied()).collect();
    pairs.sort_by(|a,b| b.0.total_cmp(&a.0));
    let p = pairs.iter().filter(|(_,t)| *t).count();
    let n = pairs.len() - p;
    let mut points = vec![RocPoint{threshold:f64::INFINITY,tpr:0.0,fpr:0.0}];
    let (mut tp,mut fp) = (0,0);
    for (i,(s,t)) in pairs.iter().enumerate() {
        match *t {
            true => tp += 1,
            false => fp += 1,
        }
        let last_of_value = pairs.get(i + 1).map_or(true,|next| next.0 != *s);
        if last_of_value {
            points.push(RocPoint{threshold:*s,tpr:ratio(tp,p),fpr:ratio(fp,n)});
        }
    }
    points
}

/// trapezoid area under the curve
pub fn auc(points:&[RocPoint]) -> f64 {
    points.windows(2).map(|w| (w[1].fpr - w[0].fpr)*(w[1].tpr + w[0].tpr)/2.0).sum()
}

/// Detection of one time course in a reconstructed series
#[derive(Clone,Debug)]
pub struct Analysis {
    pub dynamic:String,
    pub alpha:f64,
    pub height_control:HeightControl,
    pub threshold:f64,
    pub stat:Array3<f64>,
    pub detected:Array3<bool>,
    pub confusion:Confusion,
    pub auc:f64,
}

impl Analysis {

    pub fn headfile(&self) -> Headfile {
        let c = &self.confusion;
        let mut h = Headfile::new();
        h.insert("analysis_dynamic",&self.dynamic);
        h.insert("analysis_alpha",self.alpha);
        h.insert("analysis_height_control",self.height_control.name());
        h.insert("analysis_threshold",self.threshold);
        h.insert("analysis_tp",c.true_pos);
        h.insert("analysis_fp",c.false_pos);
        h.insert("analysis_tn",c.true_neg);
        h.insert("analysis_fn",c.false_neg);
        h.insert("analysis_tpr",c.tpr());
        h.insert("analysis_fpr",c.fpr());
        h.insert("analysis_balanced_accuracy",c.balanced_accuracy());
        h.insert("analysis_auc",self.auc);
        h
    }
}

/// fit, threshold and score volumes against the roi of the ground truth
pub fn analyze(volumes:&[Array3<Complex32>],truth:&GroundTruth,shots_per_frame:usize,tr_s:f64,config:&AnalysisConfig) -> Result<Analysis,AnalysisError> {
    let dynamic = match &config.dynamic {
        Some(name) => truth.dynamic(name).ok_or_else(|| AnalysisError::NoDynamic(name.clone()))?,
        None => truth.dynamics.first().ok_or_else(|| AnalysisError::NoDynamic(String::from("any")))?,
    };
    let regressor = frame_regressor(dynamic,volumes.len(),shots_per_frame,tr_s);
    let mask = truth.object_mask();
    let stat = contrast_map(volumes,&regressor,&mask)?;
    let inside:Vec<f64> = stat.iter().zip(mask.iter()).filter(|(_,m)| **m).map(|(s,_)| *s).collect();
    let threshold = height_threshold(&inside,config.alpha,config.height_control)?;
    let detected = threshold_map(&stat,threshold);
    let roi = truth.roi_mask();
    let confusion = Confusion::from_maps(&detected,&roi);
    let auc = auc(&roc(&stat,&roi));
    debug!("{}: threshold {:.3}, {:?}",dynamic.name,threshold,confusion);
    Ok(Analysis {
        dynamic:dynamic.name.clone(),
        alpha:config.alpha,
        height_control:config.height_control,
        threshold,
        stat,
        detected,
        confusion,
        auc,
    })
}

/// analysis of volumes reconstructed from the measurement at path, using the ground truth and
/// timing stored in it
pub fn analyze_measurement(path:&Path,volumes:&[Array3<Complex32>],config:&AnalysisConfig) -> Result<Analysis,ReconError> {
    let mut reader = MeasurementReader::open(path)?;
    let truth = reader.ground_truth()?;
    let spf:usize = reader.metadata().get_parsed("shots_per_frame")?;
    let tr_ms:f64 = reader.metadata().get_parsed("TR")?;
    let a = analyze(volumes,&truth,spf,tr_ms/1000.0,config)?;
    info!("{} at {} {}: tpr {:.3} fpr {:.3} balanced accuracy {:.3}",a.dynamic,a.height_control.name(),a.alpha,a.confusion.tpr(),a.confusion.fpr(),a.confusion.balanced_accuracy());
    Ok(a)
}
