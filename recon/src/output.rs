use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use tracing::info;
use headfile::headfile::Headfile;
use num_complex::Complex32;
use mr_data::cfl::{map_to_nifti, to_nifti, with_suffix, write_cfl_vol};
use utils::m_number;
use crate::analysis::Analysis;
use crate::reconstructor::{ReconError, ReconOutput};

/// headfile entries describing how every frame was reconstructed
pub fn diagnostics_headfile(output:&ReconOutput) -> Headfile {
    let n = output.diagnostics.len();
    let mut h = Headfile::new();
    h.insert("reconstructor",&output.reconstructor);
    h.insert("n_frames",n);
    h.insert("n_converged",output.n_converged());
    for d in output.diagnostics.iter() {
        let m = m_number(d.frame,n);
        h.insert(format!("{}_iterations",m),d.iterations);
        h.insert(format!("{}_converged",m),d.converged);
        h.insert(format!("{}_relative_change",m),d.relative_change);
    }
    h
}

/// Write one cfl per frame as {base}_{m_number}, optional magnitude niftis next to them, and
/// {base}.headfile with the frame diagnostics. Returns the cfl base names.
pub fn write_outputs(out_dir:&Path,base:&str,output:&ReconOutput,nifti:bool) -> Result<Vec<PathBuf>,ReconError> {
    create_dir_all(out_dir)?;
    let n = output.volumes.len();
    let mut written = Vec::with_capacity(n);
    for (i,vol) in output.volumes.iter().enumerate() {
        let cfl_base = out_dir.join(format!("{}_{}",base,m_number(i,n)));
        write_cfl_vol(vol,&cfl_base)?;
        if nifti {
            to_nifti(vol,&with_suffix(&cfl_base,"nii"))?;
        }
        written.push(cfl_base);
    }
    let hf = with_suffix(&out_dir.join(base),"headfile");
    diagnostics_headfile(output).write(&hf)?;
    info!("{} volumes written to {:?}",n,out_dir);
    Ok(written)
}

/// Statistic map as {base}_stat (cfl, nifti on request) and the scores merged into
/// {base}.headfile. Returns the cfl base of the map.
pub fn write_analysis(out_dir:&Path,base:&str,analysis:&Analysis,nifti:bool) -> Result<PathBuf,ReconError> {
    create_dir_all(out_dir)?;
    let stat_base = out_dir.join(format!("{}_stat",base));
    let stat = analysis.stat.mapv(|s| Complex32::new(s as f32,0.0));
    write_cfl_vol(&stat,&stat_base)?;
    if nifti {
        map_to_nifti(&analysis.stat.mapv(|s| s as f32),&with_suffix(&stat_base,"nii"))?;
        let detected = analysis.detected.mapv(|d| if d {1.0f32} else {0.0});
        map_to_nifti(&detected,&with_suffix(&out_dir.join(format!("{}_detected",base)),"nii"))?;
    }
    Headfile::append(&with_suffix(&out_dir.join(base),"headfile"),&analysis.headfile())?;
    Ok(stat_base)
}
