use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{Array3, ShapeBuilder};
use nifti::writer::WriterOptions;
use num_complex::Complex32;
use thiserror::Error;
use utils::complex_vol_to_magnitude;

#[derive(Debug,Error)]
pub enum CflError {
    #[error("cfl io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad cfl header {0:?}: {1}")]
    Header(PathBuf,String),
    #[error("cfl data does not fit dimensions {0:?}")]
    Size(Vec<usize>),
    #[error("nifti: {0}")]
    Nifti(#[from] nifti::NiftiError),
}

/// base path with ".{ext}" appended, dots already in the base name are kept
pub fn with_suffix(base:&Path,ext:&str) -> PathBuf {
    PathBuf::from(format!("{}.{}",base.display(),ext))
}

fn cfl_base_decode(cfl_base:&Path) -> (PathBuf,PathBuf) {
    (with_suffix(cfl_base,"hdr"),with_suffix(cfl_base,"cfl"))
}

/// "# key" lines followed by their value line
pub fn load_cfl_header(cfl_base:&Path) -> Result<HashMap<String,String>,CflError> {
    let (hdr,_) = cfl_base_decode(cfl_base);
    let mut f = File::open(&hdr)?;
    let mut s = String::new();
    f.read_to_string(&mut s)?;
    let lines:Vec<&str> = s.lines().collect();
    let mut h = HashMap::<String,String>::new();
    lines.iter().enumerate().filter(|(_,line)| line.starts_with('#')).for_each(|(i,line)| {
        h.insert(line.to_string(),lines.get(i+1).unwrap_or(&"").to_string());
    });
    Ok(h)
}

/// first three dimensions, in column-major (bart) order
pub fn get_dims(cfl_base:&Path) -> Result<[usize;3],CflError> {
    let h = load_cfl_header(cfl_base)?;
    let d = h.get("# Dimensions").ok_or(CflError::Header(cfl_base.to_owned(),String::from("no dimensions")))?;
    let dims:Vec<usize> = d.split_whitespace().map(|s| s.parse::<usize>())
        .collect::<Result<_,_>>()
        .map_err(|e| CflError::Header(cfl_base.to_owned(),e.to_string()))?;
    if dims.len() < 3 || dims.iter().skip(3).any(|d| *d != 1) {
        return Err(CflError::Header(cfl_base.to_owned(),format!("expected a volume, found dimensions {:?}",dims)));
    }
    Ok([dims[0],dims[1],dims[2]])
}

fn write_cfl_header(shape:&[usize],cfl_base:&Path) -> Result<(),CflError> {
    let (hdr,_) = cfl_base_decode(cfl_base);
    let mut hdr = File::create(hdr)?;
    let hdr_str = format!("# Dimensions\n{} {} {} 1 1\n",shape[0],shape[1],shape[2]);
    hdr.write_all(hdr_str.as_bytes())?;
    Ok(())
}

/// volume as bart cfl pair. The first array axis is the fastest varying dimension on disk.
pub fn write_cfl_vol(vol:&Array3<Complex32>,cfl_base:&Path) -> Result<(),CflError> {
    let (_,cfl) = cfl_base_decode(cfl_base);
    // column-major walk
    let flat:Vec<f32> = vol.t().iter().flat_map(|c| [c.re,c.im]).collect();
    let mut byte_buff = vec![0u8;flat.len()*4];
    LittleEndian::write_f32_into(&flat,&mut byte_buff);
    File::create(cfl)?.write_all(&byte_buff)?;
    write_cfl_header(vol.shape(),cfl_base)
}

pub fn read_cfl_vol(cfl_base:&Path) -> Result<Array3<Complex32>,CflError> {
    let dims = get_dims(cfl_base)?;
    let (_,cfl) = cfl_base_decode(cfl_base);
    let mut buf = Vec::<u8>::new();
    File::open(cfl)?.read_to_end(&mut buf)?;
    let mut flat = vec![0f32;buf.len()/4];
    LittleEndian::read_f32_into(&buf[..flat.len()*4],&mut flat);
    let c:Vec<Complex32> = flat.chunks_exact(2).map(|c| Complex32::new(c[0],c[1])).collect();
    Array3::from_shape_vec(dims.f(),c).map_err(|_| CflError::Size(dims.to_vec()))
}

/// magnitude image as nifti
pub fn to_nifti(vol:&Array3<Complex32>,nifti_path:&Path) -> Result<(),CflError> {
    map_to_nifti(&complex_vol_to_magnitude(vol),nifti_path)
}

/// real valued map, e.g. a statistic, as nifti
pub fn map_to_nifti(map:&Array3<f32>,nifti_path:&Path) -> Result<(),CflError> {
    WriterOptions::new(nifti_path).write_nifti(map)?;
    Ok(())
}
