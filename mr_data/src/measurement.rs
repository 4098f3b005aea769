use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{s, Array2, Array3, Array4};
use num_complex::Complex32;
use thiserror::Error;
use tracing::debug;
use headfile::headfile::{Headfile, HeadfileError};
use crate::ground_truth::GroundTruth;

pub const MAGIC:&[u8;8] = b"SNKMEAS1";
pub const VERSION:u32 = 2;
const OFFSET_TO_DATA:usize = 512;
const HEADER_SIZE:usize = 256;
const MAGIC_BYTES:Range<usize> = 0..8;
const VERSION_BYTES:Range<usize> = 8..12;
const STATUS_BYTES:Range<usize> = 12..16;
const N_X_BYTES:Range<usize> = 16..20;
const N_Y_BYTES:Range<usize> = 20..24;
const N_Z_BYTES:Range<usize> = 24..28;
const N_COILS_BYTES:Range<usize> = 28..32;
const N_FRAMES_BYTES:Range<usize> = 32..36;
const SHOTS_PER_FRAME_BYTES:Range<usize> = 36..40;
const SAMPLES_PER_SHOT_BYTES:Range<usize> = 40..44;
const METADATA_LEN_BYTES:Range<usize> = 44..52;
const TRUTH_LEN_BYTES:Range<usize> = 52..60;
/// scan counter, frame, shot in frame, flags
const SHOT_HEADER_SIZE:usize = 16;

const STATUS_INCOMPLETE:u32 = 0;
const STATUS_COMPLETE:u32 = 1;

pub const FLAG_FIRST_IN_FRAME:u32 = 1;
pub const FLAG_LAST_IN_FRAME:u32 = 1 << 1;

#[derive(Debug,Error)]
pub enum MeasurementError {
    #[error("measurement io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0:?} is not a measurement file")]
    BadMagic(PathBuf),
    #[error("unsupported measurement version {0}")]
    UnsupportedVersion(u32),
    #[error("{0:?} is flagged incomplete")]
    Incomplete(PathBuf),
    #[error("measurement file should have {expected} bytes, found {found}")]
    Truncated {
        expected:u64,
        found:u64,
    },
    #[error("shot {shot} out of range, file has {n_shots} shots")]
    ShotOutOfRange {
        shot:usize,
        n_shots:usize,
    },
    #[error("shot {shot}: {reason}")]
    BadShot {
        shot:usize,
        reason:String,
    },
    #[error("metadata: {0}")]
    Metadata(#[from] HeadfileError),
    #[error("bad measurement header: {0}")]
    Header(String),
}

fn overflow() -> MeasurementError {
    MeasurementError::Header(String::from("sizes do not fit in a file offset"))
}

fn header_u32(field:&str,value:usize) -> Result<u32,MeasurementError> {
    u32::try_from(value).map_err(|_| MeasurementError::Header(format!("{} = {} does not fit in 32 bits",field,value)))
}

fn to_usize(value:u64) -> Result<usize,MeasurementError> {
    usize::try_from(value).map_err(|_| overflow())
}

/// Byte offsets of every section. The header is followed by the metadata text, the ground
/// truth, the sensitivity maps and the shots
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
struct Layout {
    metadata_len:u64,
    truth_len:u64,
    truth_offset:u64,
    smaps_offset:u64,
    smaps_bytes:u64,
    shots_offset:u64,
    shot_bytes:u64,
    file_size:u64,
}

impl Layout {
    fn shot_offset(&self,shot:usize) -> Result<u64,MeasurementError> {
        (shot as u64).checked_mul(self.shot_bytes)
            .and_then(|o| o.checked_add(self.shots_offset))
            .ok_or_else(overflow)
    }
}

/// Fixed sizes of a measurement
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct MeasurementDims {
    pub matrix:[usize;3],
    pub n_coils:usize,
    pub n_frames:usize,
    pub shots_per_frame:usize,
    pub samples_per_shot:usize,
}

impl MeasurementDims {

    pub fn n_shots(&self) -> usize {
        self.n_frames * self.shots_per_frame
    }

    pub fn n_voxels(&self) -> usize {
        self.matrix.iter().product()
    }

    /// section sizes in u64, any overflow is a header error
    fn layout(&self,metadata_len:u64,truth_len:u64) -> Result<Layout,MeasurementError> {
        let mul = |a:u64,b:u64| a.checked_mul(b).ok_or_else(overflow);
        let add = |a:u64,b:u64| a.checked_add(b).ok_or_else(overflow);
        let n_voxels = self.matrix.iter().try_fold(1u64,|acc,n| mul(acc,*n as u64))?;
        let smaps_bytes = mul(mul(self.n_coils as u64,n_voxels)?,8)?;
        let ns = self.samples_per_shot as u64;
        let shot_bytes = add(add(SHOT_HEADER_SIZE as u64,mul(ns,3 * 4)?)?,mul(mul(self.n_coils as u64,ns)?,8)?)?;
        let n_shots = mul(self.n_frames as u64,self.shots_per_frame as u64)?;
        let truth_offset = add(OFFSET_TO_DATA as u64,metadata_len)?;
        let smaps_offset = add(truth_offset,truth_len)?;
        let shots_offset = add(smaps_offset,smaps_bytes)?;
        let file_size = add(shots_offset,mul(n_shots,shot_bytes)?)?;
        Ok(Layout {
            metadata_len,
            truth_len,
            truth_offset,
            smaps_offset,
            smaps_bytes,
            shots_offset,
            shot_bytes,
            file_size,
        })
    }
}

/// One readout as stored on disk
#[derive(Clone,Debug,PartialEq)]
pub struct ShotRecord {
    pub scan_counter:usize,
    pub frame:usize,
    pub shot_in_frame:usize,
    pub flags:u32,
    /// (samples, 3)
    pub traj:Array2<f32>,
    /// (coils, samples)
    pub data:Array2<Complex32>,
}

impl ShotRecord {

    pub fn flags_for(shot_in_frame:usize,shots_per_frame:usize) -> u32 {
        let mut flags = 0;
        if shot_in_frame == 0 {
            flags |= FLAG_FIRST_IN_FRAME;
        }
        if shot_in_frame + 1 == shots_per_frame {
            flags |= FLAG_LAST_IN_FRAME;
        }
        flags
    }

    fn to_bytes(&self,dims:&MeasurementDims,shot_bytes:usize) -> Result<Vec<u8>,MeasurementError> {
        let ns = dims.samples_per_shot;
        if self.traj.shape() != [ns,3] || self.data.shape() != [dims.n_coils,ns] {
            return Err(MeasurementError::BadShot{
                shot:self.scan_counter,
                reason:format!("traj {:?} / data {:?} do not match {} coils x {} samples",self.traj.shape(),self.data.shape(),dims.n_coils,ns),
            });
        }
        let counters = [self.scan_counter,self.frame,self.shot_in_frame].map(u32::try_from);
        let [Ok(scan_counter),Ok(frame),Ok(shot_in_frame)] = counters else {
            return Err(MeasurementError::BadShot{
                shot:self.scan_counter,
                reason:format!("frame {} shot {} do not fit in 32 bits",self.frame,self.shot_in_frame),
            });
        };
        let mut buf = vec![0u8;shot_bytes];
        LittleEndian::write_u32(&mut buf[0..4],scan_counter);
        LittleEndian::write_u32(&mut buf[4..8],frame);
        LittleEndian::write_u32(&mut buf[8..12],shot_in_frame);
        LittleEndian::write_u32(&mut buf[12..16],self.flags);
        let traj:Vec<f32> = self.traj.iter().copied().collect();
        let traj_end = SHOT_HEADER_SIZE + traj.len() * 4;
        LittleEndian::write_f32_into(&traj,&mut buf[SHOT_HEADER_SIZE..traj_end]);
        let data:Vec<f32> = self.data.iter().flat_map(|c| [c.re,c.im]).collect();
        LittleEndian::write_f32_into(&data,&mut buf[traj_end..]);
        Ok(buf)
    }

    fn from_bytes(buf:&[u8],dims:&MeasurementDims) -> Self {
        let ns = dims.samples_per_shot;
        let traj_end = SHOT_HEADER_SIZE + ns * 3 * 4;
        let mut traj = vec![0f32;ns * 3];
        LittleEndian::read_f32_into(&buf[SHOT_HEADER_SIZE..traj_end],&mut traj);
        let mut data = vec![0f32;dims.n_coils * ns * 2];
        LittleEndian::read_f32_into(&buf[traj_end..],&mut data);
        let data:Vec<Complex32> = data.chunks_exact(2).map(|c| Complex32::new(c[0],c[1])).collect();
        Self {
            scan_counter:LittleEndian::read_u32(&buf[0..4]) as usize,
            frame:LittleEndian::read_u32(&buf[4..8]) as usize,
            shot_in_frame:LittleEndian::read_u32(&buf[8..12]) as usize,
            flags:LittleEndian::read_u32(&buf[12..16]),
            traj:Array2::from_shape_vec((ns,3),traj).unwrap_or_else(|_| Array2::zeros((ns,3))),
            data:Array2::from_shape_vec((dims.n_coils,ns),data).unwrap_or_else(|_| Array2::zeros((dims.n_coils,ns))),
        }
    }
}

/// All shots of one frame, concatenated in acquisition order
#[derive(Clone,Debug)]
pub struct FrameData {
    pub frame:usize,
    /// (samples, 3)
    pub traj:Array2<f32>,
    /// (coils, samples)
    pub kspace:Array2<Complex32>,
}

fn encode_header(dims:&MeasurementDims,layout:&Layout,status:u32) -> Result<[u8;HEADER_SIZE],MeasurementError> {
    let mut h = [0u8;HEADER_SIZE];
    h[MAGIC_BYTES].copy_from_slice(MAGIC);
    LittleEndian::write_u32(&mut h[VERSION_BYTES],VERSION);
    LittleEndian::write_u32(&mut h[STATUS_BYTES],status);
    LittleEndian::write_u32(&mut h[N_X_BYTES],header_u32("nx",dims.matrix[0])?);
    LittleEndian::write_u32(&mut h[N_Y_BYTES],header_u32("ny",dims.matrix[1])?);
    LittleEndian::write_u32(&mut h[N_Z_BYTES],header_u32("nz",dims.matrix[2])?);
    LittleEndian::write_u32(&mut h[N_COILS_BYTES],header_u32("n_coils",dims.n_coils)?);
    LittleEndian::write_u32(&mut h[N_FRAMES_BYTES],header_u32("n_frames",dims.n_frames)?);
    LittleEndian::write_u32(&mut h[SHOTS_PER_FRAME_BYTES],header_u32("shots_per_frame",dims.shots_per_frame)?);
    LittleEndian::write_u32(&mut h[SAMPLES_PER_SHOT_BYTES],header_u32("samples_per_shot",dims.samples_per_shot)?);
    LittleEndian::write_u64(&mut h[METADATA_LEN_BYTES],layout.metadata_len);
    LittleEndian::write_u64(&mut h[TRUTH_LEN_BYTES],layout.truth_len);
    Ok(h)
}

fn encode_truth(truth:&GroundTruth,dims:&MeasurementDims) -> Result<Vec<u8>,MeasurementError> {
    if truth.labels.shape() != dims.matrix {
        return Err(MeasurementError::Header(format!("label map has shape {:?}, matrix is {:?}",truth.labels.shape(),dims.matrix)));
    }
    let mut bytes:Vec<u8> = truth.labels.iter().copied().collect();
    bytes.extend_from_slice(truth.to_headfile().to_text().as_bytes());
    Ok(bytes)
}

/// Single writer of a pre-sized measurement file. Shots may arrive in any order.
#[derive(Debug)]
pub struct MeasurementWriter {
    path:PathBuf,
    file:File,
    dims:MeasurementDims,
    layout:Layout,
    written:usize,
}

impl MeasurementWriter {

    /// sizes are checked and the header encoded before the file is touched
    pub fn create(path:&Path,dims:MeasurementDims,metadata:&Headfile,truth:&GroundTruth,smaps:&Array4<Complex32>) -> Result<Self,MeasurementError> {
        if smaps.shape() != [dims.n_coils,dims.matrix[0],dims.matrix[1],dims.matrix[2]] {
            return Err(MeasurementError::BadShot{shot:0,reason:format!("sensitivity maps have shape {:?}",smaps.shape())});
        }
        let text = metadata.to_text();
        let truth_bytes = encode_truth(truth,&dims)?;
        let layout = dims.layout(text.as_bytes().len() as u64,truth_bytes.len() as u64)?;
        let header = encode_header(&dims,&layout,STATUS_INCOMPLETE)?;
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        file.set_len(layout.file_size)?;
        file.write_all(&header)?;
        file.seek(SeekFrom::Start(OFFSET_TO_DATA as u64))?;
        file.write_all(text.as_bytes())?;
        file.write_all(&truth_bytes)?;
        let flat:Vec<f32> = smaps.iter().flat_map(|c| [c.re,c.im]).collect();
        let mut buf = vec![0u8;flat.len() * 4];
        LittleEndian::write_f32_into(&flat,&mut buf);
        file.write_all(&buf)?;
        debug!("created {:?} with {} shots",path,dims.n_shots());
        Ok(Self {
            path:path.to_owned(),
            file,
            dims,
            layout,
            written:0,
        })
    }

    pub fn dims(&self) -> &MeasurementDims {
        &self.dims
    }

    pub fn n_written(&self) -> usize {
        self.written
    }

    pub fn write_shot(&mut self,shot:&ShotRecord) -> Result<(),MeasurementError> {
        let n_shots = self.dims.n_shots();
        if shot.scan_counter >= n_shots {
            return Err(MeasurementError::ShotOutOfRange{shot:shot.scan_counter,n_shots});
        }
        let bytes = shot.to_bytes(&self.dims,to_usize(self.layout.shot_bytes)?)?;
        let offset = self.layout.shot_offset(shot.scan_counter)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        self.written += 1;
        Ok(())
    }

    /// flag the file complete. Only call once every shot is written
    pub fn finalize(mut self) -> Result<PathBuf,MeasurementError> {
        self.file.sync_data()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&encode_header(&self.dims,&self.layout,STATUS_COMPLETE)?)?;
        self.file.sync_all()?;
        Ok(self.path)
    }
}

/// Reader of complete measurement files
#[derive(Debug)]
pub struct MeasurementReader {
    path:PathBuf,
    file:File,
    dims:MeasurementDims,
    metadata:Headfile,
    layout:Layout,
}

impl MeasurementReader {

    pub fn open(path:&Path) -> Result<Self,MeasurementError> {
        let mut file = File::open(path)?;
        let mut h = [0u8;HEADER_SIZE];
        file.read_exact(&mut h).map_err(|_| MeasurementError::BadMagic(path.to_owned()))?;
        if &h[MAGIC_BYTES] != MAGIC {
            return Err(MeasurementError::BadMagic(path.to_owned()));
        }
        let version = LittleEndian::read_u32(&h[VERSION_BYTES]);
        if version != VERSION {
            return Err(MeasurementError::UnsupportedVersion(version));
        }
        if LittleEndian::read_u32(&h[STATUS_BYTES]) != STATUS_COMPLETE {
            return Err(MeasurementError::Incomplete(path.to_owned()));
        }
        let dims = MeasurementDims {
            matrix:[
                LittleEndian::read_u32(&h[N_X_BYTES]) as usize,
                LittleEndian::read_u32(&h[N_Y_BYTES]) as usize,
                LittleEndian::read_u32(&h[N_Z_BYTES]) as usize,
            ],
            n_coils:LittleEndian::read_u32(&h[N_COILS_BYTES]) as usize,
            n_frames:LittleEndian::read_u32(&h[N_FRAMES_BYTES]) as usize,
            shots_per_frame:LittleEndian::read_u32(&h[SHOTS_PER_FRAME_BYTES]) as usize,
            samples_per_shot:LittleEndian::read_u32(&h[SAMPLES_PER_SHOT_BYTES]) as usize,
        };
        let layout = dims.layout(
            LittleEndian::read_u64(&h[METADATA_LEN_BYTES]),
            LittleEndian::read_u64(&h[TRUTH_LEN_BYTES]),
        )?;
        let found = file.metadata()?.len();
        if found != layout.file_size {
            return Err(MeasurementError::Truncated{expected:layout.file_size,found});
        }
        if layout.truth_len < dims.n_voxels() as u64 {
            return Err(MeasurementError::Header(format!("ground truth section of {} bytes cannot hold the label map",layout.truth_len)));
        }
        file.seek(SeekFrom::Start(OFFSET_TO_DATA as u64))?;
        let mut text = vec![0u8;to_usize(layout.metadata_len)?];
        file.read_exact(&mut text)?;
        let metadata = Headfile::from_text(&String::from_utf8_lossy(&text));
        Ok(Self {
            path:path.to_owned(),
            file,
            dims,
            metadata,
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dims(&self) -> &MeasurementDims {
        &self.dims
    }

    pub fn metadata(&self) -> &Headfile {
        &self.metadata
    }

    /// phantom, label map and handler time courses the run was simulated from
    pub fn ground_truth(&mut self) -> Result<GroundTruth,MeasurementError> {
        let [nx,ny,nz] = self.dims.matrix;
        self.file.seek(SeekFrom::Start(self.layout.truth_offset))?;
        let mut buf = vec![0u8;to_usize(self.layout.truth_len)?];
        self.file.read_exact(&mut buf)?;
        let (labels,text) = buf.split_at(nx * ny * nz);
        let labels = Array3::from_shape_vec((nx,ny,nz),labels.to_vec())
            .map_err(|e| MeasurementError::Header(e.to_string()))?;
        let h = Headfile::from_text(&String::from_utf8_lossy(text));
        Ok(GroundTruth::from_headfile(&h,labels)?)
    }

    /// (coils, x, y, z)
    pub fn smaps(&mut self) -> Result<Array4<Complex32>,MeasurementError> {
        let d = self.dims;
        self.file.seek(SeekFrom::Start(self.layout.smaps_offset))?;
        let mut buf = vec![0u8;to_usize(self.layout.smaps_bytes)?];
        self.file.read_exact(&mut buf)?;
        let mut flat = vec![0f32;buf.len()/4];
        LittleEndian::read_f32_into(&buf,&mut flat);
        let c:Vec<Complex32> = flat.chunks_exact(2).map(|c| Complex32::new(c[0],c[1])).collect();
        Array4::from_shape_vec((d.n_coils,d.matrix[0],d.matrix[1],d.matrix[2]),c)
            .map_err(|e| MeasurementError::BadShot{shot:0,reason:e.to_string()})
    }

    pub fn shot(&mut self,shot:usize) -> Result<ShotRecord,MeasurementError> {
        let n_shots = self.dims.n_shots();
        if shot >= n_shots {
            return Err(MeasurementError::ShotOutOfRange{shot,n_shots});
        }
        let offset = self.layout.shot_offset(shot)?;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8;to_usize(self.layout.shot_bytes)?];
        self.file.read_exact(&mut buf)?;
        let record = ShotRecord::from_bytes(&buf,&self.dims);
        if record.scan_counter != shot {
            return Err(MeasurementError::BadShot{shot,reason:format!("stored scan counter is {}",record.scan_counter)});
        }
        Ok(record)
    }

    /// every shot of a frame, with the frame flags checked
    pub fn frame(&mut self,frame:usize) -> Result<FrameData,MeasurementError> {
        let spf = self.dims.shots_per_frame;
        let ns = self.dims.samples_per_shot;
        let mut traj = Array2::<f32>::zeros((spf * ns,3));
        let mut kspace = Array2::<Complex32>::zeros((self.dims.n_coils,spf * ns));
        for k in 0..spf {
            let shot = self.shot(frame * spf + k)?;
            let expected = ShotRecord::flags_for(k,spf);
            if shot.frame != frame || shot.shot_in_frame != k || shot.flags != expected {
                return Err(MeasurementError::BadShot{
                    shot:shot.scan_counter,
                    reason:format!("frame {} shot {} flags {:#b}, expected frame {} shot {} flags {:#b}",shot.frame,shot.shot_in_frame,shot.flags,frame,k,expected),
                });
            }
            traj.slice_mut(s![k*ns..(k+1)*ns,..]).assign(&shot.traj);
            kspace.slice_mut(s![..,k*ns..(k+1)*ns]).assign(&shot.data);
        }
        Ok(FrameData {
            frame,
            traj,
            kspace,
        })
    }

    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            reader:self,
            next:0,
        }
    }
}

/// Frames in order, read one at a time
pub struct Frames<'a> {
    reader:&'a mut MeasurementReader,
    next:usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<FrameData,MeasurementError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.dims.n_frames {
            return None;
        }
        let f = self.reader.frame(self.next);
        self.next += 1;
        Some(f)
    }
}

/// true when the file carries the complete flag
pub fn is_complete(path:&Path) -> Result<bool,MeasurementError> {
    let mut file = File::open(path)?;
    let mut h = [0u8;HEADER_SIZE];
    file.read_exact(&mut h)?;
    if &h[MAGIC_BYTES] != MAGIC {
        return Err(MeasurementError::BadMagic(path.to_owned()));
    }
    Ok(LittleEndian::read_u32(&h[STATUS_BYTES]) == STATUS_COMPLETE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_truth::{Dynamic, EventRecord, TissueRecord};

    fn dims() -> MeasurementDims {
        MeasurementDims {
            matrix:[2,3,2],
            n_coils:2,
            n_frames:2,
            shots_per_frame:2,
            samples_per_shot:3,
        }
    }

    fn shot(d:&MeasurementDims,i:usize) -> ShotRecord {
        let s = i % d.shots_per_frame;
        ShotRecord {
            scan_counter:i,
            frame:i / d.shots_per_frame,
            shot_in_frame:s,
            flags:ShotRecord::flags_for(s,d.shots_per_frame),
            traj:Array2::from_shape_fn((d.samples_per_shot,3),|(a,b)| (i*10 + a*3 + b) as f32),
            data:Array2::from_shape_fn((d.n_coils,d.samples_per_shot),|(c,a)| Complex32::new(i as f32,(c*10 + a) as f32)),
        }
    }

    fn metadata() -> Headfile {
        let mut h = Headfile::new();
        h.insert("sampler","cartesian");
        h.insert("rng_seed",7);
        h
    }

    fn truth(d:&MeasurementDims) -> GroundTruth {
        let [nx,ny,nz] = d.matrix;
        GroundTruth {
            phantom:String::from("shepp_logan"),
            roi_tissue:String::from("roi"),
            tissues:vec![
                TissueRecord{name:String::from("background"),pd:0.0,t1_ms:0.0,t2_ms:0.0,t2s_ms:0.0},
                TissueRecord{name:String::from("roi"),pd:0.85,t1_ms:1820.0,t2_ms:99.0,t2s_ms:66.0},
            ],
            labels:Array3::from_shape_fn((nx,ny,nz),|(x,y,z)| ((x + y + z) % 2) as u8),
            dynamics:vec![Dynamic {
                name:String::from("event_activation"),
                dt_s:0.05,
                values:vec![0.0,0.1,0.7,1.0],
                events:vec![EventRecord{onset:0.05,duration:0.1,amplitude:2.5}],
            }],
        }
    }

    #[test]
    fn shots_written_out_of_order_read_back_by_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.meas");
        let d = dims();
        let maps = Array4::from_elem((2,2,3,2),Complex32::new(0.5,0.5));
        let mut w = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&maps).unwrap();
        for i in [3,0,2,1] {
            w.write_shot(&shot(&d,i)).unwrap();
        }
        assert_eq!(w.n_written(),4);
        w.finalize().unwrap();

        let mut r = MeasurementReader::open(&path).unwrap();
        assert_eq!(r.dims(),&d);
        assert_eq!(r.metadata().get("sampler").unwrap(),"cartesian");
        assert_eq!(r.smaps().unwrap(),maps);
        assert_eq!(r.ground_truth().unwrap(),truth(&d));
        assert_eq!(r.shot(2).unwrap(),shot(&d,2));
        let frames:Vec<FrameData> = r.frames().collect::<Result<_,_>>().unwrap();
        assert_eq!(frames.len(),2);
        assert_eq!(frames[1].traj.shape(),&[6,3]);
        assert_eq!(frames[1].traj[[3,0]],30.0);
        assert_eq!(frames[1].kspace[[1,4]],Complex32::new(3.0,11.0));
    }

    #[test]
    fn incomplete_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.meas");
        let d = dims();
        let maps = Array4::zeros((2,2,3,2));
        let mut w = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&maps).unwrap();
        w.write_shot(&shot(&d,0)).unwrap();
        drop(w);
        assert!(!is_complete(&path).unwrap());
        assert!(matches!(MeasurementReader::open(&path),Err(MeasurementError::Incomplete(_))));
    }

    #[test]
    fn flags_mark_frame_boundaries() {
        assert_eq!(ShotRecord::flags_for(0,1),FLAG_FIRST_IN_FRAME | FLAG_LAST_IN_FRAME);
        assert_eq!(ShotRecord::flags_for(0,3),FLAG_FIRST_IN_FRAME);
        assert_eq!(ShotRecord::flags_for(1,3),0);
        assert_eq!(ShotRecord::flags_for(2,3),FLAG_LAST_IN_FRAME);
    }

    #[test]
    fn bad_flags_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.meas");
        let d = dims();
        let maps = Array4::zeros((2,2,3,2));
        let mut w = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&maps).unwrap();
        for i in 0..4 {
            let mut s = shot(&d,i);
            if i == 1 {
                s.flags = 0;
            }
            w.write_shot(&s).unwrap();
        }
        w.finalize().unwrap();
        let mut r = MeasurementReader::open(&path).unwrap();
        assert!(matches!(r.frame(0),Err(MeasurementError::BadShot{shot:1,..})));
        assert!(r.frame(1).is_ok());
    }

    #[test]
    fn wrong_shapes_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.meas");
        let d = dims();
        let mut w = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&Array4::zeros((2,2,3,2))).unwrap();
        let mut s = shot(&d,0);
        s.data = Array2::zeros((1,3));
        assert!(matches!(w.write_shot(&s),Err(MeasurementError::BadShot{..})));
        assert!(matches!(w.write_shot(&shot(&d,9)),Err(MeasurementError::ShotOutOfRange{..})));
        let other = dir.path().join("other.meas");
        std::fs::write(&other,vec![7u8;600]).unwrap();
        assert!(matches!(MeasurementReader::open(&other),Err(MeasurementError::BadMagic(_))));
    }

    #[test]
    fn ground_truth_reads_back_after_every_shot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truth.meas");
        let d = dims();
        let mut w = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&Array4::zeros((2,2,3,2))).unwrap();
        for i in 0..4 {
            w.write_shot(&shot(&d,i)).unwrap();
        }
        w.finalize().unwrap();
        let mut r = MeasurementReader::open(&path).unwrap();
        let t = r.ground_truth().unwrap();
        assert_eq!(t.labels,truth(&d).labels);
        assert_eq!(t.roi_mask().iter().filter(|m| **m).count(),6);
        let dynamic = t.dynamic("event_activation").unwrap();
        assert_eq!(dynamic.values,vec![0.0,0.1,0.7,1.0]);
        assert_eq!(dynamic.events[0].amplitude,2.5);
        // reading the truth leaves the shots where they were
        assert_eq!(r.shot(3).unwrap(),shot(&d,3));
    }

    #[test]
    fn label_map_must_match_the_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.meas");
        let d = dims();
        let mut t = truth(&d);
        t.labels = Array3::zeros((2,2,2));
        let r = MeasurementWriter::create(&path,d,&metadata(),&t,&Array4::zeros((2,2,3,2)));
        assert!(matches!(r,Err(MeasurementError::Header(_))));
        assert!(!path.exists());
    }

    #[test]
    fn sizes_beyond_the_header_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.meas");
        let mut d = dims();
        d.n_frames = u32::MAX as usize + 1;
        let r = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&Array4::zeros((2,2,3,2)));
        assert!(matches!(r,Err(MeasurementError::Header(_))));
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_header_sizes_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.meas");
        let d = dims();
        let mut w = MeasurementWriter::create(&path,d,&metadata(),&truth(&d),&Array4::zeros((2,2,3,2))).unwrap();
        for i in 0..4 {
            w.write_shot(&shot(&d,i)).unwrap();
        }
        w.finalize().unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        // overflowing the voxel count
        for range in [N_X_BYTES,N_Y_BYTES,N_Z_BYTES,N_COILS_BYTES] {
            LittleEndian::write_u32(&mut bytes[range],u32::MAX);
        }
        std::fs::write(&path,&bytes).unwrap();
        assert!(matches!(MeasurementReader::open(&path),Err(MeasurementError::Header(_))));
        // overflowing the offsets
        LittleEndian::write_u32(&mut bytes[N_X_BYTES],2);
        LittleEndian::write_u32(&mut bytes[N_Y_BYTES],3);
        LittleEndian::write_u32(&mut bytes[N_Z_BYTES],2);
        LittleEndian::write_u32(&mut bytes[N_COILS_BYTES],2);
        LittleEndian::write_u64(&mut bytes[METADATA_LEN_BYTES],u64::MAX - 8);
        std::fs::write(&path,&bytes).unwrap();
        assert!(matches!(MeasurementReader::open(&path),Err(MeasurementError::Header(_))));
    }
}
