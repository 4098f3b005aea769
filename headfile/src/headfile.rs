use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path,PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug,Error)]
pub enum HeadfileError {
    #[error("headfile io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("field {0} not found in headfile")]
    MissingField(String),
    #[error("cannot parse field {field} with value {value:?}")]
    Parse {
        field:String,
        value:String,
    },
}

/// key=value meta data. Keys are kept sorted so the text form is stable.
#[derive(Clone,Debug,Default,PartialEq)]
pub struct Headfile {
    items:BTreeMap<String,String>,
}

impl Headfile {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T:ToString,U:ToString>(&mut self,key:T,value:U) {
        self.items.insert(key.to_string(),value.to_string());
    }

    pub fn get(&self,key:&str) -> Result<&str,HeadfileError> {
        self.items.get(key).map(|s| s.as_str()).ok_or(HeadfileError::MissingField(key.to_string()))
    }

    pub fn get_parsed<T:FromStr>(&self,key:&str) -> Result<T,HeadfileError> {
        let value = self.get(key)?;
        value.trim().parse().map_err(|_| HeadfileError::Parse{field:key.to_string(),value:value.to_string()})
    }

    /// space separated list of values, as written by insert_list
    pub fn get_list<T:FromStr>(&self,key:&str) -> Result<Vec<T>,HeadfileError> {
        let value = self.get(key)?;
        value.split_whitespace()
            .map(|v| v.parse().map_err(|_| HeadfileError::Parse{field:key.to_string(),value:value.to_string()}))
            .collect()
    }

    pub fn insert_list<T:Display>(&mut self,key:&str,values:&[T]) {
        let s:Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.insert(key,s.join(" "));
    }

    pub fn contains(&self,key:&str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// entries of other overwrite entries of self
    pub fn merge(&mut self,other:&Headfile) {
        other.items.iter().for_each(|(k,v)| {self.items.insert(k.clone(),v.clone());});
    }

    pub fn to_text(&self) -> String {
        let mut strbuf = String::new();
        for (key, val) in self.items.iter() {
            strbuf.push_str(key);
            strbuf.push('=');
            strbuf.push_str(val);
            strbuf.push('\n');
        }
        strbuf
    }

    pub fn from_text(headfile_str:&str) -> Self {
        let mut hf = Headfile::new();
        headfile_str.lines().for_each(|line|{
            // split on the first = we find
            if let Some(index) = line.find('=') {
                let (key,val) = line.split_at(index);
                hf.items.insert(key.to_string(),val[1..].to_string());
            }
            // lines without "=" are not meta data
        });
        hf
    }

    pub fn read(file_path:&Path) -> Result<Self,HeadfileError> {
        let mut f = File::open(file_path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Ok(Self::from_text(&s))
    }

    pub fn write(&self,file_path:&Path) -> Result<(),HeadfileError> {
        let mut f = File::create(file_path)?;
        f.write_all(self.to_text().as_bytes())?;
        Ok(())
    }

    /// merge entries into the headfile on disk, creating it if needed
    pub fn append(file_path:&Path,other:&Headfile) -> Result<PathBuf,HeadfileError> {
        let mut h = match file_path.exists() {
            true => Self::read(file_path)?,
            false => Headfile::new()
        };
        h.merge(other);
        h.write(file_path)?;
        Ok(file_path.to_owned())
    }

}
